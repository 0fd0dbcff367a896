//! Where captured images go and how they are encoded.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, NaiveDateTime, Timelike};
use image::{GrayImage, ImageBuffer, Rgb, codecs::jpeg::JpegEncoder};
use video_ingest::{Frame, FrameFormat};

/// `<dir>/<year>/<month>/<year>_<MM>_<DD>_<hh>_<mm>_face.jpg`
pub fn capture_path(output_dir: &Path, at: &NaiveDateTime) -> PathBuf {
    output_dir
        .join(at.year().to_string())
        .join(at.month().to_string())
        .join(format!(
            "{}_{:02}_{:02}_{:02}_{:02}_face.jpg",
            at.year(),
            at.month(),
            at.day(),
            at.hour(),
            at.minute()
        ))
}

/// Encode `frame` as JPEG and write it to `path`, creating parent directories.
pub fn write_jpeg(path: &Path, frame: &Frame, quality: u8) -> Result<()> {
    let jpeg = encode_jpeg(frame, quality)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, jpeg).with_context(|| format!("failed to write {}", path.display()))
}

fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let width = frame.width as u32;
    let height = frame.height as u32;
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    let encoded = match frame.format {
        FrameFormat::Bgr8 => {
            let rgb = bgr_to_rgb(&frame.data);
            let image = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_vec(width, height, rgb)
                .ok_or_else(|| anyhow!("failed to convert frame into image buffer"))?;
            encoder.encode_image(&image)
        }
        FrameFormat::Gray8 => {
            let image = GrayImage::from_vec(width, height, frame.data.clone())
                .ok_or_else(|| anyhow!("failed to convert frame into image buffer"))?;
            encoder.encode_image(&image)
        }
    };
    encoded.map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
    Ok(buffer)
}

fn bgr_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len());
    for chunk in data.chunks_exact(3) {
        rgb.extend_from_slice(&[chunk[2], chunk[1], chunk[0]]);
    }
    rgb
}
