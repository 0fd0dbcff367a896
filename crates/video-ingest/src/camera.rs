//! OpenCV-backed camera with an explicit powered lifetime.

use chrono::Utc;
use opencv::{
    core::{self, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};
use tracing::{debug, warn};

use crate::types::{CaptureError, Frame, FrameFormat, Orientation};

#[derive(Clone, Debug)]
pub struct CameraSettings {
    /// Device index, `/dev/videoN` path, or any URI OpenCV can open.
    pub uri: String,
    pub width: i32,
    pub height: i32,
    pub orientation: Orientation,
    /// Frames grabbed and dropped before each read so the returned frame
    /// reflects the current head position rather than the capture buffer.
    pub discard_frames: u32,
}

/// Camera handle. Construction does not open the device; `start` does.
pub struct Camera {
    settings: CameraSettings,
    capture: Option<VideoCapture>,
    frame: Mat,
    scratch: Mat,
}

impl Camera {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            capture: None,
            frame: Mat::default(),
            scratch: Mat::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.capture.is_some()
    }

    /// Open the device. A running camera is left untouched.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.capture.is_some() {
            return Ok(());
        }
        let mut cap = open_video_capture(&self.settings.uri)?;
        configure_camera(&mut cap, (self.settings.width, self.settings.height));
        debug!(uri = %self.settings.uri, "camera started");
        self.capture = Some(cap);
        Ok(())
    }

    /// Release the device. Stopping a stopped camera is a no-op.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(mut cap) = self.capture.take() {
            cap.release().map_err(|e| CaptureError::Other(e.into()))?;
            debug!(uri = %self.settings.uri, "camera stopped");
        }
        Ok(())
    }

    /// Read one BGR frame at the configured size with the mounting
    /// correction applied.
    pub fn read(&mut self) -> Result<Frame, CaptureError> {
        let cap = self.capture.as_mut().ok_or(CaptureError::NotStarted)?;

        for _ in 0..self.settings.discard_frames {
            cap.grab().map_err(|e| CaptureError::Other(e.into()))?;
        }
        cap.read(&mut self.frame)
            .map_err(|e| CaptureError::Other(e.into()))?;

        let size = self
            .frame
            .size()
            .map_err(|e| CaptureError::Other(e.into()))?;
        if size.width <= 0 || size.height <= 0 {
            return Err(CaptureError::EmptyFrame);
        }

        let (target_w, target_h) = (self.settings.width, self.settings.height);
        let working = if size.width != target_w || size.height != target_h {
            opencv::imgproc::resize(
                &self.frame,
                &mut self.scratch,
                core::Size {
                    width: target_w,
                    height: target_h,
                },
                0.0,
                0.0,
                opencv::imgproc::INTER_LINEAR,
            )
            .map_err(|e| CaptureError::Other(e.into()))?;
            &self.scratch
        } else {
            &self.frame
        };

        let data = working
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        let mut frame = Frame {
            data,
            width: target_w,
            height: target_h,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        };
        frame.apply_orientation(self.settings.orientation)?;
        Ok(frame)
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("failed to release camera: {err}");
        }
    }
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    uri.strip_prefix("/dev/video")
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .and_then(|rest| rest.parse::<i32>().ok())
}

/// Attempt to open a camera input either by index or URI.
fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    if let Some(index) = parse_device_index(uri) {
        for backend in [videoio::CAP_V4L2, videoio::CAP_ANY] {
            match VideoCapture::new(index, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    warn!("failed to open device #{index} with backend {backend}: {err}");
                }
            }
        }
    }

    for backend in [videoio::CAP_V4L2, videoio::CAP_ANY] {
        match VideoCapture::from_file(uri, backend) {
            Ok(cap) => {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    return Ok(cap);
                }
            }
            Err(err) => {
                warn!("failed to open {uri} with backend {backend}: {err}");
            }
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

/// Request the capture size and a shallow driver buffer.
fn configure_camera(cap: &mut VideoCapture, target_size: (i32, i32)) {
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        let _ = cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64);
    }
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, target_size.0 as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, target_size.1 as f64);
    let _ = cap.set(videoio::CAP_PROP_BUFFERSIZE, 1.0);
}

#[cfg(test)]
mod tests {
    use super::parse_device_index;

    #[test]
    fn device_index_forms() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("/dev/video2"), Some(2));
        assert_eq!(parse_device_index("/dev/video"), None);
        assert_eq!(parse_device_index("rtsp://cam/stream"), None);
    }
}
