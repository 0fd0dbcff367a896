//! Frame acquisition for the pan/tilt head camera.
//!
//! Frame types and the mounting-orientation correction are always available.
//! The OpenCV-backed [`Camera`] is compiled with the `with-opencv` feature.

#[cfg(feature = "with-opencv")]
mod camera;
mod types;

#[cfg(feature = "with-opencv")]
pub use camera::{Camera, CameraSettings};
pub use types::{CaptureError, Frame, FrameFormat, Orientation};

impl Frame {
    /// Geometric center of the frame in pixel coordinates.
    pub fn center(&self) -> (f64, f64) {
        (self.width as f64 / 2.0, self.height as f64 / 2.0)
    }

    fn expected_len(&self) -> usize {
        self.width.max(0) as usize * self.height.max(0) as usize * self.format.bytes_per_pixel()
    }

    /// Apply a mounting correction in place.
    pub fn apply_orientation(&mut self, orientation: Orientation) -> Result<(), CaptureError> {
        let expected = self.expected_len();
        if self.data.len() != expected {
            return Err(CaptureError::BufferSize {
                expected,
                actual: self.data.len(),
            });
        }

        let bpp = self.format.bytes_per_pixel();
        let row_len = self.width as usize * bpp;
        match orientation {
            Orientation::Upright => {}
            Orientation::FlipVertical => flip_rows(&mut self.data, row_len),
            Orientation::FlipHorizontal => mirror_columns(&mut self.data, row_len, bpp),
            Orientation::Rotate180 => {
                flip_rows(&mut self.data, row_len);
                mirror_columns(&mut self.data, row_len, bpp);
            }
        }
        Ok(())
    }
}

fn flip_rows(data: &mut [u8], row_len: usize) {
    if row_len == 0 {
        return;
    }
    let rows = data.len() / row_len;
    for top in 0..rows / 2 {
        let bottom = rows - 1 - top;
        let (head, tail) = data.split_at_mut(bottom * row_len);
        head[top * row_len..(top + 1) * row_len].swap_with_slice(&mut tail[..row_len]);
    }
}

fn mirror_columns(data: &mut [u8], row_len: usize, bpp: usize) {
    if row_len == 0 {
        return;
    }
    let cols = row_len / bpp;
    for row in data.chunks_exact_mut(row_len) {
        for left in 0..cols / 2 {
            let right = cols - 1 - left;
            for channel in 0..bpp {
                row.swap(left * bpp + channel, right * bpp + channel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: i32, height: i32, data: Vec<u8>) -> Frame {
        Frame {
            data,
            width,
            height,
            timestamp_ms: 0,
            format: FrameFormat::Gray8,
        }
    }

    #[test]
    fn center_is_half_the_size() {
        let frame = gray(320, 240, vec![0; 320 * 240]);
        assert_eq!(frame.center(), (160.0, 120.0));
    }

    #[test]
    fn flip_vertical_reverses_rows() {
        let mut frame = gray(2, 3, vec![1, 2, 3, 4, 5, 6]);
        frame.apply_orientation(Orientation::FlipVertical).unwrap();
        assert_eq!(frame.data, vec![5, 6, 3, 4, 1, 2]);
    }

    #[test]
    fn flip_horizontal_keeps_pixel_channels_together() {
        let mut frame = Frame {
            data: vec![1, 2, 3, 4, 5, 6],
            width: 2,
            height: 1,
            timestamp_ms: 0,
            format: FrameFormat::Bgr8,
        };
        frame.apply_orientation(Orientation::FlipHorizontal).unwrap();
        assert_eq!(frame.data, vec![4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn rotate_180_reverses_everything() {
        let mut frame = gray(2, 2, vec![1, 2, 3, 4]);
        frame.apply_orientation(Orientation::Rotate180).unwrap();
        assert_eq!(frame.data, vec![4, 3, 2, 1]);
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let mut frame = gray(4, 4, vec![0; 3]);
        assert!(matches!(
            frame.apply_orientation(Orientation::Upright),
            Err(CaptureError::BufferSize {
                expected: 16,
                actual: 3
            })
        ));
    }
}
