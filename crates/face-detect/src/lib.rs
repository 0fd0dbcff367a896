//! Face detection on camera frames.
//!
//! [`VisionSensor`] is the seam the capture controller drives: one call to
//! `detect` grabs a frame and returns it together with every face found in
//! it. The Haar cascade implementation ([`FaceSensor`]) needs the
//! `with-opencv` feature.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use video_ingest::{CaptureError, Frame};

#[cfg(feature = "with-opencv")]
mod cascade;

#[cfg(feature = "with-opencv")]
pub use cascade::FaceSensor;

/// Axis-aligned face bounding box in sensor pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaceRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn centroid(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }
}

/// One sensor poll: the frame plus the faces found in it, in detector order.
#[derive(Clone, Debug)]
pub struct DetectionResult {
    pub frame: Frame,
    pub faces: Vec<FaceRect>,
}

impl DetectionResult {
    pub fn has_face(&self) -> bool {
        !self.faces.is_empty()
    }

    /// The face the controller follows. No disambiguation: first wins.
    pub fn primary(&self) -> Option<&FaceRect> {
        self.faces.first()
    }
}

/// Haar cascade tuning, as stored under `cascade_setting`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CascadeSettings {
    pub xml_path: String,
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
    #[serde(default = "default_min_neighbors")]
    pub min_neighbors: i32,
    #[serde(default)]
    pub min_size: MinSize,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct MinSize {
    pub width: i32,
    pub height: i32,
}

impl Default for MinSize {
    fn default() -> Self {
        Self {
            width: 30,
            height: 30,
        }
    }
}

fn default_scale_factor() -> f64 {
    1.1
}

fn default_min_neighbors() -> i32 {
    3
}

#[derive(Debug, Error)]
pub enum SensorError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("failed to load cascade {path:?}: {reason}")]
    Classifier { path: String, reason: String },
    #[error("detector failed: {0}")]
    Detect(String),
}

/// Frame source plus face detector with an explicit powered lifetime.
///
/// `start` and `stop` must both be idempotent. `detect` performs exactly one
/// capture and never retries; a failure is the caller's to handle.
pub trait VisionSensor {
    fn start(&mut self) -> Result<(), SensorError>;
    fn stop(&mut self) -> Result<(), SensorError>;
    fn detect(&mut self) -> Result<DetectionResult, SensorError>;
}

impl<S: VisionSensor + ?Sized> VisionSensor for Box<S> {
    fn start(&mut self) -> Result<(), SensorError> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<(), SensorError> {
        (**self).stop()
    }

    fn detect(&mut self) -> Result<DetectionResult, SensorError> {
        (**self).detect()
    }
}
