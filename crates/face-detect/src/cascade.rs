use opencv::{
    core::{self, Mat, Rect, Size, Vector},
    imgproc,
    objdetect::{self, CascadeClassifier},
    prelude::*,
};
use tracing::{debug, trace};
use video_ingest::{Camera, CameraSettings, CaptureError, Frame, FrameFormat};

use crate::{CascadeSettings, DetectionResult, FaceRect, SensorError, VisionSensor};

/// Camera plus Haar cascade classifier.
pub struct FaceSensor {
    camera: Camera,
    classifier: CascadeClassifier,
    cascade: CascadeSettings,
    gray: Mat,
}

impl FaceSensor {
    /// Load the cascade file. The camera stays closed until `start`.
    pub fn new(camera: CameraSettings, cascade: CascadeSettings) -> Result<Self, SensorError> {
        let classifier =
            CascadeClassifier::new(&cascade.xml_path).map_err(|err| SensorError::Classifier {
                path: cascade.xml_path.clone(),
                reason: err.to_string(),
            })?;
        if classifier.empty().unwrap_or(true) {
            return Err(SensorError::Classifier {
                path: cascade.xml_path.clone(),
                reason: "classifier is empty".into(),
            });
        }
        debug!(
            cascade = %cascade.xml_path,
            scale_factor = cascade.scale_factor,
            min_neighbors = cascade.min_neighbors,
            "face cascade loaded"
        );
        Ok(Self {
            camera: Camera::new(camera),
            classifier,
            cascade,
            gray: Mat::default(),
        })
    }

    fn classify(&mut self, frame: &Frame) -> Result<Vec<FaceRect>, SensorError> {
        if frame.format != FrameFormat::Bgr8 {
            return Err(SensorError::Detect(format!(
                "unsupported frame format {:?}",
                frame.format
            )));
        }
        let flat = Mat::from_slice(&frame.data).map_err(opencv_err)?;
        let bgr = flat.reshape(3, frame.height).map_err(opencv_err)?;
        imgproc::cvt_color_def(&bgr, &mut self.gray, imgproc::COLOR_BGR2GRAY)
            .map_err(opencv_err)?;

        let mut found = Vector::<Rect>::new();
        self.classifier
            .detect_multi_scale(
                &self.gray,
                &mut found,
                self.cascade.scale_factor,
                self.cascade.min_neighbors,
                objdetect::CASCADE_SCALE_IMAGE,
                Size::new(self.cascade.min_size.width, self.cascade.min_size.height),
                core::Size::default(),
            )
            .map_err(opencv_err)?;

        Ok(found
            .iter()
            .map(|r| FaceRect::new(r.x, r.y, r.width, r.height))
            .collect())
    }
}

fn opencv_err(err: opencv::Error) -> SensorError {
    SensorError::Detect(err.to_string())
}

impl VisionSensor for FaceSensor {
    fn start(&mut self) -> Result<(), SensorError> {
        Ok(self.camera.start()?)
    }

    fn stop(&mut self) -> Result<(), SensorError> {
        Ok(self.camera.stop()?)
    }

    fn detect(&mut self) -> Result<DetectionResult, SensorError> {
        if !self.camera.is_running() {
            return Err(CaptureError::NotStarted.into());
        }
        let frame = self.camera.read()?;
        let faces = self.classify(&frame)?;
        trace!(faces = faces.len(), ts = frame.timestamp_ms, "detect");
        Ok(DetectionResult { frame, faces })
    }
}
