//! Builds the head and the sensor from their settings files.

use anyhow::{Context, Result};
use face_detect::VisionSensor;
use servo::{MockPwm, PulseOutput, Servo, ServoSettings, SysfsPwm};
use tracing::debug;

use super::{
    controller::Head,
    settings::{CameraFile, ServoFile},
};

/// Sysfs PWM outputs, or in-memory ones for a dry run.
pub fn build_head(servos: &ServoFile, dry_run: bool) -> Result<Head> {
    let horizontal = build_servo("horizontal", &servos.horizontal, dry_run)?;
    let vertical = build_servo("vertical", &servos.vertical, dry_run)?;
    Ok(Head::new(horizontal, vertical))
}

fn build_servo(axis: &str, settings: &ServoSettings, dry_run: bool) -> Result<Servo> {
    let output: Box<dyn PulseOutput> = if dry_run {
        Box::new(MockPwm::new())
    } else {
        Box::new(SysfsPwm::new(settings.chip, settings.channel, settings.pin))
    };
    let servo = Servo::from_settings(settings, output)
        .with_context(|| format!("invalid {axis} servo settings"))?;
    debug!(
        axis,
        chip = settings.chip,
        channel = settings.channel,
        pin = settings.pin,
        range = ?(settings.min_angle..=settings.max_angle),
        home = settings.ini_angle,
        dry_run,
        "servo configured"
    );
    Ok(servo)
}

#[cfg(feature = "with-opencv")]
pub fn build_sensor(camera: &CameraFile) -> Result<Box<dyn VisionSensor>> {
    use face_detect::FaceSensor;
    use video_ingest::CameraSettings;

    let section = &camera.camera_setting;
    let settings = CameraSettings {
        uri: section.device.clone(),
        width: section.size.width,
        height: section.size.height,
        orientation: section.orientation,
        discard_frames: section.discard_frames,
    };
    let sensor = FaceSensor::new(settings, camera.cascade_setting.clone())
        .context("failed to set up the face sensor")?;
    Ok(Box::new(sensor))
}

#[cfg(not(feature = "with-opencv"))]
pub fn build_sensor(camera: &CameraFile) -> Result<Box<dyn VisionSensor>> {
    anyhow::bail!(
        "cannot open camera {}: facecam was built without the `with-opencv` feature",
        camera.camera_setting.device
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servo_file(h_home: i32) -> ServoFile {
        serde_yaml::from_str(&format!(
            "\
horizontal: {{pin: 18, channel: 0, min_angle: 0, max_angle: 160, ini_angle: {h_home}}}
vertical: {{pin: 19, channel: 1, min_angle: 0, max_angle: 130, ini_angle: 40}}
"
        ))
        .unwrap()
    }

    #[test]
    fn dry_run_head_starts_at_home() {
        let head = build_head(&servo_file(90), true).unwrap();
        assert_eq!(head.horizontal.angle(), 90);
        assert_eq!(head.vertical.angle(), 40);
        assert_eq!(head.vertical.state().channel, 1);
    }

    #[test]
    fn home_outside_range_is_fatal() {
        let err = build_head(&servo_file(170), true).unwrap_err();
        assert!(format!("{err:#}").contains("horizontal"));
    }
}
