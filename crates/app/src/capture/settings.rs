//! Settings files: the main capture settings plus the servo and camera files
//! it points at.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use face_detect::CascadeSettings;
use serde::{Deserialize, de::DeserializeOwned};
use serde_yaml::Value;
use servo::ServoSettings;
use video_ingest::Orientation;

use super::schedule::{Interval, ScheduleEntry, TargetDate, YamlScheduleStore};

/// Main settings document.
#[derive(Clone, Debug, Deserialize)]
pub struct CaptureSettings {
    pub target_date: TargetDate,
    pub update_interval: Interval,
    #[serde(default)]
    pub research_interval: Interval,
    pub servo_setting_path: PathBuf,
    pub camera_setting_path: PathBuf,
    #[serde(default = "default_scan_step")]
    pub scan_step: i32,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Seconds without a face before Adjust gives up.
    #[serde(default = "default_adjust_timeout")]
    pub adjust_timeout: u64,
    #[serde(default = "default_wait_poll_ms")]
    pub wait_poll_ms: u64,
    #[serde(default = "default_search_dwell_ms")]
    pub search_dwell_ms: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_scan_step() -> i32 {
    10
}

fn default_tolerance() -> f64 {
    10.0
}

fn default_adjust_timeout() -> u64 {
    30
}

fn default_wait_poll_ms() -> u64 {
    1_000
}

fn default_search_dwell_ms() -> u64 {
    500
}

fn default_jpeg_quality() -> u8 {
    90
}

/// Controller tuning, fixed for the life of the process.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    pub update_interval: TimeDelta,
    pub research_backoff: Duration,
    pub scan_step: i32,
    /// Dead-band around the frame center, in pixels.
    pub tolerance: f64,
    pub adjust_timeout: Duration,
    /// Cancellation check interval for every sleep.
    pub wait_poll: Duration,
    pub search_dwell: Duration,
    pub jpeg_quality: u8,
}

impl TryFrom<&CaptureSettings> for CaptureConfig {
    type Error = anyhow::Error;

    fn try_from(settings: &CaptureSettings) -> Result<Self> {
        if settings.scan_step <= 0 {
            bail!("scan_step must be a positive number of degrees");
        }
        if !settings.tolerance.is_finite() || settings.tolerance < 0.0 {
            bail!("tolerance must be a non-negative number of pixels");
        }
        if !(1..=100).contains(&settings.jpeg_quality) {
            bail!("jpeg_quality must be between 1 and 100");
        }
        if settings.wait_poll_ms == 0 {
            bail!("wait_poll_ms must be at least 1");
        }
        let update_interval = settings
            .update_interval
            .to_delta()
            .context("invalid update_interval")?;
        if update_interval <= TimeDelta::zero() {
            bail!("update_interval must move the schedule forward");
        }

        Ok(Self {
            update_interval,
            research_backoff: settings
                .research_interval
                .to_duration()
                .context("invalid research_interval")?,
            scan_step: settings.scan_step,
            tolerance: settings.tolerance,
            adjust_timeout: Duration::from_secs(settings.adjust_timeout),
            wait_poll: Duration::from_millis(settings.wait_poll_ms),
            search_dwell: Duration::from_millis(settings.search_dwell_ms),
            jpeg_quality: settings.jpeg_quality,
        })
    }
}

/// Both axes of the head, as stored in the servo settings file.
#[derive(Clone, Debug, Deserialize)]
pub struct ServoFile {
    pub horizontal: ServoSettings,
    pub vertical: ServoSettings,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CameraFile {
    pub camera_setting: CameraSection,
    pub cascade_setting: CascadeSettings,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CameraSection {
    #[serde(default = "default_device")]
    pub device: String,
    pub size: FrameSize,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default = "default_discard_frames")]
    pub discard_frames: u32,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct FrameSize {
    pub width: i32,
    pub height: i32,
}

fn default_device() -> String {
    "/dev/video0".to_string()
}

fn default_discard_frames() -> u32 {
    2
}

/// Parsed main settings file plus where it lives.
#[derive(Debug)]
pub struct SettingsFile {
    path: PathBuf,
    document: Value,
    settings: CaptureSettings,
}

impl SettingsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings {}", path.display()))?;
        let document: Value = serde_yaml::from_str(&text)
            .with_context(|| format!("{} is not valid YAML", path.display()))?;
        let settings: CaptureSettings = serde_yaml::from_value(document.clone())
            .with_context(|| format!("invalid settings in {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            document,
            settings,
        })
    }

    pub fn capture_config(&self) -> Result<CaptureConfig> {
        CaptureConfig::try_from(&self.settings)
            .with_context(|| format!("invalid tuning in {}", self.path.display()))
    }

    pub fn schedule_entry(&self) -> Result<ScheduleEntry> {
        let target = self.settings.target_date.to_datetime()?;
        let recurrence = self
            .settings
            .update_interval
            .to_delta()
            .context("invalid update_interval")?;
        Ok(ScheduleEntry::new(target, recurrence))
    }

    pub fn servo_file(&self) -> Result<ServoFile> {
        read_yaml(&self.resolve(&self.settings.servo_setting_path))
    }

    pub fn camera_file(&self) -> Result<CameraFile> {
        let path = self.resolve(&self.settings.camera_setting_path);
        let mut file: CameraFile = read_yaml(&path)?;
        if file.camera_setting.size.width <= 0 || file.camera_setting.size.height <= 0 {
            bail!("camera size in {} must be positive", path.display());
        }
        let xml = PathBuf::from(&file.cascade_setting.xml_path);
        if xml.is_relative() {
            let base = path.parent().unwrap_or(Path::new("."));
            file.cascade_setting.xml_path = base.join(xml).to_string_lossy().into_owned();
        }
        Ok(file)
    }

    /// Schedule store writing back into this file.
    pub fn into_store(self) -> Result<YamlScheduleStore> {
        let entry = self.schedule_entry()?;
        Ok(YamlScheduleStore::new(self.path, self.document, entry))
    }

    /// Referenced files are looked up next to the settings file.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        self.path
            .parent()
            .unwrap_or(Path::new("."))
            .join(path)
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("invalid settings in {}", path.display()))
}
