//! Command-line arguments and their translation into run configuration.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;

pub const DEFAULT_SETTING_PATH: &str = "data/yaml/auto_capture_setting.yaml";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Location of the main settings file.
#[derive(Debug, Args)]
pub struct SettingsArgs {
    /// Capture settings YAML. Servo and camera files are resolved next to it.
    #[arg(
        long = "setting-path",
        alias = "setting_path",
        value_name = "PATH",
        default_value = DEFAULT_SETTING_PATH
    )]
    pub setting_path: PathBuf,
}

/// Arguments of the `run` subcommand (also accepted without a subcommand).
#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,
    /// Root directory for captured images.
    #[arg(
        long = "output-dir",
        alias = "output_dir",
        value_name = "DIR",
        default_value = DEFAULT_OUTPUT_DIR
    )]
    pub output_dir: PathBuf,
    /// Simulate the servos and keep the schedule in memory.
    #[arg(long = "dry-run", action = clap::ArgAction::SetTrue)]
    pub dry_run: bool,
    /// Do not read the console; only Ctrl+C stops the run.
    #[arg(long = "no-keyboard", action = clap::ArgAction::SetTrue)]
    pub no_keyboard: bool,
}

#[derive(Debug, Args)]
pub struct SweepArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,
    /// Number of vertical rows to sweep.
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub rows: usize,
    /// Simulate the servos.
    #[arg(long = "dry-run", action = clap::ArgAction::SetTrue)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,
    /// Sensor polls to log before exiting.
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub polls: usize,
}

/// Validated configuration for a capture run.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub setting_path: PathBuf,
    pub output_dir: PathBuf,
    pub dry_run: bool,
    /// Read console key presses as a stop request.
    pub keyboard: bool,
}

impl TryFrom<RunArgs> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: RunArgs) -> Result<Self> {
        let setting_path = args.settings.setting_path;
        if !setting_path.is_file() {
            bail!("settings file {} does not exist", setting_path.display());
        }
        if args.output_dir.is_file() {
            bail!(
                "--output-dir {} is a file, expected a directory",
                args.output_dir.display()
            );
        }
        Ok(Self {
            setting_path,
            output_dir: args.output_dir,
            dry_run: args.dry_run,
            keyboard: !args.no_keyboard,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn run_args(setting_path: PathBuf, output_dir: PathBuf) -> RunArgs {
        RunArgs {
            settings: SettingsArgs { setting_path },
            output_dir,
            dry_run: false,
            no_keyboard: true,
        }
    }

    #[test]
    fn missing_settings_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let args = run_args(dir.path().join("nope.yaml"), dir.path().join("out"));
        assert!(AppConfig::try_from(args).is_err());
    }

    #[test]
    fn output_dir_must_not_be_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("setting.yaml");
        fs::write(&settings, "").unwrap();
        let args = run_args(settings.clone(), settings);
        assert!(AppConfig::try_from(args).is_err());
    }

    #[test]
    fn keyboard_follows_flag() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("setting.yaml");
        fs::write(&settings, "").unwrap();
        let config = AppConfig::try_from(run_args(settings, dir.path().join("out"))).unwrap();
        assert!(!config.keyboard);
        assert!(!config.dry_run);
    }
}
