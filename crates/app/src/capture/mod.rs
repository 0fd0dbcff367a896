//! Scheduled face capture.
//!
//! - `mode`: the shared Wait/Search/Adjust/Capture/End cell.
//! - `controller`: the state machine driving the head and the sensor.
//! - `schedule`: next-capture timestamp and its stores.
//! - `settings`: the YAML settings files.
//! - `listener`: keyboard and Ctrl+C cancellation.
//! - `output`: image paths and JPEG encoding.
//! - `hardware`: head and sensor construction.

pub mod controller;
pub mod hardware;
pub mod listener;
pub mod mode;
pub mod output;
pub mod schedule;
pub mod settings;

use std::{sync::Arc, thread::JoinHandle};

use anyhow::Result;
use tracing::{info, warn};

use crate::config::AppConfig;
use controller::CaptureController;
use mode::ModeCell;
use schedule::{MemoryScheduleStore, ScheduleStore};
use settings::SettingsFile;

/// Load settings, bring up the hardware and run until cancelled or failed.
pub fn run(config: &AppConfig) -> Result<()> {
    let file = SettingsFile::load(&config.setting_path)?;
    let capture = file.capture_config()?;
    let head = hardware::build_head(&file.servo_file()?, config.dry_run)?;
    let sensor = hardware::build_sensor(&file.camera_file()?)?;
    let store: Box<dyn ScheduleStore> = if config.dry_run {
        info!("dry run: servos are simulated and the schedule is not written back");
        Box::new(MemoryScheduleStore::new(file.schedule_entry()?))
    } else {
        let store = file.into_store()?;
        info!(settings = %store.path().display(), "schedule store ready");
        Box::new(store)
    };

    let mode = Arc::new(ModeCell::new());
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    listener::install_interrupt_handler(events_tx.clone());
    let keyboard = if config.keyboard {
        info!("press any key, or Ctrl+C, to stop");
        Some(listener::spawn_keyboard_reader(mode.clone(), events_tx)?)
    } else {
        None
    };
    let listener = listener::spawn_listener(mode.clone(), events_rx)?;

    let mut controller =
        CaptureController::new(mode.clone(), head, sensor, store, capture, &config.output_dir);
    let outcome = controller.run();

    mode.cancel();
    join("cancel-listener", listener);
    if let Some(keyboard) = keyboard {
        join("keyboard", keyboard);
    }
    outcome
}

fn join(name: &str, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        warn!("{name} thread panicked");
    }
}
