//! Bench commands for checking the head and the sensor on their own.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use servo::AxisState;
use tracing::{info, warn};

use crate::capture::{
    controller::{Head, move_axis},
    hardware,
    listener::{self, InputEvent},
    mode::ModeCell,
    settings::SettingsFile,
};

/// Sweep the horizontal axis across a few vertical rows, alternating
/// direction each row, then return home. Ctrl+C stops between moves.
pub fn sweep(setting_path: &Path, dry_run: bool, rows: usize) -> Result<()> {
    let file = SettingsFile::load(setting_path)?;
    let step = file.capture_config()?.scan_step;
    let mut head = hardware::build_head(&file.servo_file()?, dry_run)?;

    let mode = Arc::new(ModeCell::new());
    let (events_tx, events_rx) = crossbeam_channel::unbounded::<InputEvent>();
    listener::install_interrupt_handler(events_tx);
    let listener = listener::spawn_listener(mode.clone(), events_rx)?;

    let outcome = run_sweep(&mut head, &mode, step, rows);

    if let Err(err) = head.stop() {
        warn!("failed to release the head: {err}");
    }
    mode.cancel();
    if listener.join().is_err() {
        warn!("cancel-listener thread panicked");
    }
    outcome
}

fn run_sweep(head: &mut Head, mode: &ModeCell, step: i32, rows: usize) -> Result<()> {
    head.start().context("failed to power the head")?;
    let plan = sweep_plan(head.vertical.state(), head.horizontal.state(), step, rows);
    'rows: for (vertical, columns) in plan {
        info!(vertical, "sweeping row");
        move_axis(&mut head.vertical, vertical)?;
        for horizontal in columns {
            if mode.is_cancelled() {
                info!("sweep interrupted");
                break 'rows;
            }
            move_axis(&mut head.horizontal, horizontal)?;
        }
    }
    head.home()?;
    info!("sweep finished");
    Ok(())
}

/// Rows sit every two steps above the vertical minimum; each row covers the
/// full horizontal range inclusive of both ends.
fn sweep_plan(
    vertical: &AxisState,
    horizontal: &AxisState,
    step: i32,
    rows: usize,
) -> Vec<(i32, Vec<i32>)> {
    let forward: Vec<i32> = (horizontal.min_angle..=horizontal.max_angle)
        .step_by(step.max(1) as usize)
        .collect();
    (1..=rows as i32)
        .map(|row| vertical.min_angle + 2 * step * row)
        .take_while(|angle| *angle <= vertical.max_angle)
        .enumerate()
        .map(|(index, angle)| {
            let mut columns = forward.clone();
            if index % 2 == 1 {
                columns.reverse();
            }
            (angle, columns)
        })
        .collect()
}

/// Start the sensor, log `polls` detections and stop it.
pub fn detect(setting_path: &Path, polls: usize) -> Result<()> {
    let file = SettingsFile::load(setting_path)?;
    let mut sensor = hardware::build_sensor(&file.camera_file()?)?;
    sensor.start().context("failed to start the sensor")?;
    let outcome = (1..=polls).try_for_each(|poll| -> Result<()> {
        let result = sensor.detect().context("sensor poll failed")?;
        let (center_x, center_y) = result.frame.center();
        if result.faces.is_empty() {
            info!(poll, "no face");
        }
        for face in &result.faces {
            let (x, y) = face.centroid();
            info!(
                poll,
                dx = x - center_x,
                dy = y - center_y,
                width = face.width,
                height = face.height,
                "face"
            );
        }
        Ok(())
    });
    sensor.stop().context("failed to stop the sensor")?;
    outcome
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use servo::{MockPwm, Servo};

    use super::*;

    fn axis(channel: u32, min: i32, max: i32, home: i32) -> AxisState {
        AxisState::new(channel, min, max, home).unwrap()
    }

    #[test]
    fn plan_alternates_direction() {
        let plan = sweep_plan(&axis(1, 0, 130, 40), &axis(0, 0, 160, 90), 10, 3);
        let rows: Vec<i32> = plan.iter().map(|(v, _)| *v).collect();
        assert_eq!(rows, vec![20, 40, 60]);
        assert_eq!(plan[0].1.first(), Some(&0));
        assert_eq!(plan[0].1.last(), Some(&160));
        assert_eq!(plan[1].1.first(), Some(&160));
        assert_eq!(plan[1].1.len(), 17);
    }

    #[test]
    fn plan_stops_at_vertical_limit() {
        let plan = sweep_plan(&axis(1, 0, 50, 40), &axis(0, 0, 20, 10), 10, 5);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn sweep_returns_home() {
        let servo = |channel, max, home| {
            Servo::new(axis(channel, 0, max, home), Box::new(MockPwm::new()))
                .with_settle(Duration::ZERO)
        };
        let mut head = Head::new(servo(0, 160, 90), servo(1, 130, 40));
        let mode = ModeCell::new();

        run_sweep(&mut head, &mode, 10, 3).unwrap();

        assert_eq!(head.horizontal.angle(), 90);
        assert_eq!(head.vertical.angle(), 40);
    }
}
