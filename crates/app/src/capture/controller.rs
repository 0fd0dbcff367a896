//! The capture state machine: Wait, Search, Adjust, Capture, End.
//!
//! The controller owns the pan/tilt head and the sensor. The only state it
//! shares is the [`ModeCell`], which it re-reads at every loop iteration so a
//! cancellation from another thread takes effect within one step.

use std::{
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, TimeDelta};
use face_detect::VisionSensor;
use servo::{Servo, ServoError};
use tracing::{debug, error, info, info_span, warn};

use super::{
    mode::{Mode, ModeCell},
    output,
    schedule::{ScheduleEntry, ScheduleStore},
    settings::CaptureConfig,
};

type Clock = Box<dyn Fn() -> NaiveDateTime + Send>;

/// Gap between polls in Adjust while no face is visible.
const LOST_FACE_PAUSE: Duration = Duration::from_millis(50);

/// The two axes of the pan/tilt head.
pub struct Head {
    pub horizontal: Servo,
    pub vertical: Servo,
}

impl std::fmt::Debug for Head {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Head").finish_non_exhaustive()
    }
}

impl Head {
    pub fn new(horizontal: Servo, vertical: Servo) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }

    pub fn start(&mut self) -> Result<(), ServoError> {
        self.horizontal.start()?;
        self.vertical.start()
    }

    pub fn stop(&mut self) -> Result<(), ServoError> {
        let horizontal = self.horizontal.stop();
        self.vertical.stop()?;
        horizontal
    }

    pub fn home(&mut self) -> Result<()> {
        skip_out_of_range(self.horizontal.home())?;
        skip_out_of_range(self.vertical.home())
    }
}

/// Command one axis. Out-of-range targets are logged and skipped; anything
/// else from the driver is fatal.
pub fn move_axis(servo: &mut Servo, target: i32) -> Result<()> {
    skip_out_of_range(servo.set_angle(target))
}

fn skip_out_of_range(command: Result<(), ServoError>) -> Result<()> {
    match command {
        Ok(()) => Ok(()),
        Err(err @ ServoError::OutOfRange { .. }) => {
            warn!("ignoring servo command: {err}");
            Ok(())
        }
        Err(err) => Err(err).context("servo command failed"),
    }
}

pub struct CaptureController<S, St> {
    mode: Arc<ModeCell>,
    head: Head,
    sensor: S,
    store: St,
    config: CaptureConfig,
    output_dir: PathBuf,
    clock: Clock,
    /// Entry loaded by the last Wait; Capture advances this one.
    schedule: Option<ScheduleEntry>,
}

impl<S: VisionSensor, St: ScheduleStore> CaptureController<S, St> {
    pub fn new(
        mode: Arc<ModeCell>,
        head: Head,
        sensor: S,
        store: St,
        config: CaptureConfig,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mode,
            head,
            sensor,
            store,
            config,
            output_dir: output_dir.into(),
            clock: Box::new(|| Local::now().naive_local()),
            schedule: None,
        }
    }

    #[cfg(test)]
    fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Drive the machine until `End`.
    ///
    /// The head and the sensor are released on every way out, including a
    /// fatal error, which is returned after cleanup.
    pub fn run(&mut self) -> Result<()> {
        info!(
            output = %self.output_dir.display(),
            every = %self.config.update_interval,
            "capture loop started"
        );
        let outcome = self.drive();
        if let Err(err) = &outcome {
            error!("capture loop failed: {err:#}");
            self.mode.cancel();
        }
        self.shutdown();
        outcome
    }

    fn drive(&mut self) -> Result<()> {
        loop {
            let mode = self.mode.get();
            let _span = info_span!("mode", mode = mode.label()).entered();
            match mode {
                Mode::Wait => self.wait()?,
                Mode::Search => self.search()?,
                Mode::Adjust => self.adjust()?,
                Mode::Capture => self.capture()?,
                Mode::End => return Ok(()),
            }
        }
    }

    fn wait(&mut self) -> Result<()> {
        let entry = self.store.load().context("failed to load the schedule")?;
        self.schedule = Some(entry);
        info!(next = %entry.target, "waiting for the next capture");

        while !self.mode.is_cancelled() {
            let remaining = entry.target - (self.clock)();
            if remaining <= TimeDelta::zero() {
                self.transition(Mode::Search);
                return Ok(());
            }
            let remaining = remaining.to_std().unwrap_or(self.config.wait_poll);
            thread::sleep(remaining.min(self.config.wait_poll));
        }
        Ok(())
    }

    fn search(&mut self) -> Result<()> {
        self.head.start().context("failed to power the head")?;
        self.sensor.start().context("failed to start the sensor")?;

        let step = self.config.scan_step as usize;
        let rows = self.head.vertical.state().min_angle..self.head.vertical.state().max_angle;
        let cols = self.head.horizontal.state().min_angle..self.head.horizontal.state().max_angle;
        let mut polls = 0usize;

        for v in rows.step_by(step) {
            if self.mode.is_cancelled() {
                break;
            }
            move_axis(&mut self.head.vertical, v)?;
            for h in cols.clone().step_by(step) {
                if self.mode.is_cancelled() {
                    break;
                }
                move_axis(&mut self.head.horizontal, h)?;
                let result = self.sensor.detect().context("sensor poll failed")?;
                polls += 1;
                if let Some(face) = result.primary() {
                    info!(
                        vertical = v,
                        horizontal = h,
                        polls,
                        faces = result.faces.len(),
                        "face found at ({}, {})",
                        face.x,
                        face.y
                    );
                    self.transition(Mode::Adjust);
                    return Ok(());
                }
                pause(self.config.search_dwell);
            }
        }

        if self.mode.is_cancelled() {
            debug!(polls, "search cancelled");
            // Refused while End holds.
            self.transition(Mode::Adjust);
            return Ok(());
        }

        info!(
            polls,
            backoff = ?self.config.research_backoff,
            "no face in the scan, backing off"
        );
        self.head.home()?;
        self.release_hardware()?;
        self.sleep_unless_cancelled(self.config.research_backoff);
        Ok(())
    }

    fn adjust(&mut self) -> Result<()> {
        let tolerance = self.config.tolerance;
        let mut last_seen = Instant::now();

        while !self.mode.is_cancelled() {
            let result = self.sensor.detect().context("sensor poll failed")?;
            let Some(face) = result.primary() else {
                if last_seen.elapsed() > self.config.adjust_timeout {
                    info!(
                        timeout = ?self.config.adjust_timeout,
                        "face lost, searching again"
                    );
                    self.transition(Mode::Search);
                    return Ok(());
                }
                pause(LOST_FACE_PAUSE.min(self.config.adjust_timeout));
                continue;
            };
            last_seen = Instant::now();

            let (face_x, face_y) = face.centroid();
            let (center_x, center_y) = result.frame.center();
            let dh = nudge(face_x, center_x, tolerance);
            let dv = nudge(face_y, center_y, tolerance);
            if dh == 0 && dv == 0 {
                info!(
                    horizontal = self.head.horizontal.angle(),
                    vertical = self.head.vertical.angle(),
                    "face centered"
                );
                self.transition(Mode::Capture);
                return Ok(());
            }
            debug!(face_x, face_y, dh, dv, "nudging");
            if dh != 0 {
                skip_out_of_range(self.head.horizontal.step_by(dh))?;
            }
            if dv != 0 {
                skip_out_of_range(self.head.vertical.step_by(dv))?;
            }
        }
        Ok(())
    }

    fn capture(&mut self) -> Result<()> {
        let result = self.sensor.detect().context("failed to capture a frame")?;
        let taken_at = (self.clock)();
        let path = output::capture_path(&self.output_dir, &taken_at);
        output::write_jpeg(&path, &result.frame, self.config.jpeg_quality)?;
        info!(path = %path.display(), "image captured");

        let entry = match self.schedule.take() {
            Some(entry) => entry,
            None => self.store.load().context("failed to load the schedule")?,
        };
        let next = entry.advanced()?;
        self.store.save(&next).context("failed to save the schedule")?;
        info!(next = %next.target, "next capture scheduled");

        self.release_hardware()?;
        self.transition(Mode::Wait);
        Ok(())
    }

    fn transition(&self, next: Mode) {
        let from = self.mode.get();
        if self.mode.request(next) {
            debug!(%from, to = %next, "mode change");
        } else {
            debug!(to = %next, "run is ending, transition dropped");
        }
    }

    fn release_hardware(&mut self) -> Result<()> {
        self.head.stop().context("failed to release the head")?;
        self.sensor.stop().context("failed to stop the sensor")?;
        debug!("hardware released");
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Err(err) = self.head.stop() {
            warn!("failed to release the head: {err}");
        }
        if let Err(err) = self.sensor.stop() {
            warn!("failed to stop the sensor: {err}");
        }
        info!("capture loop finished");
    }

    fn sleep_unless_cancelled(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while !self.mode.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(self.config.wait_poll));
        }
    }
}

/// ±1 degree toward the center once the offset leaves the dead-band.
fn nudge(position: f64, center: f64, tolerance: f64) -> i32 {
    if position > center + tolerance {
        1
    } else if position < center - tolerance {
        -1
    } else {
        0
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
