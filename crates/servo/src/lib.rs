//! Single-axis hobby servo control for the pan/tilt head.
//!
//! A [`Servo`] owns the angle state of one rotational axis and drives a
//! [`PulseOutput`] backend:
//! - `sysfs`: Linux PWM channels under `/sys/class/pwm`.
//! - `mock`: in-memory output used by tests and dry runs.
//!
//! Angles map linearly onto a 500-2500 µs pulse over 0-180 degrees at 50 Hz.
//! Construction never powers the output; `start`/`stop` bracket the powered
//! lifetime.

use std::{thread, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod mock;
pub mod sysfs;

pub use mock::{MockPwm, MockPwmHandle};
pub use sysfs::SysfsPwm;

/// Pulse width commanding 0 degrees.
pub const MIN_PULSE_US: u32 = 500;
/// Pulse width commanding 180 degrees.
pub const MAX_PULSE_US: u32 = 2_500;
/// Full mechanical travel covered by the pulse range.
pub const FULL_TRAVEL_DEG: i32 = 180;
/// 50 Hz servo frame.
pub const PWM_PERIOD_US: u32 = 20_000;
/// Time allowed for the horn to reach a commanded angle.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum ServoError {
    #[error("angle {target} outside {min}..={max} on channel {channel}")]
    OutOfRange {
        channel: u32,
        target: i32,
        min: i32,
        max: i32,
    },
    #[error("invalid servo range {min}..={max} (home {home})")]
    InvalidRange { min: i32, max: i32, home: i32 },
    #[error("PWM channel {channel} is not available: {reason}")]
    Unavailable { channel: u32, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Hardware signal driving one servo.
///
/// Implementations only move pulses; range checking and angle bookkeeping
/// belong to [`Servo`].
pub trait PulseOutput: Send {
    /// Claim the channel and enable the 50 Hz carrier.
    fn enable(&mut self) -> Result<(), ServoError>;
    /// Set the high time of each period.
    fn set_pulse_width(&mut self, pulse_us: u32) -> Result<(), ServoError>;
    /// Stop the carrier, release the channel and leave the signal pin
    /// high-impedance so the horn is no longer held.
    fn release(&mut self) -> Result<(), ServoError>;
}

/// Per-axis settings as stored in the servo settings file.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServoSettings {
    /// GPIO line carrying the signal. Switched to input on release.
    pub pin: u32,
    /// PWM channel on the chip that drives `pin`.
    pub channel: u32,
    #[serde(default)]
    pub chip: u32,
    #[serde(default)]
    pub min_angle: i32,
    #[serde(default = "default_max_angle")]
    pub max_angle: i32,
    #[serde(default = "default_home_angle", alias = "home_angle")]
    pub ini_angle: i32,
}

fn default_max_angle() -> i32 {
    FULL_TRAVEL_DEG
}

fn default_home_angle() -> i32 {
    90
}

/// Angle bookkeeping for one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AxisState {
    pub channel: u32,
    pub min_angle: i32,
    pub max_angle: i32,
    pub current_angle: i32,
    pub home_angle: i32,
}

impl AxisState {
    pub fn new(
        channel: u32,
        min_angle: i32,
        max_angle: i32,
        home_angle: i32,
    ) -> Result<Self, ServoError> {
        if min_angle > max_angle
            || min_angle < 0
            || max_angle > FULL_TRAVEL_DEG
            || !(min_angle..=max_angle).contains(&home_angle)
        {
            return Err(ServoError::InvalidRange {
                min: min_angle,
                max: max_angle,
                home: home_angle,
            });
        }
        Ok(Self {
            channel,
            min_angle,
            max_angle,
            current_angle: home_angle,
            home_angle,
        })
    }

    pub fn contains(&self, angle: i32) -> bool {
        (self.min_angle..=self.max_angle).contains(&angle)
    }
}

/// Convert an angle in degrees to a pulse width in microseconds.
pub fn angle_to_pulse(angle: i32) -> u32 {
    let span = (MAX_PULSE_US - MIN_PULSE_US) as f32;
    let pulse = angle as f32 / FULL_TRAVEL_DEG as f32 * span + MIN_PULSE_US as f32;
    pulse.round() as u32
}

/// One axis of the pan/tilt head.
pub struct Servo {
    state: AxisState,
    output: Box<dyn PulseOutput>,
    settle: Duration,
    started: bool,
}

impl Servo {
    pub fn new(state: AxisState, output: Box<dyn PulseOutput>) -> Self {
        Self {
            state,
            output,
            settle: DEFAULT_SETTLE,
            started: false,
        }
    }

    /// Build a servo from settings, validating the configured range.
    pub fn from_settings(
        settings: &ServoSettings,
        output: Box<dyn PulseOutput>,
    ) -> Result<Self, ServoError> {
        let state = AxisState::new(
            settings.channel,
            settings.min_angle,
            settings.max_angle,
            settings.ini_angle,
        )?;
        Ok(Self::new(state, output))
    }

    /// Override the post-move settle delay.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn state(&self) -> &AxisState {
        &self.state
    }

    pub fn angle(&self) -> i32 {
        self.state.current_angle
    }

    /// Power the output. Calling it on a running servo is a no-op.
    pub fn start(&mut self) -> Result<(), ServoError> {
        if self.started {
            return Ok(());
        }
        self.output.enable()?;
        self.started = true;
        debug!(channel = self.state.channel, "servo started");
        Ok(())
    }

    /// Release the output and let the signal pin float.
    pub fn stop(&mut self) -> Result<(), ServoError> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        self.output.release()?;
        debug!(channel = self.state.channel, "servo stopped");
        Ok(())
    }

    /// Move to `target` degrees and block until the horn has settled.
    ///
    /// Out-of-range targets are rejected with [`ServoError::OutOfRange`] and
    /// leave the current angle untouched. On return the physical position is
    /// assumed to match [`Servo::angle`].
    pub fn set_angle(&mut self, target: i32) -> Result<(), ServoError> {
        if !self.state.contains(target) {
            return Err(ServoError::OutOfRange {
                channel: self.state.channel,
                target,
                min: self.state.min_angle,
                max: self.state.max_angle,
            });
        }
        self.output.set_pulse_width(angle_to_pulse(target))?;
        self.state.current_angle = target;
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        Ok(())
    }

    /// Nudge the current angle by `delta` degrees.
    pub fn step_by(&mut self, delta: i32) -> Result<(), ServoError> {
        self.set_angle(self.state.current_angle + delta)
    }

    pub fn home(&mut self) -> Result<(), ServoError> {
        self.set_angle(self.state.home_angle)
    }
}

impl Drop for Servo {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(channel = self.state.channel, "failed to release servo: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servo(min: i32, max: i32, home: i32) -> (Servo, MockPwmHandle) {
        let pwm = MockPwm::new();
        let handle = pwm.handle();
        let state = AxisState::new(17, min, max, home).unwrap();
        (
            Servo::new(state, Box::new(pwm)).with_settle(Duration::ZERO),
            handle,
        )
    }

    #[test]
    fn angle_to_pulse_spans_full_range() {
        assert_eq!(angle_to_pulse(0), 500);
        assert_eq!(angle_to_pulse(90), 1500);
        assert_eq!(angle_to_pulse(180), 2500);
        assert_eq!(angle_to_pulse(45), 1000);
    }

    #[test]
    fn in_range_targets_update_angle() {
        let (mut servo, handle) = servo(0, 160, 90);
        servo.start().unwrap();
        for target in [0, 1, 80, 159, 160] {
            servo.set_angle(target).unwrap();
            assert_eq!(servo.angle(), target);
        }
        assert_eq!(handle.last_pulse(), Some(angle_to_pulse(160)));
    }

    #[test]
    fn out_of_range_target_keeps_angle() {
        let (mut servo, handle) = servo(10, 130, 40);
        servo.start().unwrap();
        servo.set_angle(50).unwrap();
        let pulses = handle.pulses().len();

        for target in [9, 131, -1, 500] {
            let err = servo.set_angle(target).unwrap_err();
            assert!(matches!(err, ServoError::OutOfRange { target: t, .. } if t == target));
            assert_eq!(servo.angle(), 50);
        }
        assert_eq!(handle.pulses().len(), pulses);
    }

    #[test]
    fn home_moves_to_configured_angle() {
        let (mut servo, _) = servo(0, 130, 40);
        servo.set_angle(100).unwrap();
        servo.home().unwrap();
        assert_eq!(servo.angle(), 40);
    }

    #[test]
    fn axis_starts_at_home() {
        let state = AxisState::new(18, 0, 130, 40).unwrap();
        assert_eq!(state.current_angle, 40);
        assert!(AxisState::new(18, 60, 20, 40).is_err());
        assert!(AxisState::new(18, 20, 60, 90).is_err());
        assert!(AxisState::new(18, 0, 200, 90).is_err());
    }

    #[test]
    fn dropping_a_started_servo_releases_it() {
        let (mut servo, handle) = servo(0, 180, 90);
        servo.start().unwrap();
        drop(servo);
        assert!(!handle.is_enabled());
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let (mut servo, handle) = servo(0, 180, 90);
        servo.start().unwrap();
        servo.start().unwrap();
        assert!(handle.is_enabled());
        assert_eq!(handle.enable_count(), 1);

        servo.stop().unwrap();
        servo.stop().unwrap();
        assert!(!handle.is_enabled());
        assert_eq!(handle.release_count(), 1);
    }
}
