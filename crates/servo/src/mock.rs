//! In-memory PWM output for tests and dry runs.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::{PulseOutput, ServoError};

#[derive(Debug, Default)]
struct MockPwmState {
    enabled: bool,
    pulses: Vec<u32>,
    enable_count: u32,
    release_count: u32,
}

/// Records every pulse written instead of touching hardware.
///
/// The state lives behind a shared handle so a test can keep observing the
/// output after the `MockPwm` has been boxed into a [`crate::Servo`].
#[derive(Debug, Default)]
pub struct MockPwm {
    state: Arc<Mutex<MockPwmState>>,
}

/// Read-only view onto a [`MockPwm`].
#[derive(Clone, Debug)]
pub struct MockPwmHandle {
    state: Arc<Mutex<MockPwmState>>,
}

impl MockPwm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> MockPwmHandle {
        MockPwmHandle {
            state: self.state.clone(),
        }
    }
}

fn lock(state: &Mutex<MockPwmState>) -> MutexGuard<'_, MockPwmState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PulseOutput for MockPwm {
    fn enable(&mut self) -> Result<(), ServoError> {
        let mut state = lock(&self.state);
        state.enabled = true;
        state.enable_count += 1;
        Ok(())
    }

    fn set_pulse_width(&mut self, pulse_us: u32) -> Result<(), ServoError> {
        lock(&self.state).pulses.push(pulse_us);
        Ok(())
    }

    fn release(&mut self) -> Result<(), ServoError> {
        let mut state = lock(&self.state);
        state.enabled = false;
        state.release_count += 1;
        Ok(())
    }
}

impl MockPwmHandle {
    pub fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    pub fn pulses(&self) -> Vec<u32> {
        lock(&self.state).pulses.clone()
    }

    pub fn last_pulse(&self) -> Option<u32> {
        lock(&self.state).pulses.last().copied()
    }

    pub fn enable_count(&self) -> u32 {
        lock(&self.state).enable_count
    }

    pub fn release_count(&self) -> u32 {
        lock(&self.state).release_count
    }
}
