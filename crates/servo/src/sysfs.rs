//! Linux sysfs PWM backend.
//!
//! Drives `/sys/class/pwm/pwmchip<N>/pwm<M>`. On a Raspberry Pi this needs the
//! `pwm-2chan` overlay (GPIO18 → channel 0, GPIO19 → channel 1).
//!
//! Disabling a PWM channel leaves most controllers holding the pin at its
//! inactive level, so `release` also claims the signal line through
//! `/sys/class/gpio` and turns it into an input. `enable` frees the line again
//! before re-arming the channel.

use std::{
    fs, io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::{PWM_PERIOD_US, PulseOutput, ServoError};

const SYSFS_PWM_ROOT: &str = "/sys/class/pwm";
const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";
/// udev may take a moment to hand an exported node to our group.
const EXPORT_TIMEOUT: Duration = Duration::from_millis(500);

pub struct SysfsPwm {
    chip_dir: PathBuf,
    channel: u32,
    exported_here: bool,
    line: GpioLine,
}

/// The GPIO view of the signal pin, used only while the servo is released.
struct GpioLine {
    root: PathBuf,
    pin: u32,
    exported_here: bool,
}

impl SysfsPwm {
    pub fn new(chip: u32, channel: u32, pin: u32) -> Self {
        Self::with_roots(SYSFS_PWM_ROOT, SYSFS_GPIO_ROOT, chip, channel, pin)
    }

    /// Use alternative sysfs roots (tests, containers with a bind mount).
    pub fn with_roots(
        pwm_root: impl AsRef<Path>,
        gpio_root: impl AsRef<Path>,
        chip: u32,
        channel: u32,
        pin: u32,
    ) -> Self {
        Self {
            chip_dir: pwm_root.as_ref().join(format!("pwmchip{chip}")),
            channel,
            exported_here: false,
            line: GpioLine {
                root: gpio_root.as_ref().to_path_buf(),
                pin,
                exported_here: false,
            },
        }
    }

    fn channel_dir(&self) -> PathBuf {
        self.chip_dir.join(format!("pwm{}", self.channel))
    }

    fn write_attr(&self, attr: &str, value: impl ToString) -> Result<(), ServoError> {
        let path = self.channel_dir().join(attr);
        fs::write(&path, value.to_string()).map_err(|err| ServoError::Unavailable {
            channel: self.channel,
            reason: format!("write {}: {err}", path.display()),
        })
    }

    fn export(&mut self) -> Result<(), ServoError> {
        if self.channel_dir().exists() {
            return Ok(());
        }
        if !self.chip_dir.exists() {
            return Err(ServoError::Unavailable {
                channel: self.channel,
                reason: format!("{} does not exist", self.chip_dir.display()),
            });
        }
        fs::write(self.chip_dir.join("export"), self.channel.to_string())?;
        self.exported_here = true;
        wait_for(&self.channel_dir()).map_err(|reason| ServoError::Unavailable {
            channel: self.channel,
            reason,
        })
    }

    fn unexport(&mut self) {
        if !self.exported_here {
            return;
        }
        match fs::write(self.chip_dir.join("unexport"), self.channel.to_string()) {
            Ok(()) => self.exported_here = false,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(channel = self.channel, "failed to unexport pwm: {err}"),
        }
    }
}

impl GpioLine {
    fn dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    fn unavailable(&self, reason: String) -> ServoError {
        ServoError::Unavailable {
            channel: self.pin,
            reason: format!("gpio{}: {reason}", self.pin),
        }
    }

    /// Claim the line and make it an input.
    fn float(&mut self) -> Result<(), ServoError> {
        if !self.dir().exists() {
            fs::write(self.root.join("export"), self.pin.to_string())
                .map_err(|err| self.unavailable(format!("export: {err}")))?;
            self.exported_here = true;
            wait_for(&self.dir()).map_err(|reason| self.unavailable(reason))?;
        }
        fs::write(self.dir().join("direction"), "in")
            .map_err(|err| self.unavailable(format!("set direction: {err}")))?;
        debug!(pin = self.pin, "signal line floating");
        Ok(())
    }

    /// Give the line back so the PWM function can drive it.
    fn hand_back(&mut self) -> Result<(), ServoError> {
        if self.exported_here {
            fs::write(self.root.join("unexport"), self.pin.to_string())
                .map_err(|err| self.unavailable(format!("unexport: {err}")))?;
            self.exported_here = false;
        }
        Ok(())
    }
}

fn wait_for(dir: &Path) -> Result<(), String> {
    let deadline = Instant::now() + EXPORT_TIMEOUT;
    while !dir.exists() {
        if Instant::now() >= deadline {
            return Err(format!("export did not create {}", dir.display()));
        }
        thread::sleep(Duration::from_millis(10));
    }
    Ok(())
}

impl PulseOutput for SysfsPwm {
    fn enable(&mut self) -> Result<(), ServoError> {
        self.line.hand_back()?;
        self.export()?;
        // Period must be set before a duty cycle larger than the old period.
        self.write_attr("period", u64::from(PWM_PERIOD_US) * 1_000)?;
        self.write_attr("enable", 1)?;
        debug!(
            chip = %self.chip_dir.display(),
            channel = self.channel,
            "pwm enabled"
        );
        Ok(())
    }

    fn set_pulse_width(&mut self, pulse_us: u32) -> Result<(), ServoError> {
        self.write_attr("duty_cycle", u64::from(pulse_us) * 1_000)
    }

    fn release(&mut self) -> Result<(), ServoError> {
        self.write_attr("enable", 0)?;
        self.unexport();
        self.line.float()
    }
}
