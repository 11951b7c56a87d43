//! FPGA clock from a sysfs PWM channel
//!
//! The kernel exposes hardware PWM outputs under `/sys/class/pwm/pwmchipN`.
//! A channel is exported on first use and run at a 50% duty cycle.

use std::fs;
use std::path::{Path, PathBuf};

use icebang_core::error::{Error as CoreError, Result as CoreResult};
use icebang_core::line::ClockLine;

use crate::error::{LinuxGpioError, Result};

/// Root of the sysfs PWM class
pub const SYSFS_PWM_ROOT: &str = "/sys/class/pwm";

/// A PWM channel used as the FPGA system clock
pub struct PwmClock {
    chip: PathBuf,
    channel: u32,
}

impl PwmClock {
    /// Bind `pwmchip<chip>` channel `channel` under the sysfs root
    pub fn new(chip: u32, channel: u32) -> Self {
        Self::with_root(SYSFS_PWM_ROOT, chip, channel)
    }

    /// Bind a channel below an alternative sysfs root
    pub fn with_root(root: impl AsRef<Path>, chip: u32, channel: u32) -> Self {
        Self {
            chip: root.as_ref().join(format!("pwmchip{}", chip)),
            channel,
        }
    }

    fn channel_dir(&self) -> PathBuf {
        self.chip.join(format!("pwm{}", self.channel))
    }

    fn write(path: &Path, value: impl ToString) -> Result<()> {
        fs::write(path, value.to_string()).map_err(|source| LinuxGpioError::PwmFailed {
            path: path.display().to_string(),
            source,
        })
    }

    fn export(&self) -> Result<()> {
        if self.channel_dir().exists() {
            return Ok(());
        }
        log::debug!("linux_gpio: exporting {}", self.channel_dir().display());
        Self::write(&self.chip.join("export"), self.channel)
    }

    fn run(&self, frequency_khz: u32) -> Result<()> {
        self.export()?;
        let dir = self.channel_dir();
        let period_ns = 1_000_000 / frequency_khz;

        // Duty cycle must never exceed the period, so shrink it first
        Self::write(&dir.join("enable"), 0)?;
        Self::write(&dir.join("duty_cycle"), 0)?;
        Self::write(&dir.join("period"), period_ns)?;
        Self::write(&dir.join("duty_cycle"), period_ns / 2)?;
        Self::write(&dir.join("enable"), 1)
    }

    fn halt(&self) -> Result<()> {
        let enable = self.channel_dir().join("enable");
        if !enable.exists() {
            return Ok(());
        }
        Self::write(&enable, 0)
    }
}

impl ClockLine for PwmClock {
    fn id(&self) -> u32 {
        self.channel
    }

    fn start_clock(&mut self, frequency_khz: u32) -> CoreResult<()> {
        if frequency_khz == 0 || frequency_khz > 1_000_000 {
            return Err(CoreError::InvalidFrequency);
        }
        self.run(frequency_khz).map_err(|e| {
            log::error!("{}", e);
            CoreError::ClockFault
        })
    }

    fn stop_clock(&mut self) -> CoreResult<()> {
        self.halt().map_err(|e| {
            log::error!("{}", e);
            CoreError::ClockFault
        })
    }
}
