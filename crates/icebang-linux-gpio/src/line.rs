//! Single GPIO lines on top of the character device interface

use std::time::Duration;

use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};

use icebang_core::error::{Error as CoreError, Result as CoreResult};
use icebang_core::line::{Delay, DigitalLine, Direction};

use crate::error::{LinuxGpioError, Result};

/// Consumer label shown by `gpioinfo`
const CONSUMER: &str = "icebang";

fn to_value(high: bool) -> Value {
    if high {
        Value::Active
    } else {
        Value::Inactive
    }
}

/// One GPIO line with its own line request
///
/// The line is requested as an input, so opening it never drives the pin.
/// Direction changes reconfigure the request in place.
pub struct GpioLine {
    request: Request,
    offset: Offset,
    direction: Direction,
    level: bool,
}

impl GpioLine {
    /// Request `offset` on `chip` (e.g. "/dev/gpiochip0") as an input
    pub fn open(chip: &str, offset: Offset) -> Result<Self> {
        let mut config = Config::default();
        config.with_line(offset).as_input();
        let request = Request::from_config(config)
            .on_chip(chip)
            .with_consumer(CONSUMER)
            .request()
            .map_err(|source| LinuxGpioError::LineRequestFailed {
                chip: chip.to_string(),
                offset,
                source,
            })?;

        log::debug!("linux_gpio: requested {} line {}", chip, offset);
        Ok(Self {
            request,
            offset,
            direction: Direction::Input,
            level: false,
        })
    }

    fn reconfigure(&mut self, direction: Direction) -> CoreResult<()> {
        let mut config = Config::default();
        match direction {
            Direction::Output => {
                config.with_line(self.offset).as_output(to_value(self.level));
            }
            Direction::Input => {
                config.with_line(self.offset).as_input();
            }
        }
        self.request.reconfigure(&config).map(|_| ()).map_err(|e| {
            log::error!("Failed to reconfigure GPIO line {}: {}", self.offset, e);
            CoreError::LineFault
        })
    }
}

impl DigitalLine for GpioLine {
    fn id(&self) -> u32 {
        self.offset
    }

    fn set_direction(&mut self, direction: Direction) -> CoreResult<()> {
        if self.direction == direction {
            return Ok(());
        }
        self.reconfigure(direction)?;
        self.direction = direction;
        Ok(())
    }

    fn set_level(&mut self, high: bool) -> CoreResult<()> {
        self.level = high;
        if self.direction == Direction::Input {
            // Latched and applied when the line becomes an output
            return Ok(());
        }
        self.request
            .set_value(self.offset, to_value(high))
            .map(|_| ())
            .map_err(|e| {
                log::error!("Failed to set GPIO line {}: {}", self.offset, e);
                CoreError::LineFault
            })
    }

    fn drive(&mut self, high: bool) -> CoreResult<()> {
        // Request the output with its final level so the pin never glitches
        self.level = high;
        if self.direction == Direction::Output {
            return self.set_level(high);
        }
        self.set_direction(Direction::Output)
    }

    fn level(&mut self) -> CoreResult<bool> {
        match self.request.value(self.offset) {
            Ok(Value::Active) => Ok(true),
            Ok(Value::Inactive) => Ok(false),
            Err(e) => {
                log::error!("Failed to read GPIO line {}: {}", self.offset, e);
                Err(CoreError::LineFault)
            }
        }
    }
}

/// Busy-free delay backed by `thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepDelay;

impl Delay for SleepDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns as u64));
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }
}
