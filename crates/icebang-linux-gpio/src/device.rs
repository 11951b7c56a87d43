//! Board wiring and programmer option parsing
//!
//! Both devices are described by `key=value` options from the programmer
//! string. Lines are offsets on a single GPIO chip; the FPGA clock is a PWM
//! channel given as `clock=<pwmchip>:<channel>`.

use gpiocdev::line::Offset;

use icebang_core::flash::{FlashConfig, FlashPins, SpiFlash};
use icebang_core::fpga::FpgaConfig;
use icebang_core::ice::{IceFpga, IcePins};

use crate::error::{LinuxGpioError, Result};
use crate::line::{GpioLine, SleepDelay};
use crate::pwm::PwmClock;

/// FPGA device on Linux GPIO
pub type LinuxIceFpga = IceFpga<GpioLine, PwmClock, SleepDelay>;

/// Flash device on Linux GPIO
pub type LinuxSpiFlash = SpiFlash<GpioLine, SleepDelay>;

/// Wiring of the FPGA configuration interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxGpioFpgaConfig {
    /// Device path (e.g., "/dev/gpiochip0")
    pub device: String,
    /// CDONE line offset
    pub cdone: Offset,
    /// CRESET_B line offset
    pub creset: Offset,
    /// Configuration chip-select line offset
    pub cs: Offset,
    /// Configuration data line offset
    pub mosi: Offset,
    /// Configuration clock line offset
    pub sck: Offset,
    /// PWM chip number of the FPGA clock
    pub pwm_chip: u32,
    /// PWM channel of the FPGA clock
    pub pwm_channel: u32,
}

/// Wiring of the flash bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxGpioFlashConfig {
    /// Device path (e.g., "/dev/gpiochip0")
    pub device: String,
    /// Clock line offset
    pub sck: Offset,
    /// Data towards the flash
    pub mosi: Offset,
    /// Data from the flash
    pub miso: Offset,
    /// Chip select line offset
    pub cs: Offset,
    /// Bus frequency override from `spispeed=<kHz>`
    pub frequency_hz: Option<u32>,
}

/// Key/value options with the `dev`/`gpiochip` handling shared by both devices
struct Options<'a> {
    options: &'a [(&'a str, &'a str)],
}

impl<'a> Options<'a> {
    fn get(&self, key: &str) -> Option<&'a str> {
        self.options
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
    }

    fn offset(&self, key: &'static str) -> Result<Offset> {
        let value = self.get(key).ok_or(LinuxGpioError::MissingParameter(key))?;
        value
            .parse()
            .map_err(|_| LinuxGpioError::InvalidParameter(format!("Invalid {} value: {}", key, value)))
    }

    fn device(&self) -> Result<String> {
        match (self.get("dev"), self.get("gpiochip")) {
            (Some(_), Some(_)) => Err(LinuxGpioError::InvalidParameter(
                "Only one of 'dev' or 'gpiochip' can be specified".to_string(),
            )),
            (Some(dev), None) if !dev.is_empty() => Ok(dev.to_string()),
            (None, Some(n)) => {
                let n: u32 = n.parse().map_err(|_| {
                    LinuxGpioError::InvalidParameter(format!("Invalid gpiochip value: {}", n))
                })?;
                Ok(format!("/dev/gpiochip{}", n))
            }
            _ => Err(LinuxGpioError::NoDevice),
        }
    }

    fn warn_unknown(&self, known: &[&str]) {
        for (key, value) in self.options {
            if !known.contains(key) {
                log::warn!("linux_gpio: Unknown option: {}={}", key, value);
            }
        }
    }
}

/// Parse FPGA wiring from programmer options
///
/// # Supported Options
///
/// - `dev=/dev/gpiochipN` or `gpiochip=N` - GPIO chip (required)
/// - `cdone=N`, `creset=N` - control line offsets (required)
/// - `cs=N`, `mosi=N`, `sck=N` - configuration bus line offsets (required)
/// - `clock=C:N` - PWM chip `C` channel `N` driving the FPGA clock (required)
pub fn parse_fpga_options(options: &[(&str, &str)]) -> Result<LinuxGpioFpgaConfig> {
    let opts = Options { options };
    opts.warn_unknown(&["dev", "gpiochip", "cdone", "creset", "cs", "mosi", "sck", "clock"]);

    let clock = opts.get("clock").ok_or(LinuxGpioError::MissingParameter("clock"))?;
    let (pwm_chip, pwm_channel) = clock
        .split_once(':')
        .and_then(|(chip, channel)| Some((chip.parse().ok()?, channel.parse().ok()?)))
        .ok_or_else(|| {
            LinuxGpioError::InvalidParameter(format!(
                "Invalid clock value: {} (expected <pwmchip>:<channel>)",
                clock
            ))
        })?;

    Ok(LinuxGpioFpgaConfig {
        device: opts.device()?,
        cdone: opts.offset("cdone")?,
        creset: opts.offset("creset")?,
        cs: opts.offset("cs")?,
        mosi: opts.offset("mosi")?,
        sck: opts.offset("sck")?,
        pwm_chip,
        pwm_channel,
    })
}

/// Parse flash wiring from programmer options
///
/// # Supported Options
///
/// - `dev=/dev/gpiochipN` or `gpiochip=N` - GPIO chip (required)
/// - `sck=N`, `mosi=N`, `miso=N`, `cs=N` - bus line offsets (required)
/// - `spispeed=N` - bus speed in kHz (optional)
pub fn parse_flash_options(options: &[(&str, &str)]) -> Result<LinuxGpioFlashConfig> {
    let opts = Options { options };
    opts.warn_unknown(&["dev", "gpiochip", "sck", "mosi", "miso", "cs", "spispeed"]);

    let frequency_hz = match opts.get("spispeed") {
        Some(value) => {
            let khz: u32 = value.parse().map_err(|_| {
                LinuxGpioError::InvalidParameter(format!("Invalid spispeed value: {}", value))
            })?;
            Some(khz.saturating_mul(1000))
        }
        None => None,
    };

    Ok(LinuxGpioFlashConfig {
        device: opts.device()?,
        sck: opts.offset("sck")?,
        mosi: opts.offset("mosi")?,
        miso: opts.offset("miso")?,
        cs: opts.offset("cs")?,
        frequency_hz,
    })
}

/// Request the FPGA lines and bind them to a device
///
/// Lines are requested as inputs; nothing is driven until the first
/// operation.
pub fn open_fpga(config: &LinuxGpioFpgaConfig, fpga_config: FpgaConfig) -> Result<LinuxIceFpga> {
    log::debug!("linux_gpio: opening FPGA on {}", config.device);
    let pins = IcePins {
        cdone: GpioLine::open(&config.device, config.cdone)?,
        clock: PwmClock::new(config.pwm_chip, config.pwm_channel),
        creset: GpioLine::open(&config.device, config.creset)?,
        cram_cs: GpioLine::open(&config.device, config.cs)?,
        cram_data_out: GpioLine::open(&config.device, config.mosi)?,
        cram_sck: GpioLine::open(&config.device, config.sck)?,
    };
    log::info!(
        "linux_gpio: FPGA on {} (cdone={}, creset={}, cs={}, mosi={}, sck={}, clock=pwmchip{}:{})",
        config.device,
        config.cdone,
        config.creset,
        config.cs,
        config.mosi,
        config.sck,
        config.pwm_chip,
        config.pwm_channel
    );
    Ok(IceFpga::with_config(
        pins,
        SleepDelay,
        fpga_config,
        Default::default(),
    ))
}

/// Request the flash lines and bind them to a driver
pub fn open_flash(config: &LinuxGpioFlashConfig, flash_config: FlashConfig) -> Result<LinuxSpiFlash> {
    let flash_config = match config.frequency_hz {
        Some(hz) => flash_config.with_frequency_hz(hz),
        None => flash_config,
    };
    let pins = FlashPins {
        sck: GpioLine::open(&config.device, config.sck)?,
        data_out: GpioLine::open(&config.device, config.mosi)?,
        data_in: GpioLine::open(&config.device, config.miso)?,
        cs: GpioLine::open(&config.device, config.cs)?,
    };
    log::info!(
        "linux_gpio: flash on {} (sck={}, mosi={}, miso={}, cs={})",
        config.device,
        config.sck,
        config.mosi,
        config.miso,
        config.cs
    );
    Ok(SpiFlash::new(pins, SleepDelay, flash_config))
}
