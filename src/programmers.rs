//! Programmer registration and dispatch
//!
//! This module provides a centralized registry for all programmers, with
//! support for feature-gated inclusion and dynamic help text generation.

use icebang_core::flash::FlashConfig;
use icebang_core::fpga::FpgaConfig;
use thiserror::Error;

use crate::handle::{FlashHandle, FpgaHandle};

/// Information about a programmer
pub struct ProgrammerInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Errors raised while opening a programmer
#[derive(Debug, Error)]
pub enum OpenError {
    /// No compiled-in programmer matches the name
    #[error("Unknown programmer: {name}\n\n{help}\nUse 'icebang list-programmers' for more details")]
    Unknown { name: String, help: String },

    /// The programmer rejected its options
    #[error("Invalid {programmer} parameters: {message}")]
    InvalidOptions {
        programmer: &'static str,
        message: String,
    },

    /// The programmer could not claim its hardware
    #[cfg(feature = "linux-gpio")]
    #[error("Failed to open GPIO lines: {0}\nMake sure the device exists and you have read/write permissions.")]
    LinuxGpio(#[from] icebang_linux_gpio::LinuxGpioError),
}

/// Get information about all available programmers (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        aliases: &[],
        description: "Simulated iCE40 board with SPI flash (configured=1, stuck=1, busy=<n>)",
    });

    #[cfg(feature = "linux-gpio")]
    programmers.push(ProgrammerInfo {
        name: "linux_gpio",
        aliases: &["linux-gpio", "gpio"],
        description: "Linux GPIO character device (dev=/dev/gpiochipN or gpiochip=N, per-pin offsets)",
    });

    programmers
}

/// Generate help text listing all available programmers
pub fn programmer_help() -> String {
    let programmers = available_programmers();

    if programmers.is_empty() {
        return "No programmers available (recompile with programmer features enabled)".to_string();
    }

    let mut help = String::from("Available programmers:\n");
    for p in &programmers {
        help.push_str(&format!("  {:12} - {}\n", p.name, p.description));
    }
    help
}

/// Resolve a programmer name or alias to its primary name
pub fn find_programmer(name: &str) -> Option<&'static str> {
    available_programmers()
        .into_iter()
        .find(|p| p.name == name || p.aliases.contains(&name))
        .map(|p| p.name)
}

/// Parse a programmer string into name and options
///
/// Format: "name" or "name:option1=value1,option2=value2"
pub fn parse_programmer_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

fn resolve(programmer: &str) -> Result<(&'static str, Vec<(&str, &str)>), OpenError> {
    let (name, options) = parse_programmer_string(programmer);
    let canonical = find_programmer(name).ok_or_else(|| OpenError::Unknown {
        name: name.to_string(),
        help: programmer_help(),
    })?;
    Ok((canonical, options))
}

/// Open the FPGA interface of a programmer
#[allow(unused_variables)]
pub fn open_fpga(programmer: &str, config: FpgaConfig) -> Result<Box<dyn FpgaHandle>, OpenError> {
    let (name, options) = resolve(programmer)?;

    match name {
        #[cfg(feature = "dummy")]
        "dummy" => {
            let board_config = icebang_dummy::parse_options(&options).map_err(|message| {
                OpenError::InvalidOptions {
                    programmer: "dummy",
                    message,
                }
            })?;
            let board = icebang_dummy::DummyBoard::new(board_config);
            Ok(Box::new(board.ice_fpga(config.frequency_khz)))
        }

        #[cfg(feature = "linux-gpio")]
        "linux_gpio" => {
            log::info!("Opening Linux GPIO programmer...");
            let wiring = icebang_linux_gpio::parse_fpga_options(&options)?;
            Ok(Box::new(icebang_linux_gpio::open_fpga(&wiring, config)?))
        }

        _ => Err(OpenError::Unknown {
            name: name.to_string(),
            help: programmer_help(),
        }),
    }
}

/// Open the flash bus of a programmer
#[allow(unused_variables)]
pub fn open_flash(programmer: &str, config: FlashConfig) -> Result<Box<dyn FlashHandle>, OpenError> {
    let (name, options) = resolve(programmer)?;

    match name {
        #[cfg(feature = "dummy")]
        "dummy" => {
            let board_config = icebang_dummy::parse_options(&options).map_err(|message| {
                OpenError::InvalidOptions {
                    programmer: "dummy",
                    message,
                }
            })?;
            let board = icebang_dummy::DummyBoard::new(board_config);
            Ok(Box::new(board.spi_flash(config)))
        }

        #[cfg(feature = "linux-gpio")]
        "linux_gpio" => {
            log::info!("Opening Linux GPIO programmer...");
            let wiring = icebang_linux_gpio::parse_flash_options(&options)?;
            Ok(Box::new(icebang_linux_gpio::open_flash(&wiring, config)?))
        }

        _ => Err(OpenError::Unknown {
            name: name.to_string(),
            help: programmer_help(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_programmer_string() {
        assert_eq!(parse_programmer_string("dummy"), ("dummy", vec![]));
        assert_eq!(
            parse_programmer_string("linux_gpio:gpiochip=0,cs=25"),
            ("linux_gpio", vec![("gpiochip", "0"), ("cs", "25")])
        );
    }

    #[test]
    fn test_unknown_programmer() {
        let err = open_flash("nonexistent", FlashConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, OpenError::Unknown { .. }));
    }

    #[cfg(feature = "linux-gpio")]
    #[test]
    fn test_alias_resolves() {
        assert_eq!(find_programmer("gpio"), Some("linux_gpio"));
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_flash_roundtrip() {
        use icebang_core::flash::NoProgress;

        let mut flash = open_flash("dummy", FlashConfig::default()).unwrap();
        let data: Vec<u8> = (0..600).map(|i| i as u8).collect();
        flash.write_image(&data, &mut NoProgress).unwrap();
        flash.verify_image(&data, &mut NoProgress).unwrap();
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_configured_start() {
        let mut fpga = open_fpga("dummy:configured=1", FpgaConfig::default()).unwrap();
        assert!(fpga.start().is_ok());
        assert!(fpga.is_done().unwrap());
    }
}
