//! icebang - Bit-banged iCE40 FPGA and SPI flash programmer
//!
//! Drives an iCE40 configuration interface and its SPI NOR configuration
//! flash by toggling GPIO lines:
//!
//! - **fpga** - hold or release reset, run the FPGA clock, load a bitstream
//!   straight into configuration memory (CRAM)
//! - **flash** - erase, program, verify and read the configuration flash
//!
//! The protocol engines live in `icebang-core`; the programmer string picks
//! the backend that supplies the pins.

mod cli;
mod commands;
mod handle;
mod image;
mod programmers;

use clap::Parser;
use cli::{Cli, Commands};
use icebang_core::flash::FlashConfig;
use icebang_core::fpga::FpgaConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Fpga {
            programmer,
            frequency,
            action,
        } => {
            let config = FpgaConfig::default().with_frequency_khz(frequency);
            let mut fpga = programmers::open_fpga(&programmer, config)?;
            log::debug!("{}", fpga.describe());
            commands::fpga::run(fpga.as_mut(), &action)
        }
        Commands::Flash {
            programmer,
            frequency,
            action,
        } => {
            let config = FlashConfig::default().with_frequency_hz(frequency);
            let mut flash = programmers::open_flash(&programmer, config)?;
            log::debug!("{}", flash.describe());
            commands::flash::run(flash.as_mut(), &action)
        }
        Commands::ListProgrammers => {
            commands::list_programmers();
            Ok(())
        }
    }
}
