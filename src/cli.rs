//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

const PROGRAMMER_HELP: &str =
    "Programmer to use, as name[:key=value,...] (see list-programmers)";

#[derive(Parser)]
#[command(name = "icebang")]
#[command(author, version, about = "Bit-banged iCE40 FPGA and SPI flash programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Control the FPGA and load bitstreams into configuration memory
    Fpga {
        #[arg(short, long, help = PROGRAMMER_HELP)]
        programmer: String,

        /// FPGA clock frequency in kHz
        #[arg(short, long, default_value_t = icebang_core::fpga::DEFAULT_FREQUENCY_KHZ)]
        frequency: u32,

        #[command(subcommand)]
        action: FpgaCommands,
    },

    /// Erase, program and read the configuration flash
    Flash {
        #[arg(short, long, help = PROGRAMMER_HELP)]
        programmer: String,

        /// Flash bus frequency in Hz (approximate)
        #[arg(short, long, default_value_t = icebang_core::flash::DEFAULT_FREQUENCY_HZ)]
        frequency: u32,

        #[command(subcommand)]
        action: FlashCommands,
    },

    /// List supported programmers
    ListProgrammers,
}

/// FPGA subcommands
#[derive(Subcommand)]
pub enum FpgaCommands {
    /// Release reset, start the clock and wait for CDONE
    Start,

    /// Stop the clock and hold the FPGA in reset
    Stop,

    /// Stop, then start
    Reset,

    /// Show the CDONE level
    Status,

    /// Load a bitstream into configuration memory ("-" reads standard input)
    Cram {
        /// Bitstream file
        file: PathBuf,
    },

    /// Show the pin assignment
    Info,
}

/// Flash subcommands
#[derive(Subcommand)]
pub enum FlashCommands {
    /// Erase and program a file at offset 0 ("-" reads standard input)
    Write {
        /// Image file
        file: PathBuf,

        /// Read back and compare after writing
        #[arg(long)]
        verify: bool,
    },

    /// Erase every sector overlapping [0, length)
    Erase {
        /// Number of bytes (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        length: u32,
    },

    /// Read flash contents to a file ("-" writes standard output)
    Read {
        /// Output file
        file: PathBuf,

        /// Number of bytes to read (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: u32,

        /// Start offset (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        offset: u32,
    },

    /// Read the JEDEC ID
    Id,

    /// Show the pin assignment and geometry
    Info,
}
