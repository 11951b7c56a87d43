//! icebang-core - Bit-banged FPGA configuration and SPI flash programming
//!
//! This crate drives an iCE40-style FPGA configuration interface and a
//! JEDEC serial NOR flash purely by toggling general purpose I/O lines.
//! It is `no_std` compatible; the lines, clock output and delays are
//! supplied by the caller through the traits in [`line`].
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`)
//! - `alloc` - Enable trait implementations for boxed lines
//!
//! # Example
//!
//! ```ignore
//! use icebang_core::ice::{IceFpga, IcePins};
//!
//! let mut fpga = IceFpga::new(pins, delay, 48);
//! fpga.cram(&bitstream)?;
//! assert!(fpga.is_done()?);
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod bitbang;
pub mod cram;
pub mod error;
pub mod flash;
pub mod fpga;
pub mod ice;
pub mod line;
#[cfg(test)]
mod mock;
pub mod timing;

pub use error::{Error, Result};
