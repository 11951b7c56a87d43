//! Error types for icebang-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Line errors
    /// A GPIO line could not be driven, read or reconfigured
    LineFault,
    /// The clock output could not be started or stopped
    ClockFault,
    /// Requested bus or clock frequency cannot be produced
    InvalidFrequency,

    // FPGA errors
    /// CDONE did not go high within the configured timeout
    CdoneTimeout,
    /// CDONE stayed high after the FPGA was put into configuration mode
    CdoneStuckHigh,
    /// The bitstream was streamed but the FPGA never reported CDONE
    ConfigurationFailed,

    // Session errors
    /// A CRAM session is already open on this device
    SessionAlreadyOpen,
    /// No CRAM session is open
    SessionNotOpen,

    // Flash errors
    /// Flash bus has not been initialized
    NotInitialized,
    /// Address does not fit in a 24-bit flash address
    AddressOutOfRange,
    /// Sector or page size is zero
    InvalidGeometry,
    /// Flash write-in-progress bit did not clear in time
    Timeout,
    /// Read-back data does not match what was written
    VerifyError {
        /// Address of the first mismatching byte
        addr: u32,
        /// Byte that was expected
        expected: u8,
        /// Byte that was read back
        found: u8,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LineFault => write!(f, "GPIO line fault"),
            Self::ClockFault => write!(f, "clock output fault"),
            Self::InvalidFrequency => write!(f, "invalid frequency"),
            Self::CdoneTimeout => write!(f, "timed out waiting for CDONE"),
            Self::CdoneStuckHigh => write!(f, "CDONE still high after entering configuration mode"),
            Self::ConfigurationFailed => write!(f, "FPGA did not accept the bitstream"),
            Self::SessionAlreadyOpen => write!(f, "CRAM session already open"),
            Self::SessionNotOpen => write!(f, "CRAM session not open"),
            Self::NotInitialized => write!(f, "flash bus not initialized"),
            Self::AddressOutOfRange => write!(f, "address out of 24-bit range"),
            Self::InvalidGeometry => write!(f, "sector and page size must be non-zero"),
            Self::Timeout => write!(f, "flash operation timed out"),
            Self::VerifyError {
                addr,
                expected,
                found,
            } => write!(
                f,
                "verify failed at 0x{:06X}: expected 0x{:02X}, found 0x{:02X}",
                addr, expected, found
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
