//! Bitbang SPI master traits
//!
//! Both buses in this crate are SPI mode 0 masters implemented by toggling
//! GPIO lines: data is set up while the clock is low and sampled by the
//! target on the rising edge, most significant bit first.
//!
//! - [`BitbangSpiMaster`] - write-only master (clock, data out, chip select).
//!   The FPGA configuration bus only needs this.
//! - [`BitbangSpiReader`] - adds the data-in line, as used by the flash bus.
//!
//! The helpers in [`single`] build byte transfers and dummy clock runs on top
//! of either trait. Every line operation is fallible; the first failing edge
//! aborts the transfer and is propagated to the caller.

use crate::error::Result;

/// Low-level bitbang SPI output operations
pub trait BitbangSpiMaster {
    /// Set chip select (CS is active low, so `active=true` means CS=0)
    fn set_cs(&mut self, active: bool) -> Result<()>;

    /// Set clock line value
    fn set_sck(&mut self, high: bool) -> Result<()>;

    /// Set the data-out line value
    fn set_mosi(&mut self, high: bool) -> Result<()>;

    /// Delay for half a clock period
    fn half_period_delay(&mut self);

    /// Optional: Set SCK and MOSI together
    ///
    /// Default implementation calls `set_sck` then `set_mosi`.
    fn set_sck_set_mosi(&mut self, sck: bool, mosi: bool) -> Result<()> {
        self.set_sck(sck)?;
        self.set_mosi(mosi)
    }
}

/// Bitbang master that can also sample a data-in line
pub trait BitbangSpiReader: BitbangSpiMaster {
    /// Get the data-in line value
    fn get_miso(&mut self) -> Result<bool>;

    /// Optional: Set SCK and get MISO together
    ///
    /// Default implementation calls `set_sck` then `get_miso`.
    fn set_sck_get_miso(&mut self, sck: bool) -> Result<bool> {
        self.set_sck(sck)?;
        self.get_miso()
    }
}

/// Bitbang helper functions for single-wire I/O
///
/// These are standalone functions that can be used by any bitbang master.
pub mod single {
    use super::{BitbangSpiMaster, BitbangSpiReader};
    use crate::error::Result;

    /// Write a byte in single-wire mode (MSB first)
    pub fn write_byte<M: BitbangSpiMaster + ?Sized>(master: &mut M, byte: u8) -> Result<()> {
        for i in (0..8).rev() {
            let bit = (byte >> i) & 1 != 0;
            master.set_sck_set_mosi(false, bit)?;
            master.half_period_delay();
            master.set_sck(true)?;
            master.half_period_delay();
        }
        Ok(())
    }

    /// Read a byte in single-wire mode (MSB first)
    pub fn read_byte<M: BitbangSpiReader + ?Sized>(master: &mut M) -> Result<u8> {
        let mut byte = 0u8;
        for _ in 0..8 {
            master.set_sck(false)?;
            master.half_period_delay();
            byte <<= 1;
            if master.set_sck_get_miso(true)? {
                byte |= 1;
            }
            master.half_period_delay();
        }
        Ok(byte)
    }

    /// Run clock for a number of cycles (for dummy cycles)
    pub fn run_clock<M: BitbangSpiMaster + ?Sized>(master: &mut M, cycles: usize) -> Result<()> {
        for _ in 0..cycles {
            master.set_sck(false)?;
            master.half_period_delay();
            master.set_sck(true)?;
            master.half_period_delay();
        }
        Ok(())
    }

    /// Write multiple bytes in single-wire mode
    pub fn write_bytes<M: BitbangSpiMaster + ?Sized>(master: &mut M, bytes: &[u8]) -> Result<()> {
        for &byte in bytes {
            write_byte(master, byte)?;
        }
        Ok(())
    }

    /// Read multiple bytes in single-wire mode
    pub fn read_bytes<M: BitbangSpiReader + ?Sized>(master: &mut M, buf: &mut [u8]) -> Result<()> {
        for byte in buf.iter_mut() {
            *byte = read_byte(master)?;
        }
        Ok(())
    }
}
