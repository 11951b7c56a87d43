//! Type-erased device handles
//!
//! The core drivers are generic over their line types, which differ per
//! backend. The CLI works through these object-safe traits so command code
//! does not care which programmer opened the device.

use icebang_core::flash::{self, FlashProgress, SpiFlash};
use icebang_core::ice::IceFpga;
use icebang_core::line::{ClockLine, Delay, DigitalLine};
use icebang_core::Result;

/// FPGA operations used by the CLI
pub trait FpgaHandle {
    /// Release reset, start the clock and wait for CDONE
    fn start(&mut self) -> Result<()>;
    /// Stop the clock and hold reset
    fn stop(&mut self) -> Result<()>;
    /// Stop, then start
    fn reset(&mut self) -> Result<()>;
    /// Sample CDONE
    fn is_done(&mut self) -> Result<bool>;
    /// Open a CRAM session
    fn cram_open(&mut self) -> Result<()>;
    /// Stream a bitstream chunk
    fn cram_write(&mut self, data: &[u8]) -> Result<()>;
    /// Close the CRAM session, returning whether CDONE went high
    fn cram_close(&mut self) -> Result<bool>;
    /// Human readable pin assignment
    fn describe(&self) -> String;
}

impl<L, C, D> FpgaHandle for IceFpga<L, C, D>
where
    L: DigitalLine,
    C: ClockLine,
    D: Delay,
{
    fn start(&mut self) -> Result<()> {
        IceFpga::start(self)
    }

    fn stop(&mut self) -> Result<()> {
        IceFpga::stop(self)
    }

    fn reset(&mut self) -> Result<()> {
        IceFpga::reset(self)
    }

    fn is_done(&mut self) -> Result<bool> {
        IceFpga::is_done(self)
    }

    fn cram_open(&mut self) -> Result<()> {
        IceFpga::cram_open(self)
    }

    fn cram_write(&mut self, data: &[u8]) -> Result<()> {
        IceFpga::cram_write(self, data)
    }

    fn cram_close(&mut self) -> Result<bool> {
        IceFpga::cram_close(self)
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

/// Flash operations used by the CLI
///
/// Every call takes and releases the bus.
pub trait FlashHandle {
    /// Erase then program `data` at offset 0
    fn write_image(&mut self, data: &[u8], progress: &mut dyn FlashProgress) -> Result<()>;
    /// Erase every sector overlapping `[0, length)`
    fn erase_range(&mut self, length: usize, progress: &mut dyn FlashProgress) -> Result<()>;
    /// Compare flash contents with `data`
    fn verify_image(&mut self, data: &[u8], progress: &mut dyn FlashProgress) -> Result<()>;
    /// Read into `buf` starting at `offset`
    fn read(&mut self, offset: u32, buf: &mut [u8], progress: &mut dyn FlashProgress)
        -> Result<()>;
    /// JEDEC ID as (manufacturer, device)
    fn read_id(&mut self) -> Result<(u8, u16)>;
    /// Sector and page size
    fn geometry(&self) -> (u32, u32);
    /// Human readable pin assignment
    fn describe(&self) -> String;
}

impl<L, D> FlashHandle for SpiFlash<L, D>
where
    L: DigitalLine,
    D: Delay,
{
    fn write_image(&mut self, data: &[u8], progress: &mut dyn FlashProgress) -> Result<()> {
        flash::write_image(self, data, progress)
    }

    fn erase_range(&mut self, length: usize, progress: &mut dyn FlashProgress) -> Result<()> {
        flash::erase_range(self, length, progress)
    }

    fn verify_image(&mut self, data: &[u8], progress: &mut dyn FlashProgress) -> Result<()> {
        flash::verify_image(self, data, progress)
    }

    fn read(
        &mut self,
        offset: u32,
        buf: &mut [u8],
        progress: &mut dyn FlashProgress,
    ) -> Result<()> {
        flash::read_range(self, offset, buf, progress)
    }

    fn read_id(&mut self) -> Result<(u8, u16)> {
        flash::read_id(self)
    }

    fn geometry(&self) -> (u32, u32) {
        let config = self.config();
        (config.sector_size, config.page_size)
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}
