//! Bit-banged SPI NOR flash driver

use core::fmt;

use super::opcodes::{self, StatusRegister};
use crate::bitbang::{single, BitbangSpiMaster, BitbangSpiReader};
use crate::error::{Error, Result};
use crate::line::{Delay, DigitalLine, Direction};
use crate::timing::{half_period_ns, PollTimeout};

/// Default flash bus frequency in Hz
pub const DEFAULT_FREQUENCY_HZ: u32 = 10_000_000;
/// Erase granularity of the sector erase command
pub const SECTOR_SIZE: u32 = 4096;
/// Program granularity of the page program command
pub const PAGE_SIZE: u32 = 256;

/// Lines of the flash bus
pub struct FlashPins<L> {
    /// Bus clock, output
    pub sck: L,
    /// Data towards the flash (MOSI), output
    pub data_out: L,
    /// Data from the flash (MISO), input
    pub data_in: L,
    /// Chip select, output, active low
    pub cs: L,
}

/// Flash driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashConfig {
    /// Bus clock frequency in Hz (approximate)
    pub frequency_hz: u32,
    /// Sector size in bytes
    pub sector_size: u32,
    /// Page size in bytes
    pub page_size: u32,
    /// WIP polling budget after a sector erase
    pub erase_timeout: PollTimeout,
    /// WIP polling budget after a page program
    pub program_timeout: PollTimeout,
    /// WIP polling budget after a chip erase
    pub chip_erase_timeout: PollTimeout,
    /// Time to leave deep power-down (tRES1)
    pub wakeup_us: u32,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            sector_size: SECTOR_SIZE,
            page_size: PAGE_SIZE,
            // Typical poll delays from flashprog: 10ms for 4K erase, 10us for
            // page program, 1s for chip erase
            erase_timeout: PollTimeout::new(10_000, 1_000_000),
            program_timeout: PollTimeout::new(10, 10_000),
            chip_erase_timeout: PollTimeout::new(1_000_000, 200_000_000),
            wakeup_us: 3,
        }
    }
}

impl FlashConfig {
    /// Set the bus frequency in Hz
    pub fn with_frequency_hz(mut self, hz: u32) -> Self {
        self.frequency_hz = hz;
        self
    }

    /// Reject geometry the driver cannot divide by
    pub fn check_geometry(&self) -> Result<()> {
        if self.sector_size == 0 || self.page_size == 0 {
            return Err(Error::InvalidGeometry);
        }
        Ok(())
    }

    /// Set the erase and program polling budgets
    pub fn with_timeouts(mut self, erase: PollTimeout, program: PollTimeout) -> Self {
        self.erase_timeout = erase;
        self.program_timeout = program;
        self
    }
}

/// Four-wire bit-banged SPI master
struct FlashBus<L, D> {
    sck: L,
    data_out: L,
    data_in: L,
    cs: L,
    delay: D,
    half_period_ns: u32,
}

impl<L: DigitalLine, D: Delay> BitbangSpiMaster for FlashBus<L, D> {
    fn set_cs(&mut self, active: bool) -> Result<()> {
        // CS is active low
        self.cs.set_level(!active)
    }

    fn set_sck(&mut self, high: bool) -> Result<()> {
        self.sck.set_level(high)
    }

    fn set_mosi(&mut self, high: bool) -> Result<()> {
        self.data_out.set_level(high)
    }

    fn half_period_delay(&mut self) {
        if self.half_period_ns > 0 {
            self.delay.delay_ns(self.half_period_ns);
        }
    }
}

impl<L: DigitalLine, D: Delay> BitbangSpiReader for FlashBus<L, D> {
    fn get_miso(&mut self) -> Result<bool> {
        self.data_in.level()
    }
}

impl<L: DigitalLine, D: Delay> FlashBus<L, D> {
    /// One CS-framed transaction: header and payload out, then `read` in
    fn transaction(&mut self, header: &[u8], payload: &[u8], read: &mut [u8]) -> Result<()> {
        self.set_cs(true)?;
        let result = single::write_bytes(self, header)
            .and_then(|_| single::write_bytes(self, payload))
            .and_then(|_| single::read_bytes(self, read));

        // Deassert CS even when a line failed mid-transfer
        let end = self
            .set_sck(false)
            .and_then(|_| {
                self.half_period_delay();
                self.set_cs(false)
            })
            .map(|_| self.half_period_delay());
        result.and(end)
    }
}

/// Serial NOR flash driven over GPIO
pub struct SpiFlash<L, D> {
    bus: FlashBus<L, D>,
    config: FlashConfig,
    initialized: bool,
}

impl<L: DigitalLine, D: Delay> SpiFlash<L, D> {
    /// Bind the bus lines; nothing is driven until `init`
    pub fn new(pins: FlashPins<L>, delay: D, config: FlashConfig) -> Self {
        Self {
            bus: FlashBus {
                sck: pins.sck,
                data_out: pins.data_out,
                data_in: pins.data_in,
                cs: pins.cs,
                delay,
                half_period_ns: 0,
            },
            config,
            initialized: false,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    /// Whether the bus is currently held by `init`
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Take the bus: CS inactive, clock and data-out low, data-in input
    ///
    /// Derives the bit-bang timing from the configured frequency and wakes
    /// the flash from deep power-down.
    pub fn init(&mut self) -> Result<()> {
        self.config.check_geometry()?;
        let half_period = half_period_ns(self.config.frequency_hz).ok_or(Error::InvalidFrequency)?;
        self.bus.half_period_ns = half_period;

        self.bus.cs.drive(true)?;
        self.bus.sck.drive(false)?;
        self.bus.data_out.drive(false)?;
        self.bus.data_in.set_direction(Direction::Input)?;
        self.initialized = true;

        log::debug!(
            "flash: bus up at ~{} Hz (half period {} ns)",
            self.config.frequency_hz,
            half_period
        );
        self.wakeup()
    }

    /// Return every line to high impedance
    ///
    /// CS is driven inactive before being released so the flash never sees
    /// a floating select. Safe to call at any time; all four lines are
    /// attempted and the first failure is reported.
    pub fn deinit(&mut self) -> Result<()> {
        self.initialized = false;
        let cs = self.bus.cs.set_high();
        let sck = self.bus.sck.set_low();
        let released = [
            self.bus.sck.release(),
            self.bus.data_out.release(),
            self.bus.data_in.release(),
            self.bus.cs.release(),
        ];
        let mut result = cs.and(sck);
        for r in released {
            result = result.and(r);
        }
        log::debug!("flash: bus released");
        result
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn command(&mut self, header: &[u8], payload: &[u8], read: &mut [u8]) -> Result<()> {
        self.ensure_initialized()?;
        self.bus.transaction(header, payload, read)
    }

    fn check_addr(addr: u32) -> Result<()> {
        if addr > opcodes::MAX_3B_ADDR {
            Err(Error::AddressOutOfRange)
        } else {
            Ok(())
        }
    }

    /// Read status register 1
    pub fn read_status(&mut self) -> Result<StatusRegister> {
        let mut buf = [0u8; 1];
        self.command(&[opcodes::RDSR], &[], &mut buf)?;
        Ok(StatusRegister::from_bits_retain(buf[0]))
    }

    /// Read the JEDEC ID as (manufacturer, device)
    pub fn read_jedec_id(&mut self) -> Result<(u8, u16)> {
        let mut buf = [0u8; 3];
        self.command(&[opcodes::RDID], &[], &mut buf)?;
        Ok((buf[0], u16::from_be_bytes([buf[1], buf[2]])))
    }

    /// Read `buf.len()` bytes starting at `offset`
    pub fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        Self::check_addr(offset)?;
        self.command(&opcodes::encode_3b(opcodes::READ, offset), &[], buf)
    }

    /// Send the Write Enable command
    fn write_enable(&mut self) -> Result<()> {
        self.command(&[opcodes::WREN], &[], &mut [])
    }

    /// Poll the status register until WIP clears
    pub fn wait_ready(&mut self, timeout: PollTimeout) -> Result<()> {
        for _ in 0..timeout.max_polls() {
            if !self.read_status()?.is_busy() {
                return Ok(());
            }
            if timeout.interval_us > 0 {
                self.bus.delay.delay_us(timeout.interval_us);
            }
        }
        log::error!("flash: still busy after {} us", timeout.timeout_us);
        Err(Error::Timeout)
    }

    /// Erase the sector starting at `offset`
    ///
    /// `offset` is sent as-is; aligning it to a sector boundary is the
    /// caller's job.
    pub fn erase_sector(&mut self, offset: u32) -> Result<()> {
        Self::check_addr(offset)?;
        log::trace!("flash: erase sector 0x{:06X}", offset);
        self.write_enable()?;
        self.command(&opcodes::encode_3b(opcodes::SE_20, offset), &[], &mut [])?;
        let timeout = self.config.erase_timeout;
        self.wait_ready(timeout)
    }

    /// Erase the whole chip
    pub fn erase_chip(&mut self) -> Result<()> {
        log::debug!("flash: chip erase");
        self.write_enable()?;
        self.command(&[opcodes::CE_C7], &[], &mut [])?;
        let timeout = self.config.chip_erase_timeout;
        self.wait_ready(timeout)
    }

    /// Program up to one page of `data` at `offset`
    ///
    /// The write is clipped at the end of the page containing `offset`, so
    /// it never wraps inside the chip's page buffer. Returns the number of
    /// bytes programmed. The target must already be erased; programming
    /// over stale data silently corrupts it.
    pub fn program_page(&mut self, offset: u32, data: &[u8]) -> Result<usize> {
        Self::check_addr(offset)?;
        // Geometry was checked by init
        self.ensure_initialized()?;
        let page = self.config.page_size as usize;
        let room = page - (offset as usize % page);
        let len = data.len().min(room);
        if len == 0 {
            return Ok(0);
        }
        log::trace!("flash: program {} bytes at 0x{:06X}", len, offset);
        self.write_enable()?;
        self.command(&opcodes::encode_3b(opcodes::PP, offset), &data[..len], &mut [])?;
        let timeout = self.config.program_timeout;
        self.wait_ready(timeout)?;
        Ok(len)
    }

    /// Enter deep power-down
    pub fn sleep(&mut self) -> Result<()> {
        self.command(&[opcodes::DP], &[], &mut [])
    }

    /// Leave deep power-down
    pub fn wakeup(&mut self) -> Result<()> {
        self.command(&[opcodes::RES], &[], &mut [])?;
        let wakeup_us = self.config.wakeup_us;
        self.bus.delay.delay_us(wakeup_us);
        Ok(())
    }
}

impl<L: DigitalLine, D> fmt::Display for SpiFlash<L, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flash(sck={}, mosi={}, miso={}, cs={}, frequency={})",
            self.bus.sck.id(),
            self.bus.data_out.id(),
            self.bus.data_in.id(),
            self.bus.cs.id(),
            self.config.frequency_hz
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::Direction;
    use crate::mock::{Event, MockDelay, MockLine, Shared};
    use std::string::ToString;

    const SCK: u32 = 1;
    const MOSI: u32 = 2;
    const MISO: u32 = 3;
    const CS: u32 = 4;

    fn flash(bench: &Shared, config: FlashConfig) -> SpiFlash<MockLine, MockDelay> {
        SpiFlash::new(
            FlashPins {
                sck: bench.line(SCK),
                data_out: bench.line(MOSI),
                data_in: bench.line(MISO),
                cs: bench.line(CS),
            },
            bench.delay(),
            config,
        )
    }

    #[test]
    fn test_commands_require_init() {
        let bench = Shared::default();
        let mut flash = flash(&bench, FlashConfig::default());
        assert_eq!(flash.erase_sector(0), Err(Error::NotInitialized));
        assert_eq!(flash.program_page(0, &[1]), Err(Error::NotInitialized));
        assert!(bench.events().is_empty());
    }

    #[test]
    fn test_zero_frequency_rejected_before_bus_activity() {
        let bench = Shared::default();
        let mut flash = flash(&bench, FlashConfig::default().with_frequency_hz(0));
        assert_eq!(flash.init(), Err(Error::InvalidFrequency));
        assert!(bench.events().is_empty());
    }

    #[test]
    fn test_zero_geometry_rejected_before_bus_activity() {
        let bench = Shared::default();
        let config = FlashConfig {
            page_size: 0,
            ..FlashConfig::default()
        };
        let mut flash = flash(&bench, config);
        assert_eq!(flash.init(), Err(Error::InvalidGeometry));
        assert_eq!(flash.program_page(0x10, &[1, 2]), Err(Error::NotInitialized));
        assert!(bench.events().is_empty());
    }

    #[test]
    fn test_init_leaves_cs_inactive() {
        let bench = Shared::default();
        let mut flash = flash(&bench, FlashConfig::default());
        flash.init().unwrap();
        assert!(bench.level(CS));
        assert!(!bench.level(SCK));
        assert!(bench.position(Event::Direction(MISO, Direction::Input)).is_some());
    }

    #[test]
    fn test_busy_flash_times_out() {
        let bench = Shared::default();
        // MISO stuck high reads back 0xFF: WIP never clears
        bench.set_input(MISO, true);
        let config = FlashConfig::default()
            .with_timeouts(PollTimeout::new(10, 50), PollTimeout::new(10, 50));
        let mut flash = flash(&bench, config);
        flash.init().unwrap();
        assert_eq!(flash.erase_sector(0x1000), Err(Error::Timeout));
        assert!(bench.level(CS), "CS released after the failed poll");
    }

    #[test]
    fn test_address_range() {
        let bench = Shared::default();
        let mut flash = flash(&bench, FlashConfig::default());
        flash.init().unwrap();
        assert_eq!(flash.erase_sector(0x0100_0000), Err(Error::AddressOutOfRange));
    }

    #[test]
    fn test_deinit_releases_all_lines() {
        let bench = Shared::default();
        let mut flash = flash(&bench, FlashConfig::default());
        flash.init().unwrap();
        flash.deinit().unwrap();
        let events = bench.events();
        for id in [SCK, MOSI, MISO, CS] {
            assert_eq!(
                events
                    .iter()
                    .rev()
                    .find(|e| matches!(e, Event::Direction(l, _) if *l == id)),
                Some(&Event::Direction(id, Direction::Input))
            );
        }
        assert!(!flash.is_initialized());
    }

    #[test]
    fn test_display() {
        let bench = Shared::default();
        let flash = flash(&bench, FlashConfig::default());
        assert_eq!(
            flash.to_string(),
            "flash(sck=1, mosi=2, miso=3, cs=4, frequency=10000000)"
        );
    }
}
