//! CRAM programmer: stream a bitstream into FPGA configuration memory
//!
//! Implements the iCE40 SPI slave configuration sequence over a bit-banged,
//! write-only bus:
//!
//! 1. Hold CRESET low with chip-select asserted, then release CRESET so the
//!    FPGA samples SS low and enters SPI slave configuration mode
//! 2. Wait for configuration memory to clear, start the FPGA clock
//! 3. Deassert SS, send 8 synchronization clocks, assert SS again
//! 4. Shift the bitstream MSB first without touching SS
//! 5. Deassert SS and keep clocking (at least 49 clocks) until CDONE rises
//!
//! A session is bracketed by [`CramProgrammer::open`] and
//! [`CramProgrammer::close`]. Only one session can be open per programmer;
//! a second `open` is rejected. `close` always returns the bus to idle and
//! can be called any number of times.

use core::fmt;

use crate::bitbang::{single, BitbangSpiMaster};
use crate::error::{Error, Result};
use crate::fpga::{Fpga, FpgaState};
use crate::line::{ClockLine, Delay, DigitalLine};
use crate::timing::half_period_ns;

/// Default CRAM bus clock in Hz
pub const DEFAULT_FREQUENCY_HZ: u32 = 1_000_000;

/// Lines of the configuration bus
pub struct CramPins<L> {
    /// Bus clock, output
    pub sck: L,
    /// Bitstream data towards the FPGA, output
    pub data_out: L,
    /// Configuration chip-select (SPI_SS_B), output, active low
    pub cs: L,
}

/// Configuration bus timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CramConfig {
    /// Bus clock frequency in Hz
    pub frequency_hz: u32,
    /// Synchronization clocks sent with SS high before the bitstream
    pub leading_clocks: usize,
    /// Minimum dummy clocks after the bitstream before CDONE is trusted
    pub min_trailing_clocks: usize,
    /// Upper bound on trailing dummy bytes while waiting for CDONE
    pub max_trailing_bytes: usize,
}

impl Default for CramConfig {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            leading_clocks: 8,
            min_trailing_clocks: 49,
            max_trailing_bytes: 13,
        }
    }
}

/// State of the current configuration transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigurationSession {
    open: bool,
    bytes_streamed: usize,
}

impl ConfigurationSession {
    /// Whether a session is in progress
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Bytes shifted out since the session was opened
    pub fn bytes_streamed(&self) -> usize {
        self.bytes_streamed
    }
}

/// Write-only bit-banged configuration bus
struct CramBus<L, D> {
    sck: L,
    data_out: L,
    cs: L,
    delay: D,
    half_period_ns: u32,
}

impl<L: DigitalLine, D: Delay> CramBus<L, D> {
    /// Take ownership of the lines: CS inactive, clock and data low
    fn configure(&mut self) -> Result<()> {
        self.cs.drive(true)?;
        self.sck.drive(false)?;
        self.data_out.drive(false)
    }

    /// Park the bus: CS released high, clock and data low
    fn idle(&mut self) -> Result<()> {
        let cs = self.cs.set_high();
        let sck = self.sck.set_low();
        let data = self.data_out.set_low();
        cs.and(sck).and(data)
    }
}

impl<L: DigitalLine, D: Delay> BitbangSpiMaster for CramBus<L, D> {
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

/// Streams bitstreams into FPGA configuration memory
pub struct CramProgrammer<L, D> {
    bus: CramBus<L, D>,
    config: CramConfig,
    session: ConfigurationSession,
}

impl<L: DigitalLine, D: Delay> CramProgrammer<L, D> {
    /// Bind the configuration bus; no line is touched until `open`
    pub fn new(pins: CramPins<L>, delay: D, config: CramConfig) -> Self {
        let half_period_ns = half_period_ns(config.frequency_hz).unwrap_or(0);
        Self {
            bus: CramBus {
                sck: pins.sck,
                data_out: pins.data_out,
                cs: pins.cs,
                delay,
                half_period_ns,
            },
            config,
            session: ConfigurationSession::default(),
        }
    }

    /// Bus timing in use
    pub fn config(&self) -> &CramConfig {
        &self.config
    }

    /// Current session state
    pub fn session(&self) -> ConfigurationSession {
        self.session
    }

    /// Whether a session is open
    pub fn is_open(&self) -> bool {
        self.session.open
    }

    /// Bytes streamed in the current (or last) session
    pub fn bytes_streamed(&self) -> usize {
        self.session.bytes_streamed
    }

    /// Put the FPGA into SPI slave configuration mode and open a session
    ///
    /// Fails with [`Error::SessionAlreadyOpen`] without touching any line if a
    /// session is in progress. Any other failure leaves the bus idle and the
    /// session closed.
    pub fn open<FL, C, FD>(&mut self, fpga: &mut Fpga<FL, C, FD>) -> Result<()>
    where
        FL: DigitalLine,
        C: ClockLine,
        FD: Delay,
    {
        if self.session.open {
            return Err(Error::SessionAlreadyOpen);
        }
        if self.config.frequency_hz == 0 {
            return Err(Error::InvalidFrequency);
        }

        if let Err(e) = self.enter_configuration_mode(fpga) {
            if let Err(idle) = self.bus.idle() {
                log::warn!("cram: could not idle bus after failed open: {}", idle);
            }
            return Err(e);
        }

        self.session = ConfigurationSession {
            open: true,
            bytes_streamed: 0,
        };
        fpga.set_state(FpgaState::AwaitingCdone);
        log::debug!("cram: session open");
        Ok(())
    }

    fn enter_configuration_mode<FL, C, FD>(&mut self, fpga: &mut Fpga<FL, C, FD>) -> Result<()>
    where
        FL: DigitalLine,
        C: ClockLine,
        FD: Delay,
    {
        self.bus.configure()?;

        // Reset with SS low selects SPI slave mode on reset release
        fpga.hold_reset()?;
        self.bus.set_cs(true)?;
        fpga.delay_us(fpga.config().reset_hold_us);
        fpga.release_reset()?;
        fpga.start_clock()?;

        if fpga.is_done()? {
            return Err(Error::CdoneStuckHigh);
        }

        self.bus.set_cs(false)?;
        single::run_clock(&mut self.bus, self.config.leading_clocks)?;
        self.bus.set_sck(false)?;
        self.bus.set_cs(true)
    }

    /// Shift `data` out MSB first
    ///
    /// May be called repeatedly to stream a bitstream in chunks. Fails with
    /// [`Error::SessionNotOpen`] without touching the bus outside a session.
    /// A line fault mid-stream leaves the configuration memory in an
    /// undefined state; close the session and restart the whole bitstream.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.session.open {
            return Err(Error::SessionNotOpen);
        }
        for (i, &byte) in data.iter().enumerate() {
            if let Err(e) = single::write_byte(&mut self.bus, byte) {
                self.session.bytes_streamed += i;
                log::warn!(
                    "cram: write failed after {} bytes: {}",
                    self.session.bytes_streamed,
                    e
                );
                return Err(e);
            }
        }
        self.session.bytes_streamed += data.len();
        Ok(())
    }

    /// Finish the session and report whether CDONE went high
    ///
    /// Sends the trailing dummy clocks with SS released, then idles the bus.
    /// On a closed session this returns `Ok(false)` and does nothing.
    pub fn close<FL, C, FD>(&mut self, fpga: &mut Fpga<FL, C, FD>) -> Result<bool>
    where
        FL: DigitalLine,
        C: ClockLine,
        FD: Delay,
    {
        if !self.session.open {
            return Ok(false);
        }
        self.session.open = false;

        let result = self.finish(fpga);
        let idle = self.bus.idle();
        let done = result?;
        idle?;

        if done {
            fpga.set_state(FpgaState::Configured);
            log::info!(
                "cram: configured FPGA with {} bytes",
                self.session.bytes_streamed
            );
        } else {
            log::warn!(
                "cram: CDONE low after {} bytes, bitstream rejected",
                self.session.bytes_streamed
            );
        }
        Ok(done)
    }

    fn finish<FL, C, FD>(&mut self, fpga: &mut Fpga<FL, C, FD>) -> Result<bool>
    where
        FL: DigitalLine,
        C: ClockLine,
        FD: Delay,
    {
        self.bus.set_sck(false)?;
        self.bus.set_cs(false)?;

        let mut clocks = 0;
        for _ in 0..self.config.max_trailing_bytes {
            single::run_clock(&mut self.bus, 8)?;
            clocks += 8;
            if clocks >= self.config.min_trailing_clocks && fpga.is_done()? {
                return Ok(true);
            }
        }
        fpga.is_done()
    }

    /// Run a complete open/write/close session
    ///
    /// `close` is attempted on every path once `open` succeeded. Returns
    /// [`Error::ConfigurationFailed`] when the bitstream was streamed but
    /// CDONE never rose.
    pub fn load<FL, C, FD>(&mut self, fpga: &mut Fpga<FL, C, FD>, bitstream: &[u8]) -> Result<()>
    where
        FL: DigitalLine,
        C: ClockLine,
        FD: Delay,
    {
        self.open(fpga)?;
        let written = self.write(bitstream);
        let closed = self.close(fpga);
        written?;
        if closed? {
            Ok(())
        } else {
            Err(Error::ConfigurationFailed)
        }
    }
}

impl<L: DigitalLine, D> fmt::Display for CramProgrammer<L, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cram(sck={}, data_out={}, cs={})",
            self.bus.sck.id(),
            self.bus.data_out.id(),
            self.bus.cs.id()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fpga::{FpgaConfig, FpgaPins};
    use crate::mock::{Event, MockClock, MockDelay, MockLine, Shared};
    use crate::timing::PollTimeout;

    const CDONE: u32 = 1;
    const CRESET: u32 = 2;
    const SCK: u32 = 3;
    const DATA: u32 = 4;
    const CS: u32 = 5;

    type TestFpga = Fpga<MockLine, MockClock, MockDelay>;

    fn setup(bench: &Shared) -> (TestFpga, CramProgrammer<MockLine, MockDelay>) {
        let fpga = Fpga::new(
            FpgaPins {
                cdone: bench.line(CDONE),
                clock: bench.clock(),
                creset: bench.line(CRESET),
            },
            bench.delay(),
            FpgaConfig::default().with_cdone_timeout(PollTimeout::new(10, 100)),
        );
        let cram = CramProgrammer::new(
            CramPins {
                sck: bench.line(SCK),
                data_out: bench.line(DATA),
                cs: bench.line(CS),
            },
            bench.delay(),
            CramConfig::default(),
        );
        (fpga, cram)
    }

    #[test]
    fn test_write_without_session_touches_nothing() {
        let bench = Shared::default();
        let (_fpga, mut cram) = setup(&bench);

        assert_eq!(cram.write(&[0x7E, 0xAA]), Err(Error::SessionNotOpen));
        assert!(bench.events().is_empty());
    }

    #[test]
    fn test_open_twice_is_rejected() {
        let bench = Shared::default();
        let (mut fpga, mut cram) = setup(&bench);

        cram.open(&mut fpga).unwrap();
        let before = bench.events().len();
        assert_eq!(cram.open(&mut fpga), Err(Error::SessionAlreadyOpen));
        assert_eq!(bench.events().len(), before);
        assert!(cram.is_open());
    }

    #[test]
    fn test_open_selects_slave_mode_before_reset_release() {
        let bench = Shared::default();
        let (mut fpga, mut cram) = setup(&bench);
        cram.open(&mut fpga).unwrap();

        let events = bench.events();
        let hold = events.iter().position(|e| *e == Event::Level(CRESET, false)).unwrap();
        let select = events.iter().position(|e| *e == Event::Level(CS, false)).unwrap();
        let release = events.iter().position(|e| *e == Event::Level(CRESET, true)).unwrap();
        let clock = events.iter().position(|e| matches!(e, Event::ClockStart(_))).unwrap();
        assert!(hold < select && select < release && release < clock);
        assert!(!bench.level(CS), "SS is asserted for the bitstream");
    }

    #[test]
    fn test_open_fails_when_cdone_stuck() {
        let bench = Shared::default();
        bench.set_input(CDONE, true);
        let (mut fpga, mut cram) = setup(&bench);

        assert_eq!(cram.open(&mut fpga), Err(Error::CdoneStuckHigh));
        assert!(!cram.is_open());
        assert!(bench.level(CS), "SS released after a failed open");
    }

    #[test]
    fn test_close_is_idempotent() {
        let bench = Shared::default();
        let (mut fpga, mut cram) = setup(&bench);

        assert_eq!(cram.close(&mut fpga), Ok(false));
        assert!(bench.events().is_empty());

        cram.open(&mut fpga).unwrap();
        cram.write(&[0x00; 4]).unwrap();
        assert_eq!(cram.close(&mut fpga), Ok(false));
        let after_first = bench.events().len();
        assert_eq!(cram.close(&mut fpga), Ok(false));
        assert_eq!(bench.events().len(), after_first);
        assert_eq!(cram.write(&[0x00]), Err(Error::SessionNotOpen));
    }

    #[test]
    fn test_bytes_streamed_accumulates() {
        let bench = Shared::default();
        let (mut fpga, mut cram) = setup(&bench);

        cram.open(&mut fpga).unwrap();
        cram.write(&[1, 2, 3]).unwrap();
        cram.write(&[4, 5]).unwrap();
        assert_eq!(cram.bytes_streamed(), 5);
        assert_eq!(cram.session().bytes_streamed(), 5);
    }

    #[test]
    fn test_load_reports_rejected_bitstream() {
        let bench = Shared::default();
        let (mut fpga, mut cram) = setup(&bench);

        assert_eq!(cram.load(&mut fpga, &[0xFF; 16]), Err(Error::ConfigurationFailed));
        assert!(!cram.is_open());
    }

    #[test]
    fn test_write_fault_keeps_session_for_close() {
        let bench = Shared::default();
        let (mut fpga, mut cram) = setup(&bench);

        cram.open(&mut fpga).unwrap();
        bench.fail_line(DATA);
        assert_eq!(cram.write(&[0xAA]), Err(Error::LineFault));
        assert!(cram.is_open());
        // Idling the data line fails too, which close reports after cleanup
        assert_eq!(cram.close(&mut fpga), Err(Error::LineFault));
        assert!(!cram.is_open());
        assert!(bench.level(CS));
    }
}
