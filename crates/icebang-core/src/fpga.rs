//! FPGA power-up and configuration-mode sequencer
//!
//! Drives CRESET, the FPGA system clock and samples CDONE:
//!
//! ```text
//! Unpowered --stop--> ResetHeld --start--> AwaitingCdone --CDONE--> Configured
//! ```
//!
//! On a blank iCE40 CDONE only rises once a bitstream has been loaded, either
//! from the attached flash or through a CRAM session. A `start()` timeout
//! right after power-up is therefore expected when nothing has been loaded
//! yet; the clock keeps running and CRESET stays released so a CRAM session
//! can follow.
//!
//! The clock is never running while CRESET is held low: `stop()` halts the
//! clock before asserting reset and `start()` only starts it once the reset
//! release has settled.

use core::fmt;

use crate::error::{Error, Result};
use crate::line::{ClockLine, Delay, DigitalLine, Direction};
use crate::timing::PollTimeout;

/// Default FPGA clock frequency in kHz
pub const DEFAULT_FREQUENCY_KHZ: u32 = 48;

/// Lines wired to the FPGA control pins
pub struct FpgaPins<L, C> {
    /// CDONE, input
    pub cdone: L,
    /// FPGA system clock, free-running output
    pub clock: C,
    /// CRESET_B, output, active low
    pub creset: L,
}

/// Sequencer timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpgaConfig {
    /// Clock frequency in kHz
    pub frequency_khz: u32,
    /// Minimum time CRESET is held low (datasheet: 200 ns)
    pub reset_hold_us: u32,
    /// Time after releasing CRESET for configuration memory to clear
    /// (datasheet: 1200 us)
    pub reset_settle_us: u32,
    /// CDONE polling budget used by `start()`
    pub cdone_timeout: PollTimeout,
}

impl Default for FpgaConfig {
    fn default() -> Self {
        Self {
            frequency_khz: DEFAULT_FREQUENCY_KHZ,
            reset_hold_us: 1,
            reset_settle_us: 1200,
            cdone_timeout: PollTimeout::new(1_000, 250_000),
        }
    }
}

impl FpgaConfig {
    /// Set the clock frequency in kHz
    pub fn with_frequency_khz(mut self, khz: u32) -> Self {
        self.frequency_khz = khz;
        self
    }

    /// Set the CDONE polling budget
    pub fn with_cdone_timeout(mut self, timeout: PollTimeout) -> Self {
        self.cdone_timeout = timeout;
        self
    }
}

/// Sequencer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpgaState {
    /// Lines have not been touched yet
    Unpowered,
    /// CRESET asserted, clock stopped
    ResetHeld,
    /// CRESET released and clock running, CDONE not yet seen
    AwaitingCdone,
    /// CDONE high, user design running
    Configured,
}

/// FPGA control sequencer
pub struct Fpga<L, C, D> {
    cdone: L,
    clock: C,
    creset: L,
    delay: D,
    config: FpgaConfig,
    state: FpgaState,
    reset_released: bool,
    clock_running: bool,
}

impl<L: DigitalLine, C: ClockLine, D: Delay> Fpga<L, C, D> {
    /// Bind the control lines; no line is touched until `start`/`stop`
    pub fn new(pins: FpgaPins<L, C>, delay: D, config: FpgaConfig) -> Self {
        Self {
            cdone: pins.cdone,
            clock: pins.clock,
            creset: pins.creset,
            delay,
            config,
            state: FpgaState::Unpowered,
            reset_released: false,
            clock_running: false,
        }
    }

    /// Current sequencer state
    pub fn state(&self) -> FpgaState {
        self.state
    }

    /// Release reset, start the clock and wait for CDONE
    ///
    /// Returns [`Error::CdoneTimeout`] if CDONE does not go high within the
    /// configured budget. The FPGA is left out of reset with its clock
    /// running in that case. Calling this again while started only
    /// re-asserts the same pin states.
    pub fn start(&mut self) -> Result<()> {
        self.release_reset()?;
        self.start_clock()?;
        if self.state != FpgaState::Configured {
            self.state = FpgaState::AwaitingCdone;
        }
        self.wait_cdone()
    }

    /// Stop the clock and hold the FPGA in reset
    pub fn stop(&mut self) -> Result<()> {
        self.hold_reset()?;
        log::debug!("fpga: held in reset");
        Ok(())
    }

    /// `stop()` followed by `start()`
    ///
    /// When `stop()` fails, `start()` is not attempted.
    pub fn reset(&mut self) -> Result<()> {
        self.stop()?;
        self.start()
    }

    /// Sample CDONE
    pub fn is_done(&mut self) -> Result<bool> {
        self.cdone.set_direction(Direction::Input)?;
        self.cdone.level()
    }

    fn wait_cdone(&mut self) -> Result<()> {
        let timeout = self.config.cdone_timeout;
        for _ in 0..timeout.max_polls() {
            if self.is_done()? {
                self.state = FpgaState::Configured;
                log::debug!("fpga: CDONE high");
                return Ok(());
            }
            self.delay.delay_us(timeout.interval_us);
        }
        log::debug!(
            "fpga: CDONE still low after {} us, no bitstream loaded",
            timeout.timeout_us
        );
        Err(Error::CdoneTimeout)
    }

    /// Halt the clock, then drive CRESET low for the minimum hold time
    pub(crate) fn hold_reset(&mut self) -> Result<()> {
        self.stop_clock()?;
        self.creset.drive(false)?;
        self.reset_released = false;
        self.state = FpgaState::ResetHeld;
        self.delay.delay_us(self.config.reset_hold_us);
        Ok(())
    }

    /// Drive CRESET high and wait for the FPGA to clear its configuration
    /// memory. No-op when reset is already released.
    pub(crate) fn release_reset(&mut self) -> Result<()> {
        if self.reset_released {
            return self.creset.set_high();
        }
        self.creset.drive(true)?;
        self.reset_released = true;
        self.delay.delay_us(self.config.reset_settle_us);
        Ok(())
    }

    pub(crate) fn start_clock(&mut self) -> Result<()> {
        if self.clock_running {
            return Ok(());
        }
        self.clock.start_clock(self.config.frequency_khz)?;
        self.clock_running = true;
        log::trace!("fpga: clock running at {} kHz", self.config.frequency_khz);
        Ok(())
    }

    fn stop_clock(&mut self) -> Result<()> {
        // Clock state is unknown until the first transition, so always stop
        self.clock.stop_clock()?;
        self.clock_running = false;
        Ok(())
    }

    pub(crate) fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    pub(crate) fn set_state(&mut self, state: FpgaState) {
        self.state = state;
    }
}

impl<L: DigitalLine, C: ClockLine, D> Fpga<L, C, D> {
    /// Configuration in use
    pub fn config(&self) -> &FpgaConfig {
        &self.config
    }

    /// Configured clock frequency in kHz
    pub fn frequency_khz(&self) -> u32 {
        self.config.frequency_khz
    }

    pub(crate) fn pin_ids(&self) -> (u32, u32, u32) {
        (self.cdone.id(), self.clock.id(), self.creset.id())
    }
}

impl<L: DigitalLine, C: ClockLine, D> fmt::Display for Fpga<L, C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (cdone, clock, creset) = self.pin_ids();
        write!(
            f,
            "fpga(cdone={}, clock={}, creset={}, frequency={})",
            cdone, clock, creset, self.frequency_khz()
        )
    }
}
