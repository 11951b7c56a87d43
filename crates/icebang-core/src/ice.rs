//! iCE40 device: sequencer and CRAM programmer sharing one FPGA
//!
//! [`IceFpga`] owns all six lines of a board's FPGA interface and exposes the
//! operations a front end needs: `start`, `stop`, `reset` and `cram`, plus
//! `cram_open`/`cram_write`/`cram_close` for callers that stream a bitstream
//! in chunks.

use core::fmt;

use crate::cram::{CramConfig, CramPins, CramProgrammer};
use crate::error::Result;
use crate::fpga::{Fpga, FpgaConfig, FpgaPins, FpgaState};
use crate::line::{ClockLine, Delay, DigitalLine};

/// All lines of an iCE40 configuration interface
pub struct IcePins<L, C> {
    /// CDONE, input
    pub cdone: L,
    /// FPGA system clock
    pub clock: C,
    /// CRESET_B, output
    pub creset: L,
    /// Configuration chip-select
    pub cram_cs: L,
    /// Configuration data towards the FPGA
    pub cram_data_out: L,
    /// Configuration bus clock
    pub cram_sck: L,
}

/// An iCE40 FPGA driven over GPIO
pub struct IceFpga<L, C, D> {
    fpga: Fpga<L, C, D>,
    cram: CramProgrammer<L, D>,
}

impl<L, C, D> IceFpga<L, C, D>
where
    L: DigitalLine,
    C: ClockLine,
    D: Delay + Clone,
{
    /// Create a device with default timing and the given clock frequency
    pub fn new(pins: IcePins<L, C>, delay: D, frequency_khz: u32) -> Self {
        Self::with_config(
            pins,
            delay,
            FpgaConfig::default().with_frequency_khz(frequency_khz),
            CramConfig::default(),
        )
    }

    /// Create a device with explicit timing
    pub fn with_config(
        pins: IcePins<L, C>,
        delay: D,
        fpga_config: FpgaConfig,
        cram_config: CramConfig,
    ) -> Self {
        let cram = CramProgrammer::new(
            CramPins {
                sck: pins.cram_sck,
                data_out: pins.cram_data_out,
                cs: pins.cram_cs,
            },
            delay.clone(),
            cram_config,
        );
        let fpga = Fpga::new(
            FpgaPins {
                cdone: pins.cdone,
                clock: pins.clock,
                creset: pins.creset,
            },
            delay,
            fpga_config,
        );
        Self { fpga, cram }
    }
}

impl<L, C, D> IceFpga<L, C, D>
where
    L: DigitalLine,
    C: ClockLine,
    D: Delay,
{
    /// See [`Fpga::start`]
    pub fn start(&mut self) -> Result<()> {
        self.fpga.start()
    }

    /// See [`Fpga::stop`]
    pub fn stop(&mut self) -> Result<()> {
        self.fpga.stop()
    }

    /// See [`Fpga::reset`]
    pub fn reset(&mut self) -> Result<()> {
        self.fpga.reset()
    }

    /// Sample CDONE
    pub fn is_done(&mut self) -> Result<bool> {
        self.fpga.is_done()
    }

    /// Current sequencer state
    pub fn state(&self) -> FpgaState {
        self.fpga.state()
    }

    /// Load a complete bitstream into configuration memory
    pub fn cram(&mut self, bitstream: &[u8]) -> Result<()> {
        log::debug!("cram: loading {} bytes", bitstream.len());
        self.cram.load(&mut self.fpga, bitstream)
    }

    /// Open a CRAM session for chunked streaming
    pub fn cram_open(&mut self) -> Result<()> {
        self.cram.open(&mut self.fpga)
    }

    /// Stream a chunk into the open CRAM session
    pub fn cram_write(&mut self, data: &[u8]) -> Result<()> {
        self.cram.write(data)
    }

    /// Close the CRAM session, returning whether CDONE went high
    pub fn cram_close(&mut self) -> Result<bool> {
        self.cram.close(&mut self.fpga)
    }

    /// The CRAM programmer
    pub fn cram_programmer(&self) -> &CramProgrammer<L, D> {
        &self.cram
    }
}

impl<L: DigitalLine, C: ClockLine, D> fmt::Display for IceFpga<L, C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (cdone, clock, creset) = self.fpga.pin_ids();
        write!(
            f,
            "ice.fpga({}, cdone={}, clock={}, creset={}, frequency={})",
            self.cram,
            cdone,
            clock,
            creset,
            self.fpga.frequency_khz()
        )
    }
}
