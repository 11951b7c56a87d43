//! icebang-dummy - Simulated iCE40 board for testing
//!
//! This crate provides a board simulator that decodes the bit-banged
//! signals at edge level: an iCE40 in SPI slave configuration mode on the
//! CRAM bus and a JEDEC serial NOR flash on the flash bus. It is useful for
//! testing and development without real hardware.
//!
//! All lines handed out by a [`DummyBoard`] share the same simulated state,
//! so a test can drive the board through the core drivers and then inspect
//! what the "hardware" saw.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use icebang_core::error::{Error, Result};
use icebang_core::flash::opcodes;
use icebang_core::flash::{FlashConfig, FlashPins, SpiFlash};
use icebang_core::ice::{IceFpga, IcePins};
use icebang_core::line::{ClockLine, Delay, DigitalLine, Direction};

/// iCE40 synchronization word that starts the configuration data
pub const SYNC_WORD: [u8; 4] = [0x7E, 0xAA, 0x99, 0x7E];

/// Minimum dummy clocks the simulated FPGA needs after the bitstream
const STARTUP_CLOCKS: usize = 49;

/// Board pins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pin {
    /// FPGA CDONE (driven by the board)
    Cdone,
    /// FPGA CRESET_B
    Creset,
    /// FPGA system clock
    Clock,
    /// CRAM chip select
    CramCs,
    /// CRAM data towards the FPGA
    CramData,
    /// CRAM bus clock
    CramSck,
    /// Flash clock
    FlashSck,
    /// Flash data in (MOSI)
    FlashMosi,
    /// Flash data out (MISO, driven by the board)
    FlashMiso,
    /// Flash chip select
    FlashCs,
}

const PIN_COUNT: usize = 10;

impl Pin {
    /// GPIO number reported by the line
    pub fn number(self) -> u32 {
        self as u32
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Configuration for the dummy board
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Flash size in bytes
    pub flash_size: usize,
    /// Page size for programming
    pub page_size: usize,
    /// Sector size for erase
    pub sector_size: usize,
    /// JEDEC ID bytes returned by RDID
    pub jedec_id: [u8; 3],
    /// Status reads that report WIP after an erase or program
    pub busy_polls: u32,
    /// Never clear WIP once an erase or program started
    pub stuck_busy: bool,
    /// FPGA finds a valid image in flash when reset is released with SS high
    pub boots_from_flash: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            flash_size: 4 * 1024 * 1024,
            page_size: 256,
            sector_size: 4096,
            jedec_id: [0xEF, 0x40, 0x16], // Winbond W25Q32
            busy_polls: 2,
            stuck_busy: false,
            boots_from_flash: false,
        }
    }
}

/// Parse board options from programmer options
///
/// # Supported Options
///
/// - `configured=1` - FPGA finds a valid image in flash and boots on start
/// - `stuck=1` - flash never clears WIP after an erase or program
/// - `busy=N` - status reads reporting WIP after each erase or program
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<DummyConfig, String> {
    let mut config = DummyConfig::default();
    let flag = |key: &str, value: &str| match value {
        "1" | "yes" | "true" => Ok(true),
        "0" | "no" | "false" => Ok(false),
        _ => Err(format!("Invalid {} value: {}", key, value)),
    };
    for &(key, value) in options {
        match key {
            "configured" => config.boots_from_flash = flag(key, value)?,
            "stuck" => config.stuck_busy = flag(key, value)?,
            "busy" => {
                config.busy_polls = value
                    .parse()
                    .map_err(|_| format!("Invalid busy value: {}", value))?;
            }
            _ => log::warn!("dummy: Unknown option: {}={}", key, value),
        }
    }
    Ok(config)
}

/// Erase/program operation seen by the simulated flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    /// Sector erase at the (aligned) address
    SectorErase(u32),
    /// Chip erase
    ChipErase,
    /// Page program
    PageProgram {
        /// Start address
        addr: u32,
        /// Number of data bytes
        len: usize,
    },
}

#[derive(Default)]
struct FpgaSim {
    slave_mode: bool,
    shift: u8,
    bits: u8,
    received: Vec<u8>,
    trailing_clocks: usize,
}

impl FpgaSim {
    fn bitstream_valid(&self) -> bool {
        self.received.windows(SYNC_WORD.len()).any(|w| w == SYNC_WORD)
    }
}

struct FlashSim {
    data: Vec<u8>,
    write_enabled: bool,
    busy: u32,
    powered_down: bool,
    selected: bool,
    shift_in: u8,
    bits_in: u8,
    rx: Vec<u8>,
    tx: VecDeque<u8>,
    tx_byte: u8,
    tx_bits: u8,
    read_addr: Option<usize>,
    status_stream: bool,
    ops: Vec<FlashOp>,
}

impl FlashSim {
    fn new(size: usize) -> Self {
        Self {
            data: vec![0xFF; size],
            write_enabled: false,
            busy: 0,
            powered_down: false,
            selected: false,
            shift_in: 0,
            bits_in: 0,
            rx: Vec::new(),
            tx: VecDeque::new(),
            tx_byte: 0,
            tx_bits: 0,
            read_addr: None,
            status_stream: false,
            ops: Vec::new(),
        }
    }

    fn status(&self) -> u8 {
        let mut sr = 0;
        if self.busy > 0 {
            sr |= 0x01;
        }
        if self.write_enabled {
            sr |= 0x02;
        }
        sr
    }

    fn address(&self) -> usize {
        ((self.rx[1] as usize) << 16) | ((self.rx[2] as usize) << 8) | self.rx[3] as usize
    }
}

struct Board {
    config: DummyConfig,
    levels: [bool; PIN_COUNT],
    directions: [Direction; PIN_COUNT],
    faulty: Option<Pin>,
    activity: usize,
    clock_khz: Option<u32>,
    clock_violations: usize,
    elapsed_ns: u64,
    fpga: FpgaSim,
    flash: FlashSim,
}

impl Board {
    fn new(config: DummyConfig) -> Self {
        let mut levels = [false; PIN_COUNT];
        // Pull-ups on both chip selects
        levels[Pin::CramCs.index()] = true;
        levels[Pin::FlashCs.index()] = true;
        let flash = FlashSim::new(config.flash_size);
        Self {
            config,
            levels,
            directions: [Direction::Input; PIN_COUNT],
            faulty: None,
            activity: 0,
            clock_khz: None,
            clock_violations: 0,
            elapsed_ns: 0,
            fpga: FpgaSim::default(),
            flash,
        }
    }

    fn level(&self, pin: Pin) -> bool {
        self.levels[pin.index()]
    }

    fn drive(&mut self, pin: Pin, high: bool) {
        let old = self.levels[pin.index()];
        self.levels[pin.index()] = high;
        if old == high {
            return;
        }
        self.activity += 1;

        match (pin, high) {
            (Pin::Creset, false) => self.reset_asserted(),
            (Pin::Creset, true) => self.reset_released(),
            (Pin::CramSck, true) => self.cram_clock(),
            (Pin::FlashCs, false) => self.flash_select(),
            (Pin::FlashCs, true) => self.flash_deselect(),
            (Pin::FlashSck, true) if self.flash.selected => self.flash_sample(),
            (Pin::FlashSck, false) if self.flash.selected => self.flash_shift_out(),
            _ => {}
        }
    }

    fn set_cdone(&mut self, high: bool) {
        self.levels[Pin::Cdone.index()] = high;
    }

    // ------------------------------------------------------------------
    // FPGA
    // ------------------------------------------------------------------

    fn start_clock(&mut self, khz: u32) {
        if !self.level(Pin::Creset) {
            log::warn!("dummy: clock started while CRESET is low");
            self.clock_violations += 1;
        }
        self.clock_khz = Some(khz);
    }

    fn reset_asserted(&mut self) {
        if self.clock_khz.is_some() {
            log::warn!("dummy: CRESET asserted with clock running");
            self.clock_violations += 1;
        }
        self.fpga = FpgaSim::default();
        self.set_cdone(false);
    }

    fn reset_released(&mut self) {
        if self.level(Pin::CramCs) {
            log::debug!("dummy: FPGA booting from flash");
            let booted = self.config.boots_from_flash;
            self.set_cdone(booted);
        } else {
            log::debug!("dummy: FPGA entered SPI slave configuration mode");
            self.fpga.slave_mode = true;
            self.set_cdone(false);
        }
    }

    fn cram_clock(&mut self) {
        if !self.fpga.slave_mode {
            return;
        }
        if !self.level(Pin::CramCs) {
            let bit = self.level(Pin::CramData) as u8;
            self.fpga.shift = (self.fpga.shift << 1) | bit;
            self.fpga.bits += 1;
            if self.fpga.bits == 8 {
                let byte = self.fpga.shift;
                self.fpga.received.push(byte);
                self.fpga.bits = 0;
            }
        } else if !self.fpga.received.is_empty() {
            self.fpga.trailing_clocks += 1;
            if self.fpga.trailing_clocks >= STARTUP_CLOCKS && self.fpga.bitstream_valid() {
                self.set_cdone(true);
            }
        }
    }

    // ------------------------------------------------------------------
    // Flash
    // ------------------------------------------------------------------

    fn flash_select(&mut self) {
        let flash = &mut self.flash;
        flash.selected = true;
        flash.shift_in = 0;
        flash.bits_in = 0;
        flash.rx.clear();
        flash.tx.clear();
        flash.tx_bits = 0;
        flash.read_addr = None;
        flash.status_stream = false;
    }

    fn flash_sample(&mut self) {
        let bit = self.level(Pin::FlashMosi) as u8;
        let flash = &mut self.flash;
        flash.shift_in = (flash.shift_in << 1) | bit;
        flash.bits_in += 1;
        if flash.bits_in < 8 {
            return;
        }
        flash.rx.push(flash.shift_in);
        flash.bits_in = 0;
        if flash.powered_down {
            return;
        }

        match (flash.rx[0], flash.rx.len()) {
            (opcodes::RDSR, 1) => flash.status_stream = true,
            (opcodes::RDID, 1) => flash.tx.extend(self.config.jedec_id),
            (opcodes::READ, 4) => flash.read_addr = Some(flash.address()),
            _ => {}
        }
    }

    fn flash_shift_out(&mut self) {
        let flash = &mut self.flash;
        if flash.tx_bits == 0 {
            let next = if let Some(byte) = flash.tx.pop_front() {
                Some(byte)
            } else if flash.status_stream {
                Some(flash.status())
            } else if let Some(addr) = flash.read_addr {
                flash.read_addr = Some(addr + 1);
                Some(flash.data[addr % flash.data.len()])
            } else {
                None
            };
            match next {
                Some(byte) => {
                    flash.tx_byte = byte;
                    flash.tx_bits = 8;
                }
                None => return,
            }
        }
        flash.tx_bits -= 1;
        let bit = (flash.tx_byte >> flash.tx_bits) & 1 != 0;
        self.levels[Pin::FlashMiso.index()] = bit;
    }

    fn flash_deselect(&mut self) {
        let sector = self.config.sector_size;
        let page = self.config.page_size;
        let busy_polls = self.config.busy_polls;
        let stuck = self.config.stuck_busy;
        let flash = &mut self.flash;
        flash.selected = false;

        let Some(&opcode) = flash.rx.first() else {
            return;
        };
        if flash.powered_down {
            if opcode == opcodes::RES {
                flash.powered_down = false;
            }
            return;
        }
        if opcode == opcodes::RDSR {
            if !stuck {
                flash.busy = flash.busy.saturating_sub(1);
            }
            return;
        }
        if flash.busy > 0 {
            log::warn!("dummy: flash busy, ignoring opcode 0x{:02X}", opcode);
            return;
        }

        match opcode {
            opcodes::WREN => flash.write_enabled = true,
            opcodes::DP => flash.powered_down = true,
            opcodes::SE_20 if flash.rx.len() == 4 && flash.write_enabled => {
                let base = flash.address() & !(sector - 1);
                let end = (base + sector).min(flash.data.len());
                if base < end {
                    flash.data[base..end].fill(0xFF);
                }
                flash.ops.push(FlashOp::SectorErase(base as u32));
                flash.write_enabled = false;
                flash.busy = busy_polls.max(1);
            }
            opcodes::CE_C7 if flash.write_enabled => {
                flash.data.fill(0xFF);
                flash.ops.push(FlashOp::ChipErase);
                flash.write_enabled = false;
                flash.busy = busy_polls.max(1);
            }
            opcodes::PP if flash.rx.len() > 4 && flash.write_enabled => {
                let addr = flash.address();
                let page_base = addr & !(page - 1);
                let in_page = addr - page_base;
                let payload = flash.rx[4..].to_vec();
                for (i, byte) in payload.iter().enumerate() {
                    let target = (page_base + (in_page + i) % page) % flash.data.len();
                    // NOR programming only clears bits
                    flash.data[target] &= byte;
                }
                flash.ops.push(FlashOp::PageProgram {
                    addr: addr as u32,
                    len: payload.len(),
                });
                flash.write_enabled = false;
                flash.busy = busy_polls.max(1);
            }
            _ => {}
        }
    }
}

/// Handle to a simulated board
#[derive(Clone)]
pub struct DummyBoard {
    inner: Rc<RefCell<Board>>,
}

impl DummyBoard {
    /// Create a new board with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Board::new(config))),
        }
    }

    /// Create a new board with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// A line connected to `pin`
    pub fn line(&self, pin: Pin) -> DummyLine {
        DummyLine {
            pin,
            board: self.clone(),
        }
    }

    /// The FPGA clock output
    pub fn clock(&self) -> DummyClock {
        DummyClock {
            board: self.clone(),
        }
    }

    /// A delay that only accounts simulated time
    pub fn delay(&self) -> DummyDelay {
        DummyDelay {
            board: self.clone(),
        }
    }

    /// An FPGA device wired to this board
    pub fn ice_fpga(&self, frequency_khz: u32) -> IceFpga<DummyLine, DummyClock, DummyDelay> {
        IceFpga::new(
            IcePins {
                cdone: self.line(Pin::Cdone),
                clock: self.clock(),
                creset: self.line(Pin::Creset),
                cram_cs: self.line(Pin::CramCs),
                cram_data_out: self.line(Pin::CramData),
                cram_sck: self.line(Pin::CramSck),
            },
            self.delay(),
            frequency_khz,
        )
    }

    /// A flash driver wired to this board
    pub fn spi_flash(&self, config: FlashConfig) -> SpiFlash<DummyLine, DummyDelay> {
        SpiFlash::new(
            FlashPins {
                sck: self.line(Pin::FlashSck),
                data_out: self.line(Pin::FlashMosi),
                data_in: self.line(Pin::FlashMiso),
                cs: self.line(Pin::FlashCs),
            },
            self.delay(),
            config,
        )
    }

    /// Make every operation on `pin` fail with a line fault
    pub fn fail_pin(&self, pin: Pin) {
        self.inner.borrow_mut().faulty = Some(pin);
    }

    /// Remove an injected fault
    pub fn clear_fault(&self) {
        self.inner.borrow_mut().faulty = None;
    }

    /// Current level of a pin
    pub fn level(&self, pin: Pin) -> bool {
        self.inner.borrow().level(pin)
    }

    /// Current direction of a pin as configured by the driver
    pub fn direction(&self, pin: Pin) -> Direction {
        self.inner.borrow().directions[pin.index()]
    }

    /// Whether the simulated FPGA reports CDONE
    pub fn cdone(&self) -> bool {
        self.level(Pin::Cdone)
    }

    /// Running clock frequency, if any
    pub fn clock_khz(&self) -> Option<u32> {
        self.inner.borrow().clock_khz
    }

    /// Times the clock ran while CRESET was low
    pub fn clock_violations(&self) -> usize {
        self.inner.borrow().clock_violations
    }

    /// Number of line transitions driven so far
    pub fn bus_activity(&self) -> usize {
        self.inner.borrow().activity
    }

    /// Simulated time spent in delays
    pub fn elapsed_ns(&self) -> u64 {
        self.inner.borrow().elapsed_ns
    }

    /// Configuration bytes received by the FPGA since the last reset
    pub fn cram_received(&self) -> Vec<u8> {
        self.inner.borrow().fpga.received.clone()
    }

    /// Copy of the flash contents
    pub fn flash_data(&self) -> Vec<u8> {
        self.inner.borrow().flash.data.clone()
    }

    /// Overwrite flash contents directly
    pub fn load_flash(&self, offset: usize, data: &[u8]) {
        let mut board = self.inner.borrow_mut();
        board.flash.data[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Erase and program operations seen so far
    pub fn flash_ops(&self) -> Vec<FlashOp> {
        self.inner.borrow().flash.ops.clone()
    }

    /// Whether the flash is in deep power-down
    pub fn flash_powered_down(&self) -> bool {
        self.inner.borrow().flash.powered_down
    }
}

/// A line of the simulated board
pub struct DummyLine {
    pin: Pin,
    board: DummyBoard,
}

impl DummyLine {
    fn check(&self, board: &Board) -> Result<()> {
        if board.faulty == Some(self.pin) {
            Err(Error::LineFault)
        } else {
            Ok(())
        }
    }
}

impl DigitalLine for DummyLine {
    fn id(&self) -> u32 {
        self.pin.number()
    }

    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        let mut board = self.board.inner.borrow_mut();
        self.check(&board)?;
        board.directions[self.pin.index()] = direction;
        Ok(())
    }

    fn set_level(&mut self, high: bool) -> Result<()> {
        let mut board = self.board.inner.borrow_mut();
        self.check(&board)?;
        board.drive(self.pin, high);
        Ok(())
    }

    fn level(&mut self) -> Result<bool> {
        let board = self.board.inner.borrow();
        self.check(&board)?;
        Ok(board.level(self.pin))
    }
}

/// Clock output of the simulated board
pub struct DummyClock {
    board: DummyBoard,
}

impl ClockLine for DummyClock {
    fn id(&self) -> u32 {
        Pin::Clock.number()
    }

    fn start_clock(&mut self, frequency_khz: u32) -> Result<()> {
        if frequency_khz == 0 {
            return Err(Error::InvalidFrequency);
        }
        self.board.inner.borrow_mut().start_clock(frequency_khz);
        Ok(())
    }

    fn stop_clock(&mut self) -> Result<()> {
        self.board.inner.borrow_mut().clock_khz = None;
        Ok(())
    }
}

/// Delay that advances simulated time without sleeping
#[derive(Clone)]
pub struct DummyDelay {
    board: DummyBoard,
}

impl Delay for DummyDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.board.inner.borrow_mut().elapsed_ns += ns as u64;
    }
}

/// Build a minimal bitstream the simulated FPGA accepts
///
/// Starts with the usual `FF 00` comment header, followed by the sync word
/// and `payload_len` filler bytes.
pub fn sample_bitstream(payload_len: usize) -> Vec<u8> {
    let mut image = vec![0xFF, 0x00, 0x00, 0xFF];
    image.extend_from_slice(&SYNC_WORD);
    image.extend((0..payload_len).map(|i| (i * 7) as u8));
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use icebang_core::flash::{
        erase_range, read_id, read_range, verify_image, write_image, FlashProgress, NoProgress,
    };
    use icebang_core::fpga::FpgaState;
    use icebang_core::timing::PollTimeout;

    fn flash_config() -> FlashConfig {
        FlashConfig::default().with_timeouts(PollTimeout::new(10, 100), PollTimeout::new(10, 100))
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[derive(Default)]
    struct Recorder {
        erased: Vec<u32>,
        programmed: Vec<usize>,
    }

    impl FlashProgress for Recorder {
        fn sector_erased(&mut self, offset: u32) {
            self.erased.push(offset);
        }

        fn programmed(&mut self, bytes_done: usize) {
            self.programmed.push(bytes_done);
        }
    }

    #[test]
    fn test_start_without_bitstream_times_out() {
        let board = DummyBoard::new_default();
        let mut ice = board.ice_fpga(48);

        assert_eq!(ice.start(), Err(Error::CdoneTimeout));
        assert!(board.level(Pin::Creset), "reset stays released");
        assert_eq!(board.clock_khz(), Some(48), "clock keeps running");
        assert_eq!(ice.state(), FpgaState::AwaitingCdone);
        assert_eq!(board.clock_violations(), 0);
        // The whole 250 ms CDONE budget was spent polling
        assert!(board.elapsed_ns() >= 250_000_000);
    }

    #[test]
    fn test_start_boots_from_flash() {
        let board = DummyBoard::new(DummyConfig {
            boots_from_flash: true,
            ..Default::default()
        });
        let mut ice = board.ice_fpga(12);

        ice.start().unwrap();
        assert_eq!(ice.state(), FpgaState::Configured);
        assert!(ice.is_done().unwrap());
    }

    #[test]
    fn test_stop_never_resets_with_clock_running() {
        let board = DummyBoard::new(DummyConfig {
            boots_from_flash: true,
            ..Default::default()
        });
        let mut ice = board.ice_fpga(48);

        ice.start().unwrap();
        ice.stop().unwrap();
        assert!(!board.level(Pin::Creset));
        assert_eq!(board.clock_khz(), None);
        ice.reset().unwrap();
        assert_eq!(board.clock_violations(), 0);
    }

    #[test]
    fn test_cram_configures_fpga() {
        let board = DummyBoard::new_default();
        let mut ice = board.ice_fpga(48);
        let bitstream = sample_bitstream(64);

        ice.cram(&bitstream).unwrap();
        assert!(board.cdone());
        assert_eq!(ice.state(), FpgaState::Configured);
        assert_eq!(board.cram_received(), bitstream);
        assert!(board.level(Pin::CramCs), "SS released after the session");
        assert_eq!(board.clock_violations(), 0);
    }

    #[test]
    fn test_cram_chunked_session() {
        let board = DummyBoard::new_default();
        let mut ice = board.ice_fpga(48);
        let bitstream = sample_bitstream(300);

        ice.cram_open().unwrap();
        for chunk in bitstream.chunks(37) {
            ice.cram_write(chunk).unwrap();
        }
        assert_eq!(ice.cram_programmer().bytes_streamed(), bitstream.len());
        assert_eq!(ice.cram_close(), Ok(true));
        assert_eq!(ice.cram_close(), Ok(false));
        assert_eq!(board.cram_received(), bitstream);
    }

    #[test]
    fn test_cram_rejects_garbage() {
        let board = DummyBoard::new_default();
        let mut ice = board.ice_fpga(48);

        assert_eq!(ice.cram(&[0x55; 32]), Err(Error::ConfigurationFailed));
        assert!(!board.cdone());
        assert!(!ice.cram_programmer().is_open());
    }

    #[test]
    fn test_cram_after_configured_reloads() {
        let board = DummyBoard::new_default();
        let mut ice = board.ice_fpga(48);

        ice.cram(&sample_bitstream(16)).unwrap();
        let second = sample_bitstream(40);
        ice.cram(&second).unwrap();
        assert_eq!(board.cram_received(), second);
        assert_eq!(board.clock_violations(), 0);
    }

    #[test]
    fn test_cram_write_before_open() {
        let board = DummyBoard::new_default();
        let mut ice = board.ice_fpga(48);

        assert_eq!(ice.cram_write(&[0x7E]), Err(Error::SessionNotOpen));
        assert_eq!(board.bus_activity(), 0);
    }

    #[test]
    fn test_write_image_5000_bytes() {
        let board = DummyBoard::new_default();
        let mut flash = board.spi_flash(flash_config());
        let data = pattern(5000);
        let mut progress = Recorder::default();

        write_image(&mut flash, &data, &mut progress).unwrap();

        let ops = board.flash_ops();
        assert_eq!(ops[0], FlashOp::SectorErase(0));
        assert_eq!(ops[1], FlashOp::SectorErase(4096));
        let pages: Vec<FlashOp> = ops[2..].to_vec();
        assert_eq!(pages.len(), 20);
        for (i, op) in pages.iter().enumerate() {
            let len = if i == 19 { 136 } else { 256 };
            assert_eq!(
                *op,
                FlashOp::PageProgram {
                    addr: (i * 256) as u32,
                    len
                }
            );
        }

        assert_eq!(&board.flash_data()[..5000], &data[..]);
        assert_eq!(progress.erased, [0, 4096]);
        assert_eq!(progress.programmed.last(), Some(&5000));
        assert!(!flash.is_initialized());
    }

    #[test]
    fn test_write_image_replaces_stale_data() {
        let board = DummyBoard::new_default();
        board.load_flash(0, &[0x00; 600]);
        let mut flash = board.spi_flash(flash_config());
        let data = pattern(300);

        write_image(&mut flash, &data, &mut NoProgress).unwrap();
        let contents = board.flash_data();
        assert_eq!(&contents[..300], &data[..]);
        // Rest of the erased sector reads back blank
        assert!(contents[300..4096].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_write_image_then_verify() {
        let board = DummyBoard::new_default();
        let mut flash = board.spi_flash(flash_config());
        let data = pattern(1000);

        write_image(&mut flash, &data, &mut NoProgress).unwrap();
        verify_image(&mut flash, &data, &mut NoProgress).unwrap();

        let mut other = data.clone();
        other[700] ^= 0x01;
        assert_eq!(
            verify_image(&mut flash, &other, &mut NoProgress),
            Err(Error::VerifyError {
                addr: 700,
                expected: other[700],
                found: data[700],
            })
        );
    }

    #[test]
    fn test_erase_range_sectors() {
        let board = DummyBoard::new_default();
        board.load_flash(8192, &[0x12; 16]);
        let mut flash = board.spi_flash(flash_config());

        erase_range(&mut flash, 8193, &mut NoProgress).unwrap();
        assert_eq!(
            board.flash_ops(),
            [
                FlashOp::SectorErase(0),
                FlashOp::SectorErase(4096),
                FlashOp::SectorErase(8192),
            ]
        );
        assert!(board.flash_data()[8192..8208].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_erase_zero_length_is_noop() {
        let board = DummyBoard::new_default();
        let mut flash = board.spi_flash(flash_config());

        erase_range(&mut flash, 0, &mut NoProgress).unwrap();
        assert!(board.flash_ops().is_empty());
        assert!(board.level(Pin::FlashCs));
    }

    #[test]
    fn test_stuck_flash_times_out_and_releases_bus() {
        let board = DummyBoard::new(DummyConfig {
            stuck_busy: true,
            ..Default::default()
        });
        let mut flash = board.spi_flash(flash_config());

        assert_eq!(
            write_image(&mut flash, &pattern(512), &mut NoProgress),
            Err(Error::Timeout)
        );
        assert_eq!(board.flash_ops(), [FlashOp::SectorErase(0)]);
        assert!(board.level(Pin::FlashCs));
        for pin in [Pin::FlashSck, Pin::FlashMosi, Pin::FlashMiso, Pin::FlashCs] {
            assert_eq!(board.direction(pin), Direction::Input);
        }
    }

    #[test]
    fn test_jedec_id_and_read() {
        let board = DummyBoard::new_default();
        board.load_flash(0x100, b"iCE40");
        let mut flash = board.spi_flash(flash_config());

        flash.init().unwrap();
        assert_eq!(flash.read_jedec_id().unwrap(), (0xEF, 0x4016));
        let mut buf = [0u8; 5];
        flash.read(0x100, &mut buf).unwrap();
        assert_eq!(&buf, b"iCE40");
        flash.deinit().unwrap();
    }

    #[test]
    fn test_sleep_and_wakeup() {
        let board = DummyBoard::new_default();
        let mut flash = board.spi_flash(flash_config());

        flash.init().unwrap();
        flash.sleep().unwrap();
        assert!(board.flash_powered_down());
        flash.wakeup().unwrap();
        assert!(!board.flash_powered_down());
        flash.deinit().unwrap();
    }

    #[test]
    fn test_chip_erase() {
        let board = DummyBoard::new_default();
        board.load_flash(0x20_0000, &[0; 8]);
        let mut flash = board.spi_flash(flash_config());

        flash.init().unwrap();
        flash.erase_chip().unwrap();
        flash.deinit().unwrap();
        assert_eq!(board.flash_ops(), [FlashOp::ChipErase]);
        assert!(board.flash_data().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_line_fault_aborts_write() {
        let board = DummyBoard::new_default();
        board.fail_pin(Pin::FlashMosi);
        let mut flash = board.spi_flash(flash_config());

        assert_eq!(
            write_image(&mut flash, &pattern(10), &mut NoProgress),
            Err(Error::LineFault)
        );
        assert!(board.flash_ops().is_empty());

        board.clear_fault();
        write_image(&mut flash, &pattern(10), &mut NoProgress).unwrap();
        assert_eq!(&board.flash_data()[..10], &pattern(10)[..]);
    }

    #[test]
    fn test_oversized_erase_rejected_before_bus_activity() {
        let board = DummyBoard::new_default();
        board.load_flash(0, &[0x42; 4]);
        let mut flash = board.spi_flash(flash_config());

        assert_eq!(
            erase_range(&mut flash, 0x0100_1000, &mut NoProgress),
            Err(Error::AddressOutOfRange)
        );
        assert!(board.flash_ops().is_empty());
        assert_eq!(board.bus_activity(), 0);
        assert_eq!(&board.flash_data()[..4], &[0x42; 4]);
    }

    #[test]
    fn test_oversized_image_rejected_before_bus_activity() {
        let board = DummyBoard::new_default();
        board.load_flash(0, &[0x42; 4]);
        let mut flash = board.spi_flash(flash_config());

        let image = vec![0u8; 0x0100_0001];
        assert_eq!(
            write_image(&mut flash, &image, &mut NoProgress),
            Err(Error::AddressOutOfRange)
        );
        assert!(board.flash_ops().is_empty());
        assert_eq!(board.bus_activity(), 0);
        assert_eq!(&board.flash_data()[..4], &[0x42; 4]);
    }

    #[test]
    fn test_zero_page_size_rejected_before_bus_activity() {
        let board = DummyBoard::new_default();
        let config = FlashConfig {
            page_size: 0,
            ..flash_config()
        };
        let mut flash = board.spi_flash(config);

        assert_eq!(
            write_image(&mut flash, &pattern(10), &mut NoProgress),
            Err(Error::InvalidGeometry)
        );
        assert_eq!(read_id(&mut flash), Err(Error::InvalidGeometry));
        assert_eq!(board.bus_activity(), 0);
    }

    #[test]
    fn test_read_range_brackets_bus() {
        let board = DummyBoard::new_default();
        let data = pattern(700);
        board.load_flash(0x1000, &data);
        let mut flash = board.spi_flash(flash_config());

        let mut buf = vec![0u8; 700];
        read_range(&mut flash, 0x1000, &mut buf, &mut NoProgress).unwrap();
        assert_eq!(buf, data);
        assert_eq!(read_id(&mut flash).unwrap(), (0xEF, 0x4016));
        assert!(!flash.is_initialized());
        assert_eq!(board.direction(Pin::FlashCs), Direction::Input);
    }

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[("configured", "1"), ("busy", "5")]).unwrap();
        assert!(config.boots_from_flash);
        assert!(!config.stuck_busy);
        assert_eq!(config.busy_polls, 5);
        assert!(parse_options(&[("stuck", "maybe")]).is_err());
    }
}
