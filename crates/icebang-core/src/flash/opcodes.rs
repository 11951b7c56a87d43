//! JEDEC SPI flash opcodes used by the driver

use bitflags::bitflags;

// ============================================================================
// Write control
// ============================================================================

/// Write Enable - required before any write/erase operation
pub const WREN: u8 = 0x06;

// ============================================================================
// Status register
// ============================================================================

/// Read Status Register 1
pub const RDSR: u8 = 0x05;

// ============================================================================
// Identification and power
// ============================================================================

/// Read JEDEC ID (manufacturer + device ID)
pub const RDID: u8 = 0x9F;
/// Release from Deep Power Down
pub const RES: u8 = 0xAB;
/// Deep Power Down
pub const DP: u8 = 0xB9;

// ============================================================================
// Read / program / erase, 3-byte address
// ============================================================================

/// Read Data
pub const READ: u8 = 0x03;
/// Page Program
pub const PP: u8 = 0x02;
/// Sector Erase (4 KiB)
pub const SE_20: u8 = 0x20;
/// Chip Erase
pub const CE_C7: u8 = 0xC7;

/// Largest address expressible with 3 address bytes
pub const MAX_3B_ADDR: u32 = 0x00FF_FFFF;

bitflags! {
    /// Status register 1 bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusRegister: u8 {
        /// Write In Progress
        const WIP = 1 << 0;
        /// Write Enable Latch
        const WEL = 1 << 1;
        /// Block protect bit 0
        const BP0 = 1 << 2;
        /// Block protect bit 1
        const BP1 = 1 << 3;
        /// Block protect bit 2
        const BP2 = 1 << 4;
        /// Top/bottom protect
        const TB = 1 << 5;
        /// Sector protect
        const SEC = 1 << 6;
        /// Status register protect
        const SRP = 1 << 7;
    }
}

impl StatusRegister {
    /// Whether an erase or program is still running
    pub fn is_busy(&self) -> bool {
        self.contains(Self::WIP)
    }
}

/// Encode an opcode followed by a big-endian 24-bit address
pub fn encode_3b(opcode: u8, addr: u32) -> [u8; 4] {
    [opcode, (addr >> 16) as u8, (addr >> 8) as u8, addr as u8]
}
