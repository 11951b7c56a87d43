//! Serial NOR flash over a bit-banged SPI bus
//!
//! - [`SpiFlash`] - the driver primitives (init, erase, program, read, deinit)
//! - [`EraseProgramPlan`] - which sectors and pages a buffer touches
//! - [`write_image`], [`erase_range`], [`verify_image`], [`read_range`] -
//!   orchestration with an init/operate/deinit bracket around every call

mod device;
pub mod opcodes;
mod operations;
mod plan;

pub use device::{FlashConfig, FlashPins, SpiFlash, DEFAULT_FREQUENCY_HZ, PAGE_SIZE, SECTOR_SIZE};
pub use opcodes::StatusRegister;
pub use operations::{
    erase_range, read_id, read_range, verify_image, write_image, FlashProgress, NoProgress,
};
pub use plan::{EraseProgramPlan, PageSpan};
