//! CLI command implementations
//!
//! Commands work through the type-erased handles in [`crate::handle`], so
//! the same code drives every programmer backend.

pub mod flash;
pub mod fpga;
mod list;
mod progress;

pub use list::list_programmers;
