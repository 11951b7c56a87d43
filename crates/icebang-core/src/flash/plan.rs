//! Sector and page coverage of a buffer written from offset 0

use core::ops::Range;

use super::opcodes::MAX_3B_ADDR;
use crate::error::{Error, Result};

/// Erase and program steps needed to write `length` bytes at offset 0
///
/// Sectors are visited at offsets `0, sector_size, ..` while below `length`,
/// pages likewise with `page_size`. The last page may be partial. NOR flash
/// needs every sector erased before any page inside it is programmed, so
/// callers run [`EraseProgramPlan::sectors`] to completion before starting
/// on [`EraseProgramPlan::pages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseProgramPlan {
    length: usize,
    sector_size: u32,
    page_size: u32,
}

/// One page program step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSpan {
    /// Flash offset of the page
    pub offset: u32,
    /// Slice of the source buffer written to this page
    pub range: Range<usize>,
}

impl EraseProgramPlan {
    /// Plan for `length` bytes with the given geometry
    ///
    /// Fails with [`Error::InvalidGeometry`] for a zero sector or page size
    /// and with [`Error::AddressOutOfRange`] when `[0, length)` does not fit
    /// in the 24-bit address space.
    pub fn new(length: usize, sector_size: u32, page_size: u32) -> Result<Self> {
        if sector_size == 0 || page_size == 0 {
            return Err(Error::InvalidGeometry);
        }
        if length > MAX_3B_ADDR as usize + 1 {
            return Err(Error::AddressOutOfRange);
        }
        Ok(Self {
            length,
            sector_size,
            page_size,
        })
    }

    /// Number of bytes covered
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the plan covers nothing
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Sector erase offsets in ascending order
    pub fn sectors(&self) -> impl Iterator<Item = u32> {
        (0..self.length)
            .step_by(self.sector_size as usize)
            .map(|offset| offset as u32)
    }

    /// Page program steps in ascending order
    pub fn pages(&self) -> impl Iterator<Item = PageSpan> {
        let length = self.length;
        let page = self.page_size as usize;
        (0..length).step_by(page).map(move |start| PageSpan {
            offset: start as u32,
            range: start..(start + page).min(length),
        })
    }

    /// Number of sector erases
    pub fn sector_count(&self) -> usize {
        self.length.div_ceil(self.sector_size as usize)
    }

    /// Number of page programs
    pub fn page_count(&self) -> usize {
        self.length.div_ceil(self.page_size as usize)
    }

    /// Sector index containing `offset`
    pub fn sector_of(&self, offset: u32) -> u32 {
        offset / self.sector_size
    }
}
