//! Erase/program orchestration on top of the driver primitives
//!
//! Every entry point brackets its work with `init` and `deinit`, so the bus
//! is never held between calls. The first failing step aborts the sequence;
//! flash erase cannot be undone so nothing is rolled back. Lengths and
//! geometry are checked before the bus is taken.

use super::device::SpiFlash;
use super::plan::EraseProgramPlan;
use crate::error::{Error, Result};
use crate::line::{Delay, DigitalLine};

/// Chunk size for read-back
const VERIFY_CHUNK_SIZE: usize = 256;

/// Callback for progress reporting during flash operations
pub trait FlashProgress {
    /// Called before the first sector erase
    fn erasing(&mut self, _sectors: usize) {}

    /// Called after each sector erase
    fn sector_erased(&mut self, _offset: u32) {}

    /// Called before the first page program
    fn programming(&mut self, _bytes: usize) {}

    /// Called after each page program with the running byte count
    fn programmed(&mut self, _bytes_done: usize) {}

    /// Called before read-back verification
    fn verifying(&mut self, _bytes: usize) {}

    /// Called before a plain read
    fn reading(&mut self, _bytes: usize) {}

    /// Called after each read chunk with the running byte count
    fn read_progress(&mut self, _bytes_done: usize) {}
}

/// A no-op progress reporter
pub struct NoProgress;

impl FlashProgress for NoProgress {}

fn bracket<L, D, T, F>(flash: &mut SpiFlash<L, D>, op: F) -> Result<T>
where
    L: DigitalLine,
    D: Delay,
    F: FnOnce(&mut SpiFlash<L, D>) -> Result<T>,
{
    let result = flash.init().and_then(|_| op(flash));
    let released = flash.deinit();
    if let Err(e) = &released {
        log::warn!("flash: failed to release bus: {}", e);
    }
    let value = result?;
    released?;
    Ok(value)
}

fn erase_sectors<L, D, P>(
    flash: &mut SpiFlash<L, D>,
    plan: &EraseProgramPlan,
    progress: &mut P,
) -> Result<()>
where
    L: DigitalLine,
    D: Delay,
    P: FlashProgress + ?Sized,
{
    progress.erasing(plan.sector_count());
    for offset in plan.sectors() {
        flash.erase_sector(offset).inspect_err(|e| {
            log::error!("flash: erase at 0x{:06X} failed: {}", offset, e);
        })?;
        progress.sector_erased(offset);
    }
    Ok(())
}

/// Erase every sector touched by `[0, data.len())`, then program every page
///
/// All erases complete before the first page is programmed.
pub fn write_image<L, D, P>(flash: &mut SpiFlash<L, D>, data: &[u8], progress: &mut P) -> Result<()>
where
    L: DigitalLine,
    D: Delay,
    P: FlashProgress + ?Sized,
{
    let config = *flash.config();
    let plan = EraseProgramPlan::new(data.len(), config.sector_size, config.page_size)?;
    log::info!(
        "flash: writing {} bytes ({} sectors, {} pages)",
        data.len(),
        plan.sector_count(),
        plan.page_count()
    );

    bracket(flash, |flash| {
        erase_sectors(flash, &plan, progress)?;

        progress.programming(plan.len());
        let mut done = 0;
        for page in plan.pages() {
            let chunk = &data[page.range.clone()];
            flash.program_page(page.offset, chunk).inspect_err(|e| {
                log::error!("flash: program at 0x{:06X} failed: {}", page.offset, e);
            })?;
            done += chunk.len();
            progress.programmed(done);
        }
        Ok(())
    })
}

/// Erase every sector touched by `[0, length)`
///
/// A zero length performs no erase at all.
pub fn erase_range<L, D, P>(flash: &mut SpiFlash<L, D>, length: usize, progress: &mut P) -> Result<()>
where
    L: DigitalLine,
    D: Delay,
    P: FlashProgress + ?Sized,
{
    let config = *flash.config();
    let plan = EraseProgramPlan::new(length, config.sector_size, config.page_size)?;
    log::info!(
        "flash: erasing {} bytes ({} sectors)",
        length,
        plan.sector_count()
    );
    bracket(flash, |flash| erase_sectors(flash, &plan, progress))
}

/// Read back `[0, data.len())` and compare with `data`
///
/// Returns [`Error::VerifyError`] with the first mismatching offset.
pub fn verify_image<L, D, P>(flash: &mut SpiFlash<L, D>, data: &[u8], progress: &mut P) -> Result<()>
where
    L: DigitalLine,
    D: Delay,
    P: FlashProgress + ?Sized,
{
    progress.verifying(data.len());
    bracket(flash, |flash| {
        let mut buf = [0u8; VERIFY_CHUNK_SIZE];
        for (index, expected) in data.chunks(VERIFY_CHUNK_SIZE).enumerate() {
            let offset = index * VERIFY_CHUNK_SIZE;
            let found = &mut buf[..expected.len()];
            flash.read(offset as u32, found)?;
            if let Some(i) = expected.iter().zip(found.iter()).position(|(a, b)| a != b) {
                let addr = (offset + i) as u32;
                log::error!("flash: verify mismatch at 0x{:06X}", addr);
                return Err(Error::VerifyError {
                    addr,
                    expected: expected[i],
                    found: found[i],
                });
            }
        }
        Ok(())
    })
}

/// Read `buf.len()` bytes starting at `offset`
pub fn read_range<L, D, P>(
    flash: &mut SpiFlash<L, D>,
    offset: u32,
    buf: &mut [u8],
    progress: &mut P,
) -> Result<()>
where
    L: DigitalLine,
    D: Delay,
    P: FlashProgress + ?Sized,
{
    progress.reading(buf.len());
    bracket(flash, |flash| {
        let mut done = 0;
        for chunk in buf.chunks_mut(VERIFY_CHUNK_SIZE) {
            flash.read(offset + done as u32, chunk)?;
            done += chunk.len();
            progress.read_progress(done);
        }
        Ok(())
    })
}

/// Read the JEDEC ID as (manufacturer, device)
pub fn read_id<L, D>(flash: &mut SpiFlash<L, D>) -> Result<(u8, u16)>
where
    L: DigitalLine,
    D: Delay,
{
    bracket(flash, |flash| flash.read_jedec_id())
}
