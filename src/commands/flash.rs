//! Flash commands

use std::path::Path;

use crate::cli::FlashCommands;
use crate::handle::FlashHandle;
use crate::image;

use super::progress::IndicatifProgress;

/// Run a flash subcommand
pub fn run(flash: &mut dyn FlashHandle, action: &FlashCommands) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        FlashCommands::Write { file, verify } => run_write(flash, file, *verify),
        FlashCommands::Erase { length } => run_erase(flash, *length as usize),
        FlashCommands::Read {
            file,
            length,
            offset,
        } => run_read(flash, file, *offset, *length as usize),
        FlashCommands::Id => {
            let (manufacturer, device) = flash.read_id()?;
            println!("JEDEC ID: {:02X} {:04X}", manufacturer, device);
            Ok(())
        }
        FlashCommands::Info => {
            let (sector, page) = flash.geometry();
            println!("{}", flash.describe());
            println!("Sector size:     {} bytes", sector);
            println!("Page size:       {} bytes", page);
            Ok(())
        }
    }
}

fn run_write(
    flash: &mut dyn FlashHandle,
    file: &Path,
    verify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = image::read_image(file).map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
    println!("Writing {} bytes from {}", data.len(), file.display());

    let mut progress = IndicatifProgress::new();
    flash.write_image(&data, &mut progress)?;
    if verify {
        flash.verify_image(&data, &mut progress)?;
        progress.finish("Verify complete");
    } else {
        progress.finish("Write complete");
    }
    Ok(())
}

fn run_erase(flash: &mut dyn FlashHandle, length: usize) -> Result<(), Box<dyn std::error::Error>> {
    let mut progress = IndicatifProgress::new();
    flash.erase_range(length, &mut progress)?;
    progress.finish("Erase complete");
    Ok(())
}

fn run_read(
    flash: &mut dyn FlashHandle,
    file: &Path,
    offset: u32,
    length: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut buf = vec![0u8; length];
    let mut progress = IndicatifProgress::new();
    flash.read(offset, &mut buf, &mut progress)?;
    progress.finish("Read complete");

    image::write_output(file, &buf).map_err(|e| format!("Failed to write {}: {}", file.display(), e))?;
    log::info!("Read {} bytes at 0x{:06X} to {}", length, offset, file.display());
    Ok(())
}
