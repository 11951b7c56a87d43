//! Progress reporting with indicatif

use std::time::Duration;

use icebang_core::flash::FlashProgress;
use indicatif::{ProgressBar, ProgressStyle};

fn create_progress_bar_with_phase(
    total: u64,
    phase: &str,
) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                phase
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn create_spinner_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?)
}

/// Progress reporter using indicatif progress bars
#[derive(Default)]
pub struct IndicatifProgress {
    current_bar: Option<ProgressBar>,
    sectors: usize,
    erased: usize,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_bar(&mut self, total: u64, phase: &str) {
        let pb = create_progress_bar_with_phase(total, phase).unwrap_or_else(|_| ProgressBar::new(total));
        self.current_bar = Some(pb);
    }

    fn create_spinner(&mut self, message: String) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(create_spinner_style().unwrap_or_else(|_| ProgressStyle::default_spinner()));
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current_bar = Some(pb);
    }

    /// Finish the current bar, if any
    pub fn finish(&mut self, message: &str) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_with_message(message.to_string());
        }
    }
}

impl FlashProgress for IndicatifProgress {
    fn erasing(&mut self, sectors: usize) {
        self.finish("");
        self.sectors = sectors;
        self.erased = 0;
        self.create_spinner(format!("Erasing {} sectors...", sectors));
    }

    fn sector_erased(&mut self, offset: u32) {
        self.erased += 1;
        if let Some(pb) = &self.current_bar {
            pb.set_message(format!(
                "Erased {}/{} sectors (0x{:06X})",
                self.erased, self.sectors, offset
            ));
        }
    }

    fn programming(&mut self, bytes: usize) {
        self.finish("Erase complete");
        self.create_bar(bytes as u64, "Writing");
    }

    fn programmed(&mut self, bytes_done: usize) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(bytes_done as u64);
        }
    }

    fn verifying(&mut self, bytes: usize) {
        self.finish("Write complete");
        self.create_spinner(format!("Verifying {} bytes...", bytes));
    }

    fn reading(&mut self, bytes: usize) {
        self.finish("");
        self.create_bar(bytes as u64, "Reading");
    }

    fn read_progress(&mut self, bytes_done: usize) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(bytes_done as u64);
        }
    }
}
