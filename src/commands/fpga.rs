//! FPGA commands

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use icebang_core::Error;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::FpgaCommands;
use crate::handle::FpgaHandle;
use crate::image;

/// Run an FPGA subcommand
pub fn run(fpga: &mut dyn FpgaHandle, action: &FpgaCommands) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        FpgaCommands::Start => report(fpga.start()),
        FpgaCommands::Stop => report(fpga.stop()),
        FpgaCommands::Reset => report(fpga.reset()),
        FpgaCommands::Status => {
            let done = fpga.is_done()?;
            println!("CDONE: {}", if done { "high" } else { "low" });
            Ok(())
        }
        FpgaCommands::Cram { file } => run_cram(fpga, file),
        FpgaCommands::Info => {
            println!("{}", fpga.describe());
            Ok(())
        }
    }
}

/// Print the outcome of a sequencer operation as `true`/`false`
///
/// A missing bitstream makes `start` fail, which is not a CLI error.
fn report(result: icebang_core::Result<()>) -> Result<(), Box<dyn std::error::Error>> {
    match result {
        Ok(()) => {
            println!("true");
            Ok(())
        }
        Err(Error::CdoneTimeout) => {
            log::warn!("CDONE did not go high, FPGA is not configured");
            println!("false");
            Ok(())
        }
        Err(e) => {
            log::error!("{}", e);
            println!("false");
            Err(e.into())
        }
    }
}

fn run_cram(fpga: &mut dyn FpgaHandle, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut source = image::open_source(file)
        .map_err(|e| format!("Failed to open {}: {}", file.display(), e))?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Loading bitstream...");

    match load_bitstream(fpga, source.as_mut(), &pb) {
        Ok(bytes) => {
            pb.finish_with_message(format!("Configured FPGA with {} bytes", bytes));
            Ok(())
        }
        Err(e) => {
            pb.finish_with_message("Configuration failed");
            Err(e)
        }
    }
}

/// Stream `source` into a CRAM session from its current position
///
/// The session is closed on every path so the bus is released; a stream or
/// write error takes precedence over the close result.
fn load_bitstream(
    fpga: &mut dyn FpgaHandle,
    source: &mut dyn Read,
    pb: &ProgressBar,
) -> Result<usize, Box<dyn std::error::Error>> {
    fpga.cram_open()?;
    let mut done = 0;
    let streamed = image::stream_chunks(source, |chunk| -> Result<(), Box<dyn std::error::Error>> {
        fpga.cram_write(chunk)?;
        done += chunk.len();
        pb.set_message(format!("Loading bitstream... {} bytes", done));
        Ok(())
    });
    let closed = fpga.cram_close();

    let bytes = streamed?;
    if !closed? {
        return Err(Error::ConfigurationFailed.into());
    }
    Ok(bytes)
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use icebang_core::ice::IceFpga;
    use icebang_dummy::{sample_bitstream, DummyBoard, DummyClock, DummyDelay, DummyLine, Pin};

    fn core_error(err: &(dyn std::error::Error + 'static)) -> Option<Error> {
        err.downcast_ref::<Error>().copied()
    }

    /// Fails every write after the first `ok_writes`
    struct FailingWrites {
        ice: IceFpga<DummyLine, DummyClock, DummyDelay>,
        ok_writes: usize,
    }

    impl FpgaHandle for FailingWrites {
        fn start(&mut self) -> icebang_core::Result<()> {
            self.ice.start()
        }

        fn stop(&mut self) -> icebang_core::Result<()> {
            self.ice.stop()
        }

        fn reset(&mut self) -> icebang_core::Result<()> {
            self.ice.reset()
        }

        fn is_done(&mut self) -> icebang_core::Result<bool> {
            self.ice.is_done()
        }

        fn cram_open(&mut self) -> icebang_core::Result<()> {
            self.ice.cram_open()
        }

        fn cram_write(&mut self, data: &[u8]) -> icebang_core::Result<()> {
            if self.ok_writes == 0 {
                return Err(Error::LineFault);
            }
            self.ok_writes -= 1;
            self.ice.cram_write(data)
        }

        fn cram_close(&mut self) -> icebang_core::Result<bool> {
            self.ice.cram_close()
        }

        fn describe(&self) -> String {
            self.ice.to_string()
        }
    }

    #[test]
    fn test_start_without_bitstream_is_not_an_error() {
        let board = DummyBoard::new_default();
        let mut ice = board.ice_fpga(48);

        assert!(run(&mut ice, &FpgaCommands::Start).is_ok());
        assert!(!board.cdone());
        assert_eq!(board.clock_khz(), Some(48));
    }

    #[test]
    fn test_line_fault_fails_the_command() {
        let board = DummyBoard::new_default();
        board.fail_pin(Pin::Creset);
        let mut ice = board.ice_fpga(48);

        for action in [FpgaCommands::Start, FpgaCommands::Stop, FpgaCommands::Reset] {
            let err = run(&mut ice, &action).unwrap_err();
            assert_eq!(core_error(err.as_ref()), Some(Error::LineFault));
        }
    }

    #[test]
    fn test_cram_streams_from_current_position() {
        let board = DummyBoard::new_default();
        let mut ice = board.ice_fpga(48);
        let bitstream = sample_bitstream(10_000);
        let mut input = vec![0xAB; 16];
        input.extend_from_slice(&bitstream);

        // A byte slice reads like a pipe: no Seek, position already advanced
        let mut source: &[u8] = &input;
        let mut skipped = [0u8; 16];
        source.read_exact(&mut skipped).unwrap();

        let bytes = load_bitstream(&mut ice, &mut source, &ProgressBar::hidden()).unwrap();
        assert_eq!(bytes, bitstream.len());
        assert_eq!(board.cram_received(), bitstream);
        assert!(board.cdone());
    }

    #[test]
    fn test_cram_write_error_closes_session() {
        let board = DummyBoard::new_default();
        let mut fpga = FailingWrites {
            ice: board.ice_fpga(48),
            ok_writes: 1,
        };
        let bitstream = sample_bitstream(10_000);
        let mut source: &[u8] = &bitstream;

        let err = load_bitstream(&mut fpga, &mut source, &ProgressBar::hidden()).unwrap_err();
        assert_eq!(core_error(err.as_ref()), Some(Error::LineFault));
        assert!(!fpga.ice.cram_programmer().is_open());
        assert!(board.level(Pin::CramCs), "SS released after the failed write");
        assert_eq!(board.cram_received().len(), image::STREAM_CHUNK_SIZE);
    }

    #[test]
    fn test_cram_rejected_bitstream_is_configuration_failure() {
        let board = DummyBoard::new_default();
        let mut ice = board.ice_fpga(48);
        let mut source: &[u8] = &[0x55; 64];

        let err = load_bitstream(&mut ice, &mut source, &ProgressBar::hidden()).unwrap_err();
        assert_eq!(core_error(err.as_ref()), Some(Error::ConfigurationFailed));
        assert!(!board.cdone());
    }
}
