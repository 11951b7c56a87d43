//! Pin capabilities consumed by the protocol engines
//!
//! Every component in this crate is handed its lines as values implementing
//! [`DigitalLine`]. The FPGA clock input is a free-running clock rather than
//! a bit-banged signal, so it is modelled separately as a [`ClockLine`].
//! Timing between edges comes from a [`Delay`].

use crate::error::Result;

/// Direction of a digital line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// High impedance, level can be sampled
    Input,
    /// Actively driven by us
    Output,
}

/// A single general purpose I/O line
///
/// Levels are physical: `true` is electrically high, regardless of whether the
/// signal is active-low on the other side.
pub trait DigitalLine {
    /// Numeric identifier of the line (GPIO number or offset), for diagnostics
    fn id(&self) -> u32;

    /// Switch the line between input and output
    fn set_direction(&mut self, direction: Direction) -> Result<()>;

    /// Drive the line level (only meaningful as an output)
    fn set_level(&mut self, high: bool) -> Result<()>;

    /// Sample the line level
    fn level(&mut self) -> Result<bool>;

    /// Drive the line high
    fn set_high(&mut self) -> Result<()> {
        self.set_level(true)
    }

    /// Drive the line low
    fn set_low(&mut self) -> Result<()> {
        self.set_level(false)
    }

    /// Configure as output and drive `high`
    fn drive(&mut self, high: bool) -> Result<()> {
        self.set_direction(Direction::Output)?;
        self.set_level(high)
    }

    /// Return the line to high impedance
    fn release(&mut self) -> Result<()> {
        self.set_direction(Direction::Input)
    }
}

/// A pin that can emit a free-running clock
pub trait ClockLine {
    /// Numeric identifier of the clock pin, for diagnostics
    fn id(&self) -> u32;

    /// Start toggling at `frequency_khz`
    fn start_clock(&mut self, frequency_khz: u32) -> Result<()>;

    /// Stop toggling and park the pin
    fn stop_clock(&mut self) -> Result<()>;
}

/// Blocking delay provider
pub trait Delay {
    /// Busy-wait or sleep for at least `ns` nanoseconds
    fn delay_ns(&mut self, ns: u32);

    /// Busy-wait or sleep for at least `us` microseconds
    fn delay_us(&mut self, us: u32) {
        let mut remaining = us;
        // 4_000_000 us still fits in u32 nanoseconds
        while remaining > 0 {
            let chunk = remaining.min(4_000_000);
            self.delay_ns(chunk * 1000);
            remaining -= chunk;
        }
    }
}

impl<T: DigitalLine + ?Sized> DigitalLine for &mut T {
    fn id(&self) -> u32 {
        (**self).id()
    }
    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        (**self).set_direction(direction)
    }
    fn set_level(&mut self, high: bool) -> Result<()> {
        (**self).set_level(high)
    }
    fn level(&mut self) -> Result<bool> {
        (**self).level()
    }
}

impl<T: Delay + ?Sized> Delay for &mut T {
    fn delay_ns(&mut self, ns: u32) {
        (**self).delay_ns(ns)
    }
}

#[cfg(feature = "alloc")]
mod boxed {
    use super::*;
    use alloc::boxed::Box;

    impl<T: DigitalLine + ?Sized> DigitalLine for Box<T> {
        fn id(&self) -> u32 {
            (**self).id()
        }
        fn set_direction(&mut self, direction: Direction) -> Result<()> {
            (**self).set_direction(direction)
        }
        fn set_level(&mut self, high: bool) -> Result<()> {
            (**self).set_level(high)
        }
        fn level(&mut self) -> Result<bool> {
            (**self).level()
        }
    }

    impl<T: ClockLine + ?Sized> ClockLine for Box<T> {
        fn id(&self) -> u32 {
            (**self).id()
        }
        fn start_clock(&mut self, frequency_khz: u32) -> Result<()> {
            (**self).start_clock(frequency_khz)
        }
        fn stop_clock(&mut self) -> Result<()> {
            (**self).stop_clock()
        }
    }

    impl<T: Delay + ?Sized> Delay for Box<T> {
        fn delay_ns(&mut self, ns: u32) {
            (**self).delay_ns(ns)
        }
    }
}
