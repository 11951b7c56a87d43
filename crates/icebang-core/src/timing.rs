//! Timing helpers shared by the bus engines

/// Bounded polling budget
///
/// A poll loop samples its condition at most [`PollTimeout::max_polls`] times,
/// sleeping `interval_us` between samples. Expiry is reported as an error by
/// the caller, never as a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimeout {
    /// Delay between two polls in microseconds
    pub interval_us: u32,
    /// Total time budget in microseconds
    pub timeout_us: u32,
}

impl PollTimeout {
    /// Create a new polling budget
    pub const fn new(interval_us: u32, timeout_us: u32) -> Self {
        Self {
            interval_us,
            timeout_us,
        }
    }

    /// Number of times the condition is sampled before giving up
    ///
    /// Always at least one, so a zero timeout still checks once.
    pub fn max_polls(&self) -> u32 {
        let polls = if self.interval_us > 0 {
            self.timeout_us / self.interval_us
        } else {
            // Fall back to polling once per microsecond
            self.timeout_us
        };
        polls.max(1)
    }
}

/// Half clock period in nanoseconds for a bit-banged bus running at `hz`
///
/// Returns `None` for a zero frequency.
pub fn half_period_ns(hz: u32) -> Option<u32> {
    if hz == 0 {
        return None;
    }
    // half_period = 1 / (2 * frequency) in seconds
    Some(500_000_000 / hz)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_polls() {
        assert_eq!(PollTimeout::new(10, 10_000).max_polls(), 1000);
        assert_eq!(PollTimeout::new(0, 25).max_polls(), 25);
        assert_eq!(PollTimeout::new(1000, 0).max_polls(), 1);
        assert_eq!(PollTimeout::new(1000, 999).max_polls(), 1);
    }

    #[test]
    fn test_half_period() {
        assert_eq!(half_period_ns(10_000_000), Some(50));
        assert_eq!(half_period_ns(1_000_000), Some(500));
        assert_eq!(half_period_ns(2_000_000_000), Some(0));
        assert_eq!(half_period_ns(0), None);
    }
}
