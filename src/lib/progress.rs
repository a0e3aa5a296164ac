//! Progress tracking utilities.
//!
//! Advisory rank-side progress logging: a tracker counts processed items
//! and logs when interval boundaries are crossed. Progress output has no
//! effect on correctness or control flow.

use log::info;

/// Progress tracker that logs at regular count intervals.
///
/// # Example
/// ```
/// use braid_lib::progress::ProgressTracker;
///
/// let mut tracker = ProgressTracker::new("Rank 0: indexed reads").with_interval(100);
/// for _ in 0..250 {
///     tracker.log_if_needed(1); // logs at 100 and 200
/// }
/// tracker.log_final(); // logs "Rank 0: indexed reads 250 (complete)"
/// ```
pub struct ProgressTracker {
    /// Progress is logged when the count crosses multiples of this.
    interval: u64,
    /// Message prefix for log output.
    message: String,
    /// Items processed so far.
    count: u64,
}

impl ProgressTracker {
    /// Create a tracker with the default interval of 10,000.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { interval: 10_000, message: message.into(), count: 0 }
    }

    /// Set the logging interval.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Add to the count, logging once per interval boundary crossed.
    ///
    /// Returns `true` if the new count sits exactly on an interval
    /// boundary, so `log_final` knows whether a closing line is needed.
    pub fn log_if_needed(&mut self, additional: u64) -> bool {
        let previous = self.count;
        self.count += additional;
        for crossed in (previous / self.interval + 1)..=(self.count / self.interval) {
            info!("{} {}", self.message, crossed * self.interval);
        }
        self.count.is_multiple_of(self.interval)
    }

    /// Current count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Log the final count with a completion marker.
    pub fn log_final(&self) {
        info!("{} {} (complete)", self.message, self.count);
    }
}
