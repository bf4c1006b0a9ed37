//! Periodic progress logging.
//!
//! [`ProgressTracker`] counts processed items and logs a line each time the count crosses a
//! multiple of its interval.

use log::info;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default interval between progress lines.
pub const DEFAULT_INTERVAL: u64 = 10_000;

/// Thread-safe counter that logs at regular intervals.
///
/// # Example
/// ```
/// use lazybam::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new("Merged records").with_interval(100);
/// for _ in 0..250 {
///     tracker.log_if_needed(1); // logs at 100 and 200
/// }
/// tracker.log_final(); // logs "Merged records 250 (complete)"
/// assert_eq!(tracker.count(), 250);
/// ```
pub struct ProgressTracker {
    interval: u64,
    message: String,
    count: AtomicU64,
}

impl ProgressTracker {
    /// A tracker starting at zero with [`DEFAULT_INTERVAL`].
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { interval: DEFAULT_INTERVAL, message: message.into(), count: AtomicU64::new(0) }
    }

    /// Log every `interval` items. Zero is treated as one.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Add `additional` to the count, logging once per interval boundary crossed.
    ///
    /// Returns `true` if the count now sits exactly on a boundary.
    pub fn log_if_needed(&self, additional: u64) -> bool {
        if additional == 0 {
            let count = self.count.load(Ordering::Relaxed);
            return count > 0 && count % self.interval == 0;
        }

        let prev = self.count.fetch_add(additional, Ordering::Relaxed);
        let count = prev + additional;
        for i in (prev / self.interval + 1)..=(count / self.interval) {
            info!("{} {}", self.message, i * self.interval);
        }
        count % self.interval == 0
    }

    /// Log the final count unless the last boundary already did.
    pub fn log_final(&self) {
        if !self.log_if_needed(0) {
            let count = self.count.load(Ordering::Relaxed);
            if count > 0 {
                info!("{} {} (complete)", self.message, count);
            }
        }
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
