//! Scan progress tracking.
//!
//! The pipeline reports coarse progress through the [`Tracker`] trait:
//! counters only, incremented from many tasks at once. [`CounterTracker`] is
//! the default atomic implementation; front-ends that want richer progress
//! (spinners, per-file logs) provide their own.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Progress counters for one scan. Implementations must be cheap and safe to
/// call from concurrent tasks.
pub trait Tracker: Send + Sync {
    /// A source file was discovered by the provider.
    fn track_file_found(&self);
    /// A file produced at least one parsed document.
    fn track_file_parse(&self);
    /// A file finished policy evaluation.
    fn track_file_evaluated(&self);
    /// A file was dropped by a per-file failure (parse, resolve, size cap).
    fn track_file_failed(&self);
}

/// Snapshot of tracker counters, attached to the scan report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerTotals {
    /// Files discovered.
    pub found: usize,
    /// Files parsed into documents.
    pub parsed: usize,
    /// Files that completed policy evaluation.
    pub evaluated: usize,
    /// Files dropped by per-file failures.
    pub failed: usize,
}

/// Atomic counter implementation of [`Tracker`].
#[derive(Debug, Default)]
pub struct CounterTracker {
    found: AtomicUsize,
    parsed: AtomicUsize,
    evaluated: AtomicUsize,
    failed: AtomicUsize,
}

impl CounterTracker {
    /// Create a tracker with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the current counters.
    pub fn totals(&self) -> TrackerTotals {
        TrackerTotals {
            found: self.found.load(Ordering::Relaxed),
            parsed: self.parsed.load(Ordering::Relaxed),
            evaluated: self.evaluated.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl Tracker for CounterTracker {
    fn track_file_found(&self) {
        self.found.fetch_add(1, Ordering::Relaxed);
    }

    fn track_file_parse(&self) {
        self.parsed.fetch_add(1, Ordering::Relaxed);
    }

    fn track_file_evaluated(&self) {
        self.evaluated.fetch_add(1, Ordering::Relaxed);
    }

    fn track_file_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counters_accumulate() {
        let tracker = CounterTracker::new();
        tracker.track_file_found();
        tracker.track_file_found();
        tracker.track_file_parse();
        tracker.track_file_failed();
        let totals = tracker.totals();
        assert_eq!(totals.found, 2);
        assert_eq!(totals.parsed, 1);
        assert_eq!(totals.evaluated, 0);
        assert_eq!(totals.failed, 1);
    }

    #[test]
    fn increments_survive_concurrency() {
        let tracker = Arc::new(CounterTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.track_file_found();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.totals().found, 800);
    }
}
