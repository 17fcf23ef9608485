//! Indexing progress snapshots and the observer that receives them.
//!
//! An indexing run folds per-batch results into an [`IndexProgress`] value
//! and hands a copy to an [`IndexProgressReporter`] after every batch.
//! Counters are cumulative for the run and never decrease, so a consumer
//! that misses intermediate snapshots loses nothing: the last one it sees
//! is authoritative.

use std::time::Duration;

/// Cumulative counters for one indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexProgress {
    /// Documents selected for this run.
    pub total: u64,
    /// Embedded and watermarked.
    pub completed: u64,
    /// Still unsuccessful after the retry budget (or cut off by cancellation).
    pub failed: u64,
    /// Fingerprint already matched; no provider call needed.
    pub skipped: u64,
    /// Time since the run started.
    pub elapsed: Duration,
}

impl IndexProgress {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Documents accounted for so far.
    pub fn processed(&self) -> u64 {
        self.completed + self.failed + self.skipped
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.processed())
    }

    pub fn is_finished(&self) -> bool {
        self.remaining() == 0
    }
}

/// Final result of an indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOutcome {
    /// The last snapshot of the run.
    pub progress: IndexProgress,
    /// True if the run stopped early on a cancellation signal.
    pub cancelled: bool,
    /// Batches fully processed.
    pub batches: usize,
}

/// Receives progress snapshots from an indexing run.
///
/// Called inline from the indexing loop, so implementations must not block.
pub trait IndexProgressReporter: Send + Sync {
    fn report(&self, progress: &IndexProgress);
}

impl<F> IndexProgressReporter for F
where
    F: Fn(&IndexProgress) + Send + Sync,
{
    fn report(&self, progress: &IndexProgress) {
        self(progress)
    }
}
