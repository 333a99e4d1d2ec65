//! Batch accumulator statistics
//!
//! Lock-free counters updated on the intake path. Read them through
//! [`BatchStats::snapshot`].

use crate::common::BufferCategory;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one accumulator.
#[derive(Debug, Default)]
pub struct BatchStats {
    /// Events appended to a batch
    events_accepted: AtomicU64,
    /// Resubmissions equal to the previous event, not appended
    duplicates_suppressed: AtomicU64,
    /// Events dropped because a reference could not be taken
    retain_failures: AtomicU64,
    /// Intake calls that failed while encoding
    encoding_failures: AtomicU64,
    /// Batches drained by a success reset
    batches_sent: AtomicU64,
    /// References released on close
    events_released: AtomicU64,
    binary_bytes: AtomicU64,
    insert_node_bytes: AtomicU64,
    tablet_bytes: AtomicU64,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an appended event and its buffer size.
    pub fn record_accepted(&self, category: BufferCategory, bytes: usize) {
        self.events_accepted.fetch_add(1, Ordering::Relaxed);
        let counter = match category {
            BufferCategory::Binary => &self.binary_bytes,
            BufferCategory::InsertNode => &self.insert_node_bytes,
            BufferCategory::Tablet => &self.tablet_bytes,
        };
        counter.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retain_failure(&self) {
        self.retain_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encoding_failure(&self) {
        self.encoding_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_sent(&self) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_released(&self, count: usize) {
        self.events_released
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get a point-in-time copy of all counters.
    pub fn snapshot(&self) -> BatchStatsSnapshot {
        BatchStatsSnapshot {
            events_accepted: self.events_accepted.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            retain_failures: self.retain_failures.load(Ordering::Relaxed),
            encoding_failures: self.encoding_failures.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            events_released: self.events_released.load(Ordering::Relaxed),
            binary_bytes: self.binary_bytes.load(Ordering::Relaxed),
            insert_node_bytes: self.insert_node_bytes.load(Ordering::Relaxed),
            tablet_bytes: self.tablet_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`BatchStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStatsSnapshot {
    pub events_accepted: u64,
    pub duplicates_suppressed: u64,
    pub retain_failures: u64,
    pub encoding_failures: u64,
    pub batches_sent: u64,
    pub events_released: u64,
    pub binary_bytes: u64,
    pub insert_node_bytes: u64,
    pub tablet_bytes: u64,
}

impl BatchStatsSnapshot {
    /// Bytes accepted across all categories.
    pub fn total_bytes(&self) -> u64 {
        self.binary_bytes + self.insert_node_bytes + self.tablet_bytes
    }
}
