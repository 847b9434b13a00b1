//! Append counters
//!
//! The counters are observational only and use Relaxed ordering; they do
//! not synchronize anything else. `records` and `streams` in the snapshot
//! come from the committed set, not from these counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of store activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreMetrics {
    /// Successful appends since open
    pub appends: u64,
    /// Appends refused with `ConcurrencyConflict`
    pub conflicts: u64,
    /// Appends refused with `InvalidArgument`
    pub rejected: u64,
    /// Appends whose durable write failed
    pub write_failures: u64,
    /// Records currently committed (including recovered ones)
    pub records: u64,
    /// Non-empty streams
    pub streams: u64,
}

/// Live counters owned by the store
#[derive(Debug, Default)]
pub(crate) struct AppendCounters {
    appends: AtomicU64,
    conflicts: AtomicU64,
    rejected: AtomicU64,
    write_failures: AtomicU64,
}

impl AppendCounters {
    pub(crate) fn record_append(&self) {
        self.appends.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, records: u64, streams: u64) -> StoreMetrics {
        StoreMetrics {
            appends: self.appends.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            records,
            streams,
        }
    }
}
