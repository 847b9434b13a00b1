//! Core trait definitions
//!
//! `CommitLog` is the seam between the engine's append path and whatever makes
//! records durable. An append reaches it in two steps:
//!
//! 1. `append` runs inside the short sequencing section, right after the
//!    store version is issued, so records reach the log in store-version
//!    order. It writes the record and returns a position; it must not wait
//!    for stable storage.
//! 2. `commit` runs after the sequencing section is released, still under
//!    the stream's lock. It returns once everything up to the position is as
//!    durable as the log promises. Appends to other streams proceed while it
//!    waits.
//!
//! An `Err` from `append` aborts the append with nothing consumed. An `Err`
//! from `commit` means the log can no longer vouch for anything past its
//! last durable point; it must refuse all later appends.

use crate::error::Result;
use crate::types::Record;

/// Durable sink for committed records
pub trait CommitLog: Send + Sync {
    /// Write one record after every record appended before it.
    ///
    /// Returns an opaque, increasing position to pass to `commit`. On `Err`
    /// nothing of the record may remain in the log.
    fn append(&self, record: &Record) -> Result<u64>;

    /// Wait until every record up to `position` is durable.
    ///
    /// `Ok` for a position implies every earlier position is durable too.
    /// Concurrent callers may be served by a single sync.
    fn commit(&self, position: u64) -> Result<()>;

    /// Force everything written so far to stable storage
    fn flush(&self) -> Result<()>;

    /// Periodic hook for logs that defer fsync. Called from a background
    /// thread; the default does nothing.
    fn sync_if_overdue(&self) -> Result<bool> {
        Ok(false)
    }
}
