//! Snapshot ranges over committed records
//!
//! A `RecordRange` fixes its bounds when it is created: it covers the records
//! that were committed at that moment (capped at `max_count`). Records that
//! commit later are not included, and nothing inside the bounds can change
//! because the backing vectors are append-only.
//!
//! Iteration is lazy: each step takes the shared read lock just long enough to
//! clone one `Arc<Record>`. A range can be iterated any number of times.

use parking_lot::RwLock;
use std::iter::FusedIterator;
use std::sync::Arc;
use streamlog_core::Record;

/// Append-only vector of committed records, shared with readers
pub type SharedRecords = Arc<RwLock<Vec<Arc<Record>>>>;

/// Bounded, restartable view over a slice of committed records
#[derive(Debug, Clone, Default)]
pub struct RecordRange {
    source: Option<SharedRecords>,
    start: usize,
    end: usize,
}

impl RecordRange {
    /// Range over `source` covering positions after `after_version`
    ///
    /// Position `i` in `source` holds version `i + 1`, so the first record
    /// with a version greater than `after_version` sits at index
    /// `after_version`.
    pub fn new(source: SharedRecords, after_version: u64, max_count: usize) -> Self {
        let len = source.read().len();
        let start = usize::try_from(after_version).unwrap_or(usize::MAX).min(len);
        let end = start.saturating_add(max_count).min(len);
        RecordRange {
            source: Some(source),
            start,
            end,
        }
    }

    /// Range with no records (unknown stream, closed store)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of records in the range
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True if the range holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate from the start of the range
    pub fn iter(&self) -> Records {
        Records {
            source: self.source.clone(),
            next: self.start,
            end: self.end,
        }
    }

    /// Collect the range into a vector
    pub fn to_vec(&self) -> Vec<Arc<Record>> {
        self.iter().collect()
    }
}

impl IntoIterator for RecordRange {
    type Item = Arc<Record>;
    type IntoIter = Records;

    fn into_iter(self) -> Records {
        Records {
            source: self.source,
            next: self.start,
            end: self.end,
        }
    }
}

impl<'a> IntoIterator for &'a RecordRange {
    type Item = Arc<Record>;
    type IntoIter = Records;

    fn into_iter(self) -> Records {
        self.iter()
    }
}

/// Lazy iterator over a [`RecordRange`]
#[derive(Debug, Clone)]
pub struct Records {
    source: Option<SharedRecords>,
    next: usize,
    end: usize,
}

impl Iterator for Records {
    type Item = Arc<Record>;

    fn next(&mut self) -> Option<Arc<Record>> {
        if self.next >= self.end {
            return None;
        }
        let item = self.source.as_ref()?.read().get(self.next).cloned();
        match item {
            Some(record) => {
                self.next += 1;
                Some(record)
            }
            None => {
                // Backing set was released by close()
                self.next = self.end;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.end.saturating_sub(self.next)))
    }
}

impl FusedIterator for Records {}
