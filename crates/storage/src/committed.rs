//! Committed record set
//!
//! Two append-only indexes over the same `Arc<Record>` values:
//!
//! - per stream: `DashMap<stream key, Vec<record>>`, position = stream version - 1
//! - global: one `Vec<record>`, position = store version - 1
//!
//! Both are only ever pushed to, so a reader that has fixed its bounds sees
//! a stable slice. `publish` checks the contiguity of both version sequences
//! and refuses records that would break them.
//!
//! ## Ordered publication
//!
//! Appends finish their durable writes in any order, but readers must see
//! store versions without holes. The engine `stage`s each record in store
//! order while it holds the sequencing lock, and after the record's commit
//! calls `publish_through(v)`, which moves every staged record up to `v`
//! into the indexes. Whichever append finishes first publishes the records
//! of slower appends ahead of it.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use streamlog_core::{Error, Record, Result};

use crate::snapshot::{RecordRange, SharedRecords};

/// In-memory set of committed records
#[derive(Debug, Default)]
pub struct CommittedLog {
    streams: DashMap<String, SharedRecords>,
    all: SharedRecords,
    /// Staged records not yet visible, in store-version order
    staged: Mutex<VecDeque<Arc<Record>>>,
}

impl CommittedLog {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a committed record visible to readers
    ///
    /// Fails with `Corruption` if the record's versions are not exactly one
    /// past the current heads of its stream and of the store.
    pub fn publish(&self, record: Arc<Record>) -> Result<()> {
        let stream = Arc::clone(
            self.streams
                .entry(record.key().to_string())
                .or_default()
                .value(),
        );

        let mut all = self.all.write();
        let mut stream = stream.write();

        let expected_store = all.len() as u64 + 1;
        let expected_stream = stream.len() as u64 + 1;
        if record.store_version() != expected_store || record.stream_version() != expected_stream {
            return Err(Error::corruption(format!(
                "record for '{}' has versions (stream {}, store {}), expected (stream {}, store {})",
                record.key(),
                record.stream_version(),
                record.store_version(),
                expected_stream,
                expected_store
            )));
        }

        stream.push(Arc::clone(&record));
        all.push(record);
        Ok(())
    }

    /// Queue a record whose durable write is in flight
    ///
    /// Must be called in store-version order.
    pub fn stage(&self, record: Arc<Record>) {
        self.staged.lock().push_back(record);
    }

    /// Publish every staged record with `store_version <= store_version`
    ///
    /// Fails with `StorageError` if `store_version` is still not visible
    /// afterwards, which means its record was discarded.
    pub fn publish_through(&self, store_version: u64) -> Result<()> {
        let mut staged = self.staged.lock();
        while staged
            .front()
            .is_some_and(|record| record.store_version() <= store_version)
        {
            if let Some(record) = staged.pop_front() {
                self.publish(record)?;
            }
        }
        drop(staged);

        if self.last_store_version() < store_version {
            return Err(Error::storage(format!(
                "store version {} was discarded before it could be published",
                store_version
            )));
        }
        Ok(())
    }

    /// Drop staged records with `store_version >= store_version`
    ///
    /// Returns how many were dropped. Used when a commit fails, since none
    /// of the records staged after it can be published in order.
    pub fn discard_from(&self, store_version: u64) -> usize {
        let mut staged = self.staged.lock();
        let keep = staged
            .iter()
            .take_while(|record| record.store_version() < store_version)
            .count();
        let dropped = staged.len() - keep;
        staged.truncate(keep);
        dropped
    }

    /// Records of one stream with `stream_version > after_version`
    pub fn read_stream(&self, key: &str, after_version: u64, max_count: usize) -> RecordRange {
        match self.streams.get(key) {
            Some(records) => {
                let records = Arc::clone(records.value());
                RecordRange::new(records, after_version, max_count)
            }
            None => RecordRange::empty(),
        }
    }

    /// Records of all streams with `store_version > after_version`
    pub fn read_all(&self, after_version: u64, max_count: usize) -> RecordRange {
        RecordRange::new(Arc::clone(&self.all), after_version, max_count)
    }

    /// Total committed records
    pub fn len(&self) -> usize {
        self.all.read().len()
    }

    /// Highest visible store version (0 when empty)
    pub fn last_store_version(&self) -> u64 {
        self.len() as u64
    }

    /// Records staged but not yet published
    pub fn staged_len(&self) -> usize {
        self.staged.lock().len()
    }

    /// True if nothing has been committed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Committed records in one stream
    pub fn stream_len(&self, key: &str) -> usize {
        self.streams
            .get(key)
            .map(|records| records.read().len())
            .unwrap_or(0)
    }

    /// Number of non-empty streams
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Release every record held in memory
    ///
    /// Outstanding ranges stop yielding once the backing vectors are empty.
    pub fn clear(&self) {
        self.staged.lock().clear();
        for entry in self.streams.iter() {
            entry.value().write().clear();
        }
        self.streams.clear();
        self.all.write().clear();
    }
}
