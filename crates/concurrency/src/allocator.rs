//! Version allocator
//!
//! Hands out (stream version, store version) pairs for appends.
//!
//! ## Locking
//!
//! ```text
//! with_stream(key)                  per-stream mutex, held for the whole append
//!   slot.current()                  lock-free read of the stream's version
//!   slot.commit_staged(stage, complete)
//!     sequencer mutex:
//!       reserve (C+1, G+1)
//!       stage(pair)                 short, e.g. queue a WAL frame
//!       issue G+1 (only if stage returned Ok)
//!     complete(pair, staged)        slow part, e.g. wait for fsync
//!     advance stream to C+1 (only if complete returned Ok)
//! ```
//!
//! Appends to different streams only meet at the sequencer, which is held
//! for the stage step alone. A failed stage leaves no gap in either
//! sequence. Once staged, a store version is issued for good: if `complete`
//! fails the caller has to stop issuing, because later reservations may
//! already hold higher numbers.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use streamlog_core::{VersionPair, EMPTY_STREAM_VERSION};
use tracing::trace;

/// Per-stream state: the append lock and the last committed version
#[derive(Debug, Default)]
struct StreamEntry {
    lock: Mutex<()>,
    current: AtomicU64,
}

impl StreamEntry {
    fn at(version: u64) -> Self {
        StreamEntry {
            lock: Mutex::new(()),
            current: AtomicU64::new(version),
        }
    }
}

/// Issues stream-local and store-wide versions
///
/// Streams are created implicitly on first use at version 0. Once a stream
/// commits a record its entry stays for the life of the allocator.
#[derive(Debug, Default)]
pub struct VersionAllocator {
    streams: DashMap<String, Arc<StreamEntry>>,
    sequencer: Mutex<()>,
    store_version: AtomicU64,
}

impl VersionAllocator {
    /// Create an allocator for an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocator seeded from recovered state
    ///
    /// # Arguments
    /// * `store_version` - Highest store version found during recovery
    /// * `streams` - (stream key, highest stream version) for every stream
    pub fn from_recovered<I>(store_version: u64, streams: I) -> Self
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let map = DashMap::new();
        for (key, version) in streams {
            map.insert(key, Arc::new(StreamEntry::at(version)));
        }
        VersionAllocator {
            streams: map,
            sequencer: Mutex::new(()),
            store_version: AtomicU64::new(store_version),
        }
    }

    /// Last issued store version (0 when the store is empty)
    pub fn current_store_version(&self) -> u64 {
        self.store_version.load(Ordering::Acquire)
    }

    /// Last committed version of a stream (0 when unknown or empty)
    ///
    /// Does not take the stream lock.
    pub fn current_stream_version(&self, key: &str) -> u64 {
        self.streams
            .get(key)
            .map(|entry| entry.current.load(Ordering::Acquire))
            .unwrap_or(EMPTY_STREAM_VERSION)
    }

    /// Number of streams the allocator is tracking
    ///
    /// Streams that never committed a record are forgotten when their last
    /// `with_stream` call returns.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Run `f` while holding the stream's append lock
    ///
    /// Only one closure per stream key runs at a time. Closures for
    /// different keys run concurrently.
    pub fn with_stream<R>(&self, key: &str, f: impl FnOnce(&mut StreamSlot<'_>) -> R) -> R {
        let entry = self.entry(key);
        let out = {
            let _guard = entry.lock.lock();
            let mut slot = StreamSlot {
                key,
                entry: &entry,
                allocator: self,
            };
            f(&mut slot)
        };

        if entry.current.load(Ordering::Acquire) == EMPTY_STREAM_VERSION {
            drop(entry);
            // Clones are only made under the shard lock, so a count of one
            // here means no other caller is waiting on this entry.
            self.streams.remove_if(key, |_, entry| {
                Arc::strong_count(entry) == 1
                    && entry.current.load(Ordering::Acquire) == EMPTY_STREAM_VERSION
            });
        }
        out
    }

    /// Reserve the next version pair for `key` and commit it with `write`
    ///
    /// Shorthand for `with_stream` + `commit` when no expectation check is
    /// needed.
    pub fn reserve_next<T, E>(
        &self,
        key: &str,
        write: impl FnOnce(VersionPair) -> Result<T, E>,
    ) -> Result<T, E> {
        self.with_stream(key, |slot| slot.commit(write))
    }

    fn entry(&self, key: &str) -> Arc<StreamEntry> {
        // Clone the Arc out so the shard lock is released before we block on
        // the stream mutex.
        if let Some(entry) = self.streams.get(key) {
            return Arc::clone(entry.value());
        }
        let entry = self.streams.entry(key.to_string()).or_insert_with(|| {
            trace!(target: "streamlog::allocator", stream = key, "New stream");
            Arc::new(StreamEntry::default())
        });
        Arc::clone(entry.value())
    }
}

/// Exclusive handle on one stream, valid inside [`VersionAllocator::with_stream`]
pub struct StreamSlot<'a> {
    key: &'a str,
    entry: &'a StreamEntry,
    allocator: &'a VersionAllocator,
}

impl StreamSlot<'_> {
    /// Stream key this slot guards
    pub fn key(&self) -> &str {
        self.key
    }

    /// Current (last committed) version of the stream
    pub fn current(&self) -> u64 {
        self.entry.current.load(Ordering::Acquire)
    }

    /// Reserve the next version pair and commit it
    ///
    /// `write` runs inside the sequencer with the reserved pair. Both
    /// counters advance by exactly one if and only if `write` succeeds.
    pub fn commit<T, E>(
        &mut self,
        write: impl FnOnce(VersionPair) -> Result<T, E>,
    ) -> Result<T, E> {
        self.commit_staged(write, |_, out| Ok(out))
    }

    /// Reserve the next version pair, stage it, then complete it
    ///
    /// `stage` runs inside the sequencer; on `Ok` the store version is
    /// issued. `complete` runs after the sequencer is released, while this
    /// stream is still locked; on `Ok` the stream version advances.
    pub fn commit_staged<S, T, E>(
        &mut self,
        stage: impl FnOnce(VersionPair) -> Result<S, E>,
        complete: impl FnOnce(VersionPair, S) -> Result<T, E>,
    ) -> Result<T, E> {
        let (pair, staged) = {
            let _sequencer = self.allocator.sequencer.lock();

            let pair = VersionPair {
                stream: self.current() + 1,
                store: self.allocator.current_store_version() + 1,
            };
            let staged = stage(pair)?;

            self.allocator
                .store_version
                .store(pair.store, Ordering::Release);
            (pair, staged)
        };

        let out = complete(pair, staged)?;
        self.entry.current.store(pair.stream, Ordering::Release);
        Ok(out)
    }
}
