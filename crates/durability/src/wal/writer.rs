//! WAL writer with durability mode support.
//!
//! The writer appends record frames to the active segment, rotates segments
//! at the configured size, and fsyncs according to the durability mode.
//!
//! # Group commit
//!
//! Writing a frame and making it durable are separate calls. `append` writes
//! the frame under the segment lock and returns the log position just past
//! it; `commit` waits until that position is on disk. Only one fsync runs at
//! a time, outside the segment lock, and it covers every frame written before
//! it started, so appenders that queue up behind an fsync share the next one.
//!
//! # Failed syncs
//!
//! A failed fsync poisons the writer: every later `append` fails and so does
//! any `commit` or `flush` that still needs a sync. In `Always` mode the
//! unsynced frames are cut off the segment first, as none of them has been
//! acknowledged.

use super::DurabilityMode;
use crate::format::{encode_record, WalSegment, SEGMENT_HEADER_SIZE};
use crate::wal::config::WalConfig;
use parking_lot::Mutex;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use streamlog_core::{CommitLog, Record};
use tracing::{debug, trace, warn};

/// Cumulative WAL operation counters.
///
/// Accumulated over the lifetime of the writer and never reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalCounters {
    /// Records appended
    pub wal_appends: u64,
    /// fsync calls
    pub sync_calls: u64,
    /// Bytes written to WAL segments
    pub bytes_written: u64,
    /// Nanoseconds spent in fsync
    pub sync_nanos: u64,
    /// Segments created by rotation
    pub rotations: u64,
}

/// Active segment and write bookkeeping, guarded by one mutex.
///
/// Log positions count frame bytes written since the writer was opened.
struct WriterState {
    segment: WalSegment,
    /// Log position of the active segment's first frame written by us
    segment_base: u64,
    /// File offset where `segment_base` lands
    base_offset: u64,
    /// Log position just past the last frame
    written: u64,
    /// `counters.wal_appends` as of the last completed sync
    appends_at_sync: u64,
    last_sync_time: Instant,
    counters: WalCounters,
}

/// Segmented WAL writer.
///
/// # Segment Rotation
///
/// When the next frame would push a non-empty segment past
/// `WalConfig::segment_size`, the writer syncs and leaves that segment and
/// starts the next one. Closed segments are never written again.
///
/// # Atomicity
///
/// `append` either leaves the whole frame in the segment or none of it.
pub struct WalWriter {
    state: Mutex<WriterState>,
    /// Held while an fsync is in flight; never acquired while holding `state`
    sync_lock: Mutex<()>,
    /// Log position known to be on stable storage
    synced: AtomicU64,
    poisoned: AtomicBool,

    durability: DurabilityMode,
    wal_dir: PathBuf,
    store_uuid: [u8; 16],
    config: WalConfig,

    #[cfg(test)]
    fail_syncs: AtomicBool,
}

impl WalWriter {
    /// Create a WAL writer.
    ///
    /// Reopens the highest-numbered segment in `wal_dir` for appending, or
    /// creates segment 1 when the directory holds none. Recovery must have
    /// run first so the tail segment ends on a frame boundary.
    pub fn new(
        wal_dir: PathBuf,
        store_uuid: [u8; 16],
        durability: DurabilityMode,
        config: WalConfig,
    ) -> io::Result<Self> {
        config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        std::fs::create_dir_all(&wal_dir)?;

        let segment = match list_segments(&wal_dir)?.last() {
            Some(&num) => {
                let segment = WalSegment::open_append(&wal_dir, num)?;
                if segment.store_uuid() != store_uuid {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("segment {} belongs to a different store", num),
                    ));
                }
                segment
            }
            None => WalSegment::create(&wal_dir, 1, store_uuid)?,
        };

        debug!(
            target: "streamlog::wal",
            segment = segment.segment_number(),
            size = segment.size(),
            mode = durability.description(),
            "WAL writer opened"
        );

        let base_offset = segment.size();
        Ok(WalWriter {
            state: Mutex::new(WriterState {
                segment,
                segment_base: 0,
                base_offset,
                written: 0,
                appends_at_sync: 0,
                last_sync_time: Instant::now(),
                counters: WalCounters::default(),
            }),
            sync_lock: Mutex::new(()),
            synced: AtomicU64::new(0),
            poisoned: AtomicBool::new(false),
            durability,
            wal_dir,
            store_uuid,
            config,
            #[cfg(test)]
            fail_syncs: AtomicBool::new(false),
        })
    }

    /// Write a record frame and return the log position just past it.
    ///
    /// Does not fsync, except when rotation has to seal the previous segment.
    /// Records too large for a frame are refused with `InvalidInput` before
    /// anything is written.
    pub fn append(&self, record: &Record) -> io::Result<u64> {
        let frame =
            encode_record(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let mut state = self.state.lock();
        self.check_poisoned()?;

        if !state.segment.is_empty()
            && state.segment.size() + frame.len() as u64 > self.config.segment_size
        {
            self.rotate_segment(&mut state)?;
        }

        state.segment.write(&frame)?;
        state.written += frame.len() as u64;
        state.counters.wal_appends += 1;
        state.counters.bytes_written += frame.len() as u64;

        trace!(
            target: "streamlog::wal",
            store_version = record.store_version(),
            bytes = frame.len(),
            position = state.written,
            "record appended"
        );

        Ok(state.written)
    }

    /// Make the record ending at `position` as durable as the mode requires.
    ///
    /// - `Always`: returns once `position` is on stable storage
    /// - `Standard`: syncs only when `batch_size` appends have piled up. A
    ///   failed batch sync poisons the writer but is not reported here: the
    ///   frame is written and this mode never promised more.
    pub fn commit(&self, position: u64) -> io::Result<()> {
        match self.durability {
            DurabilityMode::Always => self.sync_through(position),
            DurabilityMode::Standard { batch_size, .. } => {
                let (pending, written) = {
                    let state = self.state.lock();
                    (
                        state.counters.wal_appends - state.appends_at_sync,
                        state.written,
                    )
                };
                if pending >= batch_size as u64 {
                    let _ = self.sync_through(written);
                }
                Ok(())
            }
        }
    }

    /// Force everything written so far to disk, regardless of mode.
    pub fn flush(&self) -> io::Result<()> {
        let written = self.state.lock().written;
        self.sync_through(written)
    }

    /// Sync if the Standard interval has elapsed and there is unsynced data.
    ///
    /// Returns `true` if a sync was performed.
    pub fn sync_if_overdue(&self) -> io::Result<bool> {
        let interval_ms = match self.durability {
            DurabilityMode::Standard { interval_ms, .. } => interval_ms,
            DurabilityMode::Always => return Ok(false),
        };

        let (written, due) = {
            let state = self.state.lock();
            (
                state.written,
                state.last_sync_time.elapsed() >= Duration::from_millis(interval_ms),
            )
        };
        if written <= self.synced.load(Ordering::Acquire) || !due {
            return Ok(false);
        }

        self.sync_through(written)?;
        Ok(true)
    }

    fn sync_through(&self, position: u64) -> io::Result<()> {
        if self.synced.load(Ordering::Acquire) >= position {
            return Ok(());
        }

        let _sync = self.sync_lock.lock();
        // Whoever held the lock before us may have covered this position
        if self.synced.load(Ordering::Acquire) >= position {
            return Ok(());
        }
        self.check_poisoned()?;

        let (file, written, appends) = {
            let state = self.state.lock();
            self.check_poisoned()?;
            (
                state.segment.handle(),
                state.written,
                state.counters.wal_appends,
            )
        };

        let start = Instant::now();
        let result = self.sync_file(&file);

        let mut state = self.state.lock();
        match result.and_then(|()| self.check_poisoned()) {
            Ok(()) => {
                self.record_sync(&mut state, written, appends, start);
                Ok(())
            }
            Err(e) => {
                self.poison(&mut state, &e);
                Err(e)
            }
        }
    }

    fn rotate_segment(&self, state: &mut WriterState) -> io::Result<()> {
        let start = Instant::now();
        if let Err(e) = self.sync_file(&state.segment.handle()) {
            self.poison(state, &e);
            return Err(e);
        }
        let (written, appends) = (state.written, state.counters.wal_appends);
        self.record_sync(state, written, appends, start);

        let next = state.segment.segment_number() + 1;
        state.segment = WalSegment::create(&self.wal_dir, next, self.store_uuid)?;
        state.segment_base = state.written;
        state.base_offset = SEGMENT_HEADER_SIZE as u64;
        state.counters.rotations += 1;

        debug!(target: "streamlog::wal", segment = next, "rotated to new WAL segment");
        Ok(())
    }

    fn sync_file(&self, file: &File) -> io::Result<()> {
        if self.sync_fails() {
            return Err(io::Error::new(io::ErrorKind::Other, "sync failure"));
        }
        file.sync_all()
    }

    #[cfg(test)]
    fn sync_fails(&self) -> bool {
        self.fail_syncs.load(Ordering::SeqCst)
    }

    #[cfg(not(test))]
    fn sync_fails(&self) -> bool {
        false
    }

    fn record_sync(&self, state: &mut WriterState, written: u64, appends: u64, start: Instant) {
        self.synced.fetch_max(written, Ordering::AcqRel);
        state.counters.sync_calls += 1;
        state.counters.sync_nanos += start.elapsed().as_nanos() as u64;
        state.appends_at_sync = state.appends_at_sync.max(appends);
        state.last_sync_time = Instant::now();
    }

    fn poison(&self, state: &mut WriterState, error: &io::Error) {
        if self.poisoned.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(
            target: "streamlog::wal",
            segment = state.segment.segment_number(),
            error = %error,
            "WAL sync failed, refusing further appends"
        );

        if !self.durability.requires_immediate_fsync() {
            return;
        }
        let synced = self.synced.load(Ordering::Acquire);
        if synced < state.segment_base || synced >= state.written {
            return;
        }
        let offset = state.base_offset + (synced - state.segment_base);
        match state.segment.truncate(offset) {
            Ok(()) => {
                debug!(
                    target: "streamlog::wal",
                    bytes = state.written - synced,
                    "dropped unsynced frames"
                );
                state.written = synced;
            }
            Err(e) => {
                warn!(target: "streamlog::wal", error = %e, "could not drop unsynced frames");
            }
        }
    }

    fn check_poisoned(&self) -> io::Result<()> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "WAL is unusable after a failed sync; reopen the store",
            ));
        }
        Ok(())
    }

    /// Number of the segment currently being written.
    pub fn current_segment(&self) -> u64 {
        self.state.lock().segment.segment_number()
    }

    /// Size of the active segment in bytes.
    pub fn current_segment_size(&self) -> u64 {
        self.state.lock().segment.size()
    }

    /// Log position known to be on stable storage.
    pub fn synced_position(&self) -> u64 {
        self.synced.load(Ordering::Acquire)
    }

    /// True if some appended data has not been fsynced yet.
    pub fn has_unsynced_data(&self) -> bool {
        self.state.lock().written > self.synced.load(Ordering::Acquire)
    }

    /// True once a failed sync has disabled the writer.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Snapshot of cumulative counters.
    pub fn counters(&self) -> WalCounters {
        self.state.lock().counters.clone()
    }

    /// WAL directory path.
    pub fn wal_dir(&self) -> &Path {
        &self.wal_dir
    }

    /// Durability mode the writer was opened with.
    pub fn durability(&self) -> DurabilityMode {
        self.durability
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        if !self.is_poisoned() && self.has_unsynced_data() {
            let _ = self.state.get_mut().segment.sync();
        }
    }
}

impl CommitLog for WalWriter {
    fn append(&self, record: &Record) -> streamlog_core::Result<u64> {
        WalWriter::append(self, record).map_err(Into::into)
    }

    fn commit(&self, position: u64) -> streamlog_core::Result<()> {
        WalWriter::commit(self, position).map_err(Into::into)
    }

    fn flush(&self) -> streamlog_core::Result<()> {
        WalWriter::flush(self).map_err(Into::into)
    }

    fn sync_if_overdue(&self) -> streamlog_core::Result<bool> {
        WalWriter::sync_if_overdue(self).map_err(Into::into)
    }
}

/// All segment numbers in `wal_dir`, ascending.
///
/// Files that do not follow the `wal-NNNNNN.seg` pattern are ignored. A
/// missing directory has no segments.
pub fn list_segments(wal_dir: &Path) -> io::Result<Vec<u64>> {
    let entries = match std::fs::read_dir(wal_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut segments = Vec::new();
    for entry in entries {
        let name = entry?.file_name();
        if let Some(num) = WalSegment::parse_segment_number(&name.to_string_lossy()) {
            segments.push(num);
        }
    }

    segments.sort_unstable();
    Ok(segments)
}
