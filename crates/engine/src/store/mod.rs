//! Append-only store
//!
//! `AppendOnlyStore` is the public entry point: it validates appends, checks
//! the caller's expected stream version, reserves versions from the
//! allocator, writes the record through the commit log and publishes it to
//! the committed set that readers see.
//!
//! ## Append path
//!
//! ```text
//! validate key/payload                     InvalidArgument, no locks taken
//! allocator.with_stream(key)               per-stream mutex
//!   check expected vs current              ConcurrencyConflict, no effect
//!   slot.commit_staged
//!     sequencer:
//!       commit_log.append(record)          buffered write, no fsync
//!       committed.stage(record)            queued, not yet visible
//!     commit_log.commit(position)          fsync in "always" mode
//!     committed.publish_through(store)     staged records up to here become visible
//!   stream counter advances
//! ```
//!
//! Only the sequencer is shared between streams, and nothing inside it waits
//! on the disk. Publication drains the staged queue in store-version order,
//! so `read_all` never observes store version N+1 before N, and an append
//! returns only once its own record is visible.
//!
//! If `commit` fails, the failed record and everything staged after it are
//! discarded and the store refuses further appends until it is reopened.

pub mod config;

pub use config::{StoreConfig, CONFIG_FILE_NAME};

use parking_lot::{Mutex, RwLock};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use streamlog_concurrency::VersionAllocator;
use streamlog_core::{
    AppendOutcome, CommitLog, Error, ExpectedVersion, Limits, Record, Result,
};
use streamlog_durability::{recover, DurabilityMode, WalWriter, MAX_RECORD_CONTENT};
use streamlog_storage::{CommittedLog, RecordRange};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metrics::{AppendCounters, StoreMetrics};

/// Name of the WAL directory inside the data directory.
pub const WAL_DIR_NAME: &str = "wal";

/// Name of the process lock file inside the data directory.
pub const LOCK_FILE_NAME: &str = ".lock";

/// Append-only, multi-stream record store.
///
/// Cheap to share across threads behind an `Arc`; every method takes `&self`.
///
/// # Example
///
/// ```text
/// use streamlog::{AppendOnlyStore, ExpectedVersion};
///
/// let store = AppendOnlyStore::open("/path/to/data")?;
/// let first = store.append("orders", b"created".to_vec(), ExpectedVersion::NO_STREAM)?;
/// store.append("orders", b"paid".to_vec(), first.stream_version)?;
///
/// for record in store.read_stream("orders", 0, 100)? {
///     println!("{} @ {}", record.key(), record.stream_version());
/// }
/// ```
pub struct AppendOnlyStore {
    /// Canonical data directory (None for in-memory stores)
    data_dir: Option<PathBuf>,

    /// Durability mode of the WAL (None when there is no WAL)
    durability_mode: Option<DurabilityMode>,

    limits: Limits,

    allocator: VersionAllocator,

    committed: CommittedLog,

    /// Durable sink, taken on close
    log: RwLock<Option<Arc<dyn CommitLog>>>,

    accepting: AtomicBool,

    /// Set when the log failed to commit; appends are refused from then on
    failed: AtomicBool,

    /// Appends hold this shared; close takes it exclusively to drain them.
    gate: RwLock<()>,

    counters: AppendCounters,

    flush_shutdown: Arc<AtomicBool>,
    flush_handle: Mutex<Option<JoinHandle<()>>>,

    /// Exclusive lock on `<data_dir>/.lock`, held until close.
    lock_file: Mutex<Option<File>>,
}

impl AppendOnlyStore {
    /// Open a disk-backed store in `path`, recovering any existing WAL.
    ///
    /// Settings come from `<path>/streamlog.toml`; a default file is written
    /// if none exists.
    ///
    /// # Errors
    ///
    /// - `Config` if the config file is invalid
    /// - `StorageError` if another process holds the directory
    /// - `Corruption` if the WAL is damaged beyond a torn tail
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(CONFIG_FILE_NAME);
        StoreConfig::write_default_if_missing(&config_path)?;
        let cfg = StoreConfig::from_file(&config_path)?;

        Self::open_dir(data_dir, cfg)
    }

    /// Open a disk-backed store with an explicit configuration.
    ///
    /// The config is written to `streamlog.toml` so a later `open()` picks
    /// up the same settings.
    pub fn open_with_config<P: AsRef<Path>>(path: P, cfg: StoreConfig) -> Result<Self> {
        cfg.validate()?;

        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        cfg.write_to_file(&data_dir.join(CONFIG_FILE_NAME))?;

        Self::open_dir(data_dir, cfg)
    }

    fn open_dir(data_dir: PathBuf, cfg: StoreConfig) -> Result<Self> {
        let mode = cfg.durability_mode()?;
        let wal_config = cfg.wal_config()?;
        let data_dir = data_dir.canonicalize()?;

        let lock_file = acquire_dir_lock(&data_dir)?;

        let wal_dir = data_dir.join(WAL_DIR_NAME);
        let recovered = recover(&wal_dir)?;
        let store_version = recovered.store_version();
        let stats = recovered.stats.clone();

        let store_uuid = recovered
            .store_uuid
            .unwrap_or_else(|| *Uuid::new_v4().as_bytes());

        let writer = WalWriter::new(wal_dir, store_uuid, mode, wal_config)?;

        let allocator = VersionAllocator::from_recovered(store_version, recovered.stream_heads);
        let committed = CommittedLog::new();
        for record in recovered.records {
            committed.publish(Arc::new(record))?;
        }

        let log: Arc<dyn CommitLog> = Arc::new(writer);
        let flush_shutdown = Arc::new(AtomicBool::new(false));
        let flush_handle = match mode {
            DurabilityMode::Standard { interval_ms, .. } => Some(spawn_flush_thread(
                Arc::clone(&log),
                Arc::clone(&flush_shutdown),
                Duration::from_millis(interval_ms),
            )?),
            DurabilityMode::Always => None,
        };

        info!(
            target: "streamlog::store",
            path = ?data_dir,
            store_id = %Uuid::from_bytes(store_uuid),
            mode = mode.description(),
            records = stats.records_recovered,
            streams = stats.streams_recovered,
            truncated_bytes = stats.bytes_truncated,
            "Store opened"
        );

        Ok(AppendOnlyStore {
            data_dir: Some(data_dir),
            durability_mode: Some(mode),
            limits: Limits::default(),
            allocator,
            committed,
            log: RwLock::new(Some(log)),
            accepting: AtomicBool::new(true),
            failed: AtomicBool::new(false),
            gate: RwLock::new(()),
            counters: AppendCounters::default(),
            flush_shutdown,
            flush_handle: Mutex::new(flush_handle),
            lock_file: Mutex::new(Some(lock_file)),
        })
    }

    /// Create an in-memory store with no files. Nothing survives `close`.
    pub fn ephemeral() -> Self {
        Self::in_memory(None)
    }

    /// Create an in-memory store that writes every record through `log`.
    ///
    /// If the log refuses a record, the append fails and nothing becomes
    /// visible. If it fails to commit one, the store stops accepting appends.
    pub fn with_commit_log(log: Box<dyn CommitLog>) -> Self {
        Self::in_memory(Some(Arc::from(log)))
    }

    fn in_memory(log: Option<Arc<dyn CommitLog>>) -> Self {
        AppendOnlyStore {
            data_dir: None,
            durability_mode: None,
            limits: Limits::default(),
            allocator: VersionAllocator::new(),
            committed: CommittedLog::new(),
            log: RwLock::new(log),
            accepting: AtomicBool::new(true),
            failed: AtomicBool::new(false),
            gate: RwLock::new(()),
            counters: AppendCounters::default(),
            flush_shutdown: Arc::new(AtomicBool::new(false)),
            flush_handle: Mutex::new(None),
            lock_file: Mutex::new(None),
        }
    }

    /// Replace the key and payload size limits.
    ///
    /// Disk-backed stores cap the limits so that a key and payload at their
    /// maximum still fit in one WAL frame.
    pub fn with_limits(mut self, mut limits: Limits) -> Self {
        if self.data_dir.is_some() {
            let requested = limits.clone();
            limits.max_stream_key_bytes = limits.max_stream_key_bytes.min(MAX_RECORD_CONTENT);
            limits.max_payload_bytes = limits
                .max_payload_bytes
                .min(MAX_RECORD_CONTENT - limits.max_stream_key_bytes);
            if limits != requested {
                warn!(
                    target: "streamlog::store",
                    max_stream_key_bytes = limits.max_stream_key_bytes,
                    max_payload_bytes = limits.max_payload_bytes,
                    "Limits capped to the WAL frame size"
                );
            }
        }
        self.limits = limits;
        self
    }

    /// Append one record to `key`.
    ///
    /// `expected` is either `ExpectedVersion::Any` or the stream version the
    /// caller last saw (`0`/`NO_STREAM` for a stream that must not exist
    /// yet). Plain integers convert, and a negative `i64` means any.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty or oversized key, or an oversized payload
    /// - `ConcurrencyConflict` if the stream is not at the expected version
    /// - `StoreClosed` after `close`
    /// - `Io` if the log refuses the record; no version is consumed
    /// - `Io` or `StorageError` if the log fails to make the record durable;
    ///   the store then refuses every later append until reopened
    pub fn append(
        &self,
        key: &str,
        payload: impl Into<Vec<u8>>,
        expected: impl Into<ExpectedVersion>,
    ) -> Result<AppendOutcome> {
        let _gate = self.gate.read();
        self.check_open()?;
        self.check_healthy()?;

        let payload = payload.into();
        let expected = expected.into();

        if let Err(e) = self
            .limits
            .validate_stream_key(key)
            .and_then(|_| self.limits.validate_payload(&payload))
        {
            self.counters.record_rejected();
            return Err(e);
        }

        let log = self.log.read().clone();

        let outcome = self.allocator.with_stream(key, |slot| {
            let current = slot.current();
            if !expected.matches(current) {
                return Err(Error::ConcurrencyConflict {
                    stream: key.to_string(),
                    expected: expected.exact().unwrap_or(current),
                    actual: current,
                });
            }

            slot.commit_staged(
                |pair| {
                    self.check_healthy()?;
                    let record = Arc::new(Record::new(key, payload, pair.stream, pair.store));
                    let position = match &log {
                        Some(log) => Some(log.append(&record)?),
                        None => None,
                    };
                    self.committed.stage(record);
                    Ok(position)
                },
                |pair, position| {
                    if let (Some(log), Some(position)) = (&log, position) {
                        if let Err(e) = log.commit(position).and_then(|()| self.check_healthy()) {
                            self.mark_failed(pair.store, &e);
                            return Err(e);
                        }
                    }
                    self.committed.publish_through(pair.store)?;
                    Ok(AppendOutcome::from(pair))
                },
            )
        });

        match &outcome {
            Ok(_) => self.counters.record_append(),
            Err(Error::ConcurrencyConflict {
                expected, actual, ..
            }) => {
                self.counters.record_conflict();
                debug!(
                    target: "streamlog::store",
                    stream = key,
                    expected,
                    actual,
                    "Append rejected: version conflict"
                );
            }
            Err(e) => {
                self.counters.record_write_failure();
                warn!(target: "streamlog::store", stream = key, error = %e, "Append failed");
            }
        }

        outcome
    }

    fn check_healthy(&self) -> Result<()> {
        if self.failed.load(Ordering::SeqCst) {
            return Err(Error::storage(
                "an earlier commit failed; reopen the store to continue",
            ));
        }
        Ok(())
    }

    fn mark_failed(&self, store_version: u64, error: &Error) {
        self.failed.store(true, Ordering::SeqCst);
        let discarded = self.committed.discard_from(store_version);
        warn!(
            target: "streamlog::store",
            store_version,
            discarded,
            error = %error,
            "Commit failed, refusing further appends"
        );
    }

    /// Records of `key` with `stream_version > after_version`, at most
    /// `max_count` of them.
    ///
    /// The range is bounded when this returns; records committed later are
    /// not included. An unknown stream yields an empty range.
    pub fn read_stream(
        &self,
        key: &str,
        after_version: u64,
        max_count: usize,
    ) -> Result<RecordRange> {
        self.check_open()?;
        self.limits.validate_stream_key(key)?;
        Ok(self.committed.read_stream(key, after_version, max_count))
    }

    /// Records of every stream with `store_version > after_version`, in
    /// store-version order, at most `max_count` of them.
    ///
    /// Pass the last consumed store version to resume from a checkpoint.
    pub fn read_all(&self, after_version: u64, max_count: usize) -> Result<RecordRange> {
        self.check_open()?;
        Ok(self.committed.read_all(after_version, max_count))
    }

    /// Last committed version of `key` (0 for a stream never written).
    pub fn stream_version(&self, key: &str) -> Result<u64> {
        self.check_open()?;
        Ok(self.committed.stream_len(key) as u64)
    }

    /// Last committed store version (0 for an empty store).
    pub fn store_version(&self) -> Result<u64> {
        self.check_open()?;
        Ok(self.committed.last_store_version())
    }

    /// Number of streams holding at least one record.
    pub fn stream_count(&self) -> Result<usize> {
        self.check_open()?;
        Ok(self.committed.stream_count())
    }

    /// Force everything written so far to stable storage.
    ///
    /// A no-op for stores without a WAL.
    pub fn flush(&self) -> Result<()> {
        self.check_open()?;
        if let Some(log) = self.log.read().as_ref() {
            log.flush()?;
        }
        Ok(())
    }

    /// Snapshot of append counters and committed-set sizes.
    pub fn metrics(&self) -> StoreMetrics {
        self.counters.snapshot(
            self.committed.len() as u64,
            self.committed.stream_count() as u64,
        )
    }

    /// Close the store.
    ///
    /// Stops accepting operations, waits for in-flight appends, flushes and
    /// releases the WAL, stops the background flush thread, releases the
    /// directory lock and drops all records held in memory. Every later call
    /// except `close`, `is_open` and `metrics` fails with `StoreClosed`.
    /// Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let _gate = self.gate.write();

        self.stop_flush_thread();

        let mut result = Ok(());
        if let Some(log) = self.log.write().take() {
            if let Err(e) = log.flush() {
                warn!(target: "streamlog::store", error = %e, "Final WAL flush failed");
                result = Err(e);
            }
        }

        let records = self.committed.len();
        self.committed.clear();

        if let Some(file) = self.lock_file.lock().take() {
            let _ = fs2::FileExt::unlock(&file);
        }

        info!(
            target: "streamlog::store",
            path = ?self.data_dir,
            records,
            "Store closed"
        );

        result
    }

    fn stop_flush_thread(&self) {
        self.flush_shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.flush_handle.lock().take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }

    /// True until `close` is called.
    pub fn is_open(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Data directory, for disk-backed stores.
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Durability mode, for disk-backed stores.
    pub fn durability_mode(&self) -> Option<DurabilityMode> {
        self.durability_mode
    }

    /// Key and payload limits in force.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    fn check_open(&self) -> Result<()> {
        if self.accepting.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StoreClosed)
        }
    }
}

impl Drop for AppendOnlyStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for AppendOnlyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendOnlyStore")
            .field("data_dir", &self.data_dir)
            .field("durability_mode", &self.durability_mode)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

fn acquire_dir_lock(data_dir: &Path) -> Result<File> {
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(data_dir.join(LOCK_FILE_NAME))
        .map_err(|e| Error::storage(format!("failed to open lock file: {}", e)))?;
    fs2::FileExt::try_lock_exclusive(&lock_file).map_err(|_| {
        Error::storage(format!(
            "store at '{}' is already in use by another process",
            data_dir.display()
        ))
    })?;
    Ok(lock_file)
}

fn spawn_flush_thread(
    log: Arc<dyn CommitLog>,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("streamlog-wal-flush".to_string())
        .spawn(move || loop {
            std::thread::park_timeout(interval);
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = log.sync_if_overdue() {
                warn!(target: "streamlog::wal", error = %e, "Background WAL sync failed");
            }
        })
        .map_err(|e| Error::storage(format!("failed to spawn WAL flush thread: {}", e)))
}
