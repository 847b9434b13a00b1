//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
pub use streamlog::{AppendOnlyStore, Error, ExpectedVersion, Record, StoreConfig};
use tempfile::TempDir;
use tracing_subscriber::filter::LevelFilter;

/// Route store logs to the test harness output. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Store in a temporary directory that can be closed and reopened.
pub struct TestStore {
    pub store: Option<AppendOnlyStore>,
    pub dir: TempDir,
    pub config: StoreConfig,
}

impl TestStore {
    /// Disk-backed store with "always" durability.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Disk-backed store with small segments so tests rotate often.
    pub fn small_segments() -> Self {
        Self::with_config(StoreConfig {
            segment_size: 4096,
            ..StoreConfig::default()
        })
    }

    pub fn with_config(config: StoreConfig) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = AppendOnlyStore::open_with_config(dir.path(), config.clone())
            .expect("Failed to open test store");
        TestStore {
            store: Some(store),
            dir,
            config,
        }
    }

    pub fn store(&self) -> &AppendOnlyStore {
        self.store.as_ref().expect("store is closed")
    }

    /// Close the store, leaving the files in place.
    pub fn close(&mut self) {
        if let Some(store) = self.store.take() {
            store.close().expect("close failed");
        }
    }

    /// Close and open again from the same directory.
    pub fn reopen(&mut self) {
        self.close();
        self.store = Some(AppendOnlyStore::open(self.dir.path()).expect("reopen failed"));
    }

    /// Try to reopen, returning the error instead of panicking.
    pub fn try_reopen(&mut self) -> Result<(), Error> {
        self.close();
        self.store = Some(AppendOnlyStore::open(self.dir.path())?);
        Ok(())
    }

    pub fn wal_dir(&self) -> PathBuf {
        self.dir.path().join("wal")
    }

    /// Path of segment `n`.
    pub fn segment_path(&self, n: u64) -> PathBuf {
        self.wal_dir().join(format!("wal-{:06}.seg", n))
    }

    /// Highest-numbered segment file.
    pub fn last_segment(&self) -> PathBuf {
        let mut segments: Vec<PathBuf> = fs::read_dir(self.wal_dir())
            .expect("wal dir")
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "seg").unwrap_or(false))
            .collect();
        segments.sort();
        segments.pop().expect("no segments")
    }

    pub fn segment_count(&self) -> usize {
        fs::read_dir(self.wal_dir())
            .expect("wal dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".seg"))
            .count()
    }
}

/// Append `count` records to `key`, payloads `"{key}-{i}"`.
pub fn fill(store: &AppendOnlyStore, key: &str, count: usize) {
    for i in 0..count {
        store
            .append(key, format!("{}-{}", key, i).into_bytes(), ExpectedVersion::Any)
            .expect("append failed");
    }
}

/// (key, stream_version, store_version) of every record after `after`.
pub fn all_versions(store: &AppendOnlyStore, after: u64) -> Vec<(String, u64, u64)> {
    store
        .read_all(after, usize::MAX)
        .expect("read_all failed")
        .iter()
        .map(|r| (r.key().to_string(), r.stream_version(), r.store_version()))
        .collect()
}

/// Overwrite bytes at `offset`.
pub fn corrupt_file_at_offset(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .expect("Failed to open file for corruption");
    file.seek(SeekFrom::Start(offset))
        .expect("Failed to seek in file");
    file.write_all(bytes)
        .expect("Failed to write corruption bytes");
}

/// Append raw bytes at the end of a file.
pub fn append_garbage(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .expect("Failed to open file for append");
    file.write_all(bytes).expect("Failed to append bytes");
}

/// Truncate a file to `new_size` bytes.
pub fn truncate_file(path: &Path, new_size: u64) {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .expect("Failed to open file for truncation");
    file.set_len(new_size).expect("Failed to truncate file");
}

/// File size (0 if not found).
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
