//! WAL recovery
//!
//! Recovery algorithm:
//! 1. Read every segment in order
//! 2. Cut a torn frame off the tail of the last segment
//! 3. Check that store versions run 1..=N and each stream runs 1..=M
//! 4. Hand back the records, the store UUID and the per-stream heads
//!
//! # Recovery Properties
//!
//! - **Deterministic**: Same files -> same records
//! - **Idempotent**: Recovering twice yields the same result
//! - **Atomic**: Either fully recovers or fails without touching memory state

use std::collections::HashMap;
use std::path::Path;

use streamlog_core::{Error, Record, Result};
use tracing::{info, warn};

use crate::format::WalSegment;
use crate::wal::{WalReader, WalReaderError};

/// Counters describing one recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Segments read
    pub segments_read: usize,
    /// Records recovered
    pub records_recovered: usize,
    /// Distinct streams seen
    pub streams_recovered: usize,
    /// Bytes discarded from a torn tail
    pub bytes_truncated: u64,
    /// True if a headerless trailing segment was removed
    pub removed_empty_segment: bool,
}

/// Everything recovered from the WAL
#[derive(Debug, Default)]
pub struct RecoveredLog {
    /// Records in store-version order
    pub records: Vec<Record>,
    /// UUID shared by the segments, or None for an empty WAL
    pub store_uuid: Option<[u8; 16]>,
    /// Last stream version of each stream
    pub stream_heads: HashMap<String, u64>,
    /// Recovery counters
    pub stats: RecoveryStats,
}

impl RecoveredLog {
    /// Highest store version recovered (0 if none)
    pub fn store_version(&self) -> u64 {
        self.records.len() as u64
    }
}

/// Rebuild committed records from the WAL in `wal_dir`.
///
/// Truncates a torn tail in place so the writer can append after it. Fails
/// with `Corruption` for any damage a crash during append cannot explain.
pub fn recover(wal_dir: &Path) -> Result<RecoveredLog> {
    let read = WalReader::new().read_all(wal_dir).map_err(reader_error)?;

    let mut stats = RecoveryStats {
        segments_read: read.segments.len(),
        ..RecoveryStats::default()
    };

    if let Some(segment) = read.headerless_segment {
        warn!(
            target: "streamlog::recovery",
            segment,
            "removing WAL segment with incomplete header"
        );
        std::fs::remove_file(WalSegment::segment_path(wal_dir, segment))?;
        stats.removed_empty_segment = true;
    }

    if let Some(info) = &read.truncate_info {
        warn!(
            target: "streamlog::recovery",
            segment = info.segment_number,
            valid_end = info.valid_end,
            bytes = info.bytes_to_truncate(),
            "truncating torn WAL tail"
        );
        let mut segment = WalSegment::open_append(wal_dir, info.segment_number)?;
        segment.truncate(info.valid_end)?;
        segment.sync()?;
        stats.bytes_truncated = info.bytes_to_truncate();
    }

    let stream_heads = check_version_sequences(&read.records)?;

    stats.records_recovered = read.records.len();
    stats.streams_recovered = stream_heads.len();

    info!(
        target: "streamlog::recovery",
        segments = stats.segments_read,
        records = stats.records_recovered,
        streams = stats.streams_recovered,
        truncated = stats.bytes_truncated,
        "WAL recovery complete"
    );

    Ok(RecoveredLog {
        records: read.records,
        store_uuid: read.store_uuid,
        stream_heads,
        stats,
    })
}

fn check_version_sequences(records: &[Record]) -> Result<HashMap<String, u64>> {
    let mut heads: HashMap<String, u64> = HashMap::new();

    for (i, record) in records.iter().enumerate() {
        let expected_store = i as u64 + 1;
        if record.store_version() != expected_store {
            return Err(Error::corruption(format!(
                "WAL store version {} found where {} was expected",
                record.store_version(),
                expected_store
            )));
        }

        let head = heads.entry(record.key().to_string()).or_insert(0);
        if record.stream_version() != *head + 1 {
            return Err(Error::corruption(format!(
                "WAL stream '{}' jumps from version {} to {}",
                record.key(),
                head,
                record.stream_version()
            )));
        }
        *head = record.stream_version();
    }

    Ok(heads)
}

fn reader_error(e: WalReaderError) -> Error {
    match e {
        WalReaderError::Io(e) => Error::Io(e),
        other => Error::corruption(other.to_string()),
    }
}
