//! WAL reader for recovery.
//!
//! Reads every segment in order and classifies where and why reading
//! stopped. Only the last segment may end early, and only with a torn
//! frame; anything else is corruption.

use super::writer::list_segments;
use crate::format::{decode_record, WalRecordError, WalSegment, SEGMENT_HEADER_SIZE};
use std::path::Path;
use streamlog_core::Record;

/// Why reading a segment stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStopReason {
    /// Every byte decoded into a record
    EndOfData,
    /// The trailing bytes are shorter than the frame they announce
    PartialRecord {
        /// Offset of the partial frame within the segment
        offset: u64,
    },
    /// A frame's checksum did not match
    ChecksumMismatch {
        /// Offset of the bad frame within the segment
        offset: u64,
        /// True if the bad frame is the last thing in the segment
        at_tail: bool,
    },
    /// Everything from here to the end of the segment is zero bytes, as a
    /// filesystem leaves an extent that was allocated but never written
    ZeroFilled {
        /// Offset of the first zero byte
        offset: u64,
    },
    /// A frame passed its checksum but could not be parsed
    ParseError {
        /// Offset of the bad frame within the segment
        offset: u64,
        /// Parser error
        detail: String,
    },
}

impl ReadStopReason {
    /// True if the stop can be explained by a crash mid-append.
    pub fn is_torn_tail(&self) -> bool {
        matches!(
            self,
            ReadStopReason::PartialRecord { .. }
                | ReadStopReason::ZeroFilled { .. }
                | ReadStopReason::ChecksumMismatch { at_tail: true, .. }
        )
    }
}

/// Result of scanning a single segment.
#[derive(Debug)]
pub struct SegmentScan {
    /// Segment number
    pub segment_number: u64,
    /// Store UUID from the header
    pub store_uuid: [u8; 16],
    /// Records decoded, in file order
    pub records: Vec<Record>,
    /// Offset just past the last valid frame
    pub valid_end: u64,
    /// File size when scanned
    pub file_size: u64,
    /// Why the scan stopped
    pub stop_reason: ReadStopReason,
}

/// Information about the torn tail to cut off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncateInfo {
    /// Segment to truncate
    pub segment_number: u64,
    /// Length to truncate to
    pub valid_end: u64,
    /// Length before truncation
    pub original_size: u64,
}

impl TruncateInfo {
    /// Bytes that will be discarded.
    pub fn bytes_to_truncate(&self) -> u64 {
        self.original_size - self.valid_end
    }
}

/// Result of reading the whole WAL.
#[derive(Debug, Default)]
pub struct WalReadResult {
    /// All records, in file order
    pub records: Vec<Record>,
    /// Segment numbers read
    pub segments: Vec<u64>,
    /// Store UUID shared by the segments (None when there are none)
    pub store_uuid: Option<[u8; 16]>,
    /// Torn tail to truncate, if any
    pub truncate_info: Option<TruncateInfo>,
    /// Last segment, if it was left with an incomplete header
    pub headerless_segment: Option<u64>,
}

/// WAL reader errors.
#[derive(Debug, thiserror::Error)]
pub enum WalReaderError {
    /// I/O error while reading
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Damage that a crash during append cannot explain
    #[error("Corrupted WAL segment {segment} at offset {offset}: {detail}")]
    Corrupted {
        /// Segment number
        segment: u64,
        /// Offset within the segment
        offset: u64,
        /// Description
        detail: String,
    },

    /// Segments from different stores found in one directory
    #[error("WAL segment {segment} belongs to a different store")]
    StoreMismatch {
        /// Offending segment number
        segment: u64,
    },
}

/// Stateless WAL reader.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalReader;

impl WalReader {
    /// Create a new WAL reader.
    pub fn new() -> Self {
        WalReader
    }

    /// Decode all frames of one segment, stopping at the first bad one.
    pub fn read_segment(
        &self,
        wal_dir: &Path,
        segment_number: u64,
    ) -> Result<SegmentScan, WalReaderError> {
        let mut segment = WalSegment::open_read(wal_dir, segment_number)?;
        let file_size = segment.size();
        let buffer = segment.read_body()?;

        let header = SEGMENT_HEADER_SIZE as u64;
        let mut records = Vec::new();
        let mut offset = 0usize;
        let mut stop_reason = ReadStopReason::EndOfData;

        while offset < buffer.len() {
            let at = header + offset as u64;
            match decode_record(&buffer[offset..]) {
                Ok((record, consumed)) => {
                    records.push(record);
                    offset += consumed;
                }
                Err(_) if buffer[offset..].iter().all(|&b| b == 0) => {
                    stop_reason = ReadStopReason::ZeroFilled { offset: at };
                    break;
                }
                Err(WalRecordError::InsufficientData) => {
                    stop_reason = ReadStopReason::PartialRecord { offset: at };
                    break;
                }
                Err(WalRecordError::ChecksumMismatch { .. }) => {
                    let remaining = &buffer[offset..];
                    let frame_len = 4 + u32::from_le_bytes([
                        remaining[0],
                        remaining[1],
                        remaining[2],
                        remaining[3],
                    ]) as usize;
                    stop_reason = ReadStopReason::ChecksumMismatch {
                        offset: at,
                        at_tail: frame_len == remaining.len(),
                    };
                    break;
                }
                Err(e) => {
                    stop_reason = ReadStopReason::ParseError {
                        offset: at,
                        detail: e.to_string(),
                    };
                    break;
                }
            }
        }

        Ok(SegmentScan {
            segment_number,
            store_uuid: segment.store_uuid(),
            records,
            valid_end: header + offset as u64,
            file_size,
            stop_reason,
        })
    }

    /// Read all records from all segments in `wal_dir`.
    ///
    /// A torn tail on the last segment is reported through `truncate_info`
    /// (nothing is modified here). Any other early stop is an error.
    pub fn read_all(&self, wal_dir: &Path) -> Result<WalReadResult, WalReaderError> {
        let mut segments = list_segments(wal_dir)?;
        let mut result = WalReadResult::default();

        // A crash while creating a segment can leave a file shorter than its header
        if let Some(&last) = segments.last() {
            let len = std::fs::metadata(WalSegment::segment_path(wal_dir, last))?.len();
            if len < SEGMENT_HEADER_SIZE as u64 {
                result.headerless_segment = Some(last);
                segments.pop();
            }
        }

        let count = segments.len();
        for (idx, &segment_number) in segments.iter().enumerate() {
            let scan = self.read_segment(wal_dir, segment_number)?;

            match result.store_uuid {
                None => result.store_uuid = Some(scan.store_uuid),
                Some(uuid) if uuid != scan.store_uuid => {
                    return Err(WalReaderError::StoreMismatch {
                        segment: segment_number,
                    });
                }
                Some(_) => {}
            }

            let is_last = idx + 1 == count;
            match &scan.stop_reason {
                ReadStopReason::EndOfData => {}
                reason if is_last && reason.is_torn_tail() => {
                    result.truncate_info = Some(TruncateInfo {
                        segment_number,
                        valid_end: scan.valid_end,
                        original_size: scan.file_size,
                    });
                }
                reason => {
                    return Err(WalReaderError::Corrupted {
                        segment: segment_number,
                        offset: scan.valid_end,
                        detail: describe(reason),
                    });
                }
            }

            result.records.extend(scan.records);
        }

        result.segments = segments;
        Ok(result)
    }
}

fn describe(reason: &ReadStopReason) -> String {
    match reason {
        ReadStopReason::EndOfData => "end of data".to_string(),
        ReadStopReason::PartialRecord { .. } => "incomplete record".to_string(),
        ReadStopReason::ChecksumMismatch { .. } => "checksum mismatch".to_string(),
        ReadStopReason::ZeroFilled { .. } => "zero-filled data".to_string(),
        ReadStopReason::ParseError { detail, .. } => detail.clone(),
    }
}
