//! On-disk byte formats for the WAL.
//!
//! Serialization lives here, apart from the writer and reader that decide
//! when segments are opened, rotated, synced, and truncated.

pub mod wal_record;

pub use wal_record::{
    decode_record, encode_record, SegmentHeader, WalRecordError, WalSegment, MAX_RECORD_CONTENT,
    MAX_RECORD_FRAME, SEGMENT_FORMAT_VERSION, SEGMENT_HEADER_SIZE, SEGMENT_MAGIC,
    WAL_RECORD_FORMAT_VERSION,
};
