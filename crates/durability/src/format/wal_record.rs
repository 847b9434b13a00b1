//! WAL segment file and record format.
//!
//! WAL segments are named `wal-NNNNNN.seg` where `NNNNNN` is a zero-padded segment number.
//!
//! # Segment Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ Segment Header (32 bytes)          │
//! ├────────────────────────────────────┤
//! │ Record 1                           │
//! ├────────────────────────────────────┤
//! │ Record 2                           │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```
//!
//! # Record Layout
//!
//! ```text
//! ┌─────────────────┬──────────────────┬─────────────────────────┬──────────┐
//! │ Length (4 bytes)│ Format Ver (1)   │ Body (variable)         │ CRC32 (4)│
//! └─────────────────┴──────────────────┴─────────────────────────┴──────────┘
//!
//! Body:
//! ┌──────────────┬───────────────┬────────────┬─────┬────────────────┬─────────┐
//! │ StoreVer (8) │ StreamVer (8) │ KeyLen (4) │ Key │ PayloadLen (4) │ Payload │
//! └──────────────┴───────────────┴────────────┴─────┴────────────────┴─────────┘
//! ```
//!
//! Length covers everything after the length field, CRC included. The CRC
//! covers format version and body. All integers are little-endian.

use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher;
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use streamlog_core::Record;

/// Magic bytes identifying a WAL segment file: "SLOG"
pub const SEGMENT_MAGIC: [u8; 4] = *b"SLOG";

/// Current segment format version
pub const SEGMENT_FORMAT_VERSION: u32 = 1;

/// Size of segment header in bytes
pub const SEGMENT_HEADER_SIZE: usize = 32;

/// Current WAL record format version
pub const WAL_RECORD_FORMAT_VERSION: u8 = 1;

/// Upper bound on a frame's length field, enforced by both encoder and decoder
pub const MAX_RECORD_FRAME: usize = 64 * 1024 * 1024;

/// Fixed bytes in a record body besides key and payload:
/// version(1) + store(8) + stream(8) + key_len(4) + payload_len(4)
const RECORD_FIXED_BYTES: usize = 25;

/// Largest key + payload size that fits in one frame
pub const MAX_RECORD_CONTENT: usize = MAX_RECORD_FRAME - RECORD_FIXED_BYTES - 4;

/// WAL segment header (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Magic bytes: "SLOG"
    pub magic: [u8; 4],

    /// Format version for forward compatibility
    pub format_version: u32,

    /// Segment number (monotonically increasing)
    pub segment_number: u64,

    /// Store UUID (every segment of one store carries the same value)
    pub store_uuid: [u8; 16],
}

impl SegmentHeader {
    /// Create a new segment header.
    pub fn new(segment_number: u64, store_uuid: [u8; 16]) -> Self {
        SegmentHeader {
            magic: SEGMENT_MAGIC,
            format_version: SEGMENT_FORMAT_VERSION,
            segment_number,
            store_uuid,
        }
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; SEGMENT_HEADER_SIZE] {
        let mut bytes = [0u8; SEGMENT_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.segment_number.to_le_bytes());
        bytes[16..32].copy_from_slice(&self.store_uuid);
        bytes
    }

    /// Deserialize header from bytes.
    pub fn from_bytes(bytes: &[u8; SEGMENT_HEADER_SIZE]) -> Option<Self> {
        Some(SegmentHeader {
            magic: bytes[0..4].try_into().ok()?,
            format_version: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            segment_number: u64::from_le_bytes(bytes[8..16].try_into().ok()?),
            store_uuid: bytes[16..32].try_into().ok()?,
        })
    }

    /// Validate magic bytes and format version.
    pub fn is_valid(&self) -> bool {
        self.magic == SEGMENT_MAGIC && self.format_version == SEGMENT_FORMAT_VERSION
    }
}

/// WAL segment file handle.
///
/// A segment is a single WAL file containing multiple records. The file
/// handle is shared so a sync can run while the segment is being written.
pub struct WalSegment {
    file: Arc<File>,
    segment_number: u64,
    write_position: u64,
    path: PathBuf,
    store_uuid: [u8; 16],
}

impl WalSegment {
    /// Create a new WAL segment and write its header.
    pub fn create(dir: &Path, segment_number: u64, store_uuid: [u8; 16]) -> std::io::Result<Self> {
        let path = Self::segment_path(dir, segment_number);

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .read(true)
            .open(&path)?;

        let header = SegmentHeader::new(segment_number, store_uuid);
        file.write_all(&header.to_bytes())?;
        file.sync_all()?;

        Ok(WalSegment {
            file: Arc::new(file),
            segment_number,
            write_position: SEGMENT_HEADER_SIZE as u64,
            path,
            store_uuid,
        })
    }

    /// Open an existing WAL segment for reading.
    pub fn open_read(dir: &Path, segment_number: u64) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .open(Self::segment_path(dir, segment_number))?;
        Self::from_file(dir, segment_number, file)
    }

    /// Open an existing WAL segment for appending.
    pub fn open_append(dir: &Path, segment_number: u64) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(Self::segment_path(dir, segment_number))?;
        Self::from_file(dir, segment_number, file)
    }

    fn from_file(dir: &Path, segment_number: u64, mut file: File) -> std::io::Result<Self> {
        let mut header_bytes = [0u8; SEGMENT_HEADER_SIZE];
        file.read_exact(&mut header_bytes)?;

        let header = SegmentHeader::from_bytes(&header_bytes)
            .filter(SegmentHeader::is_valid)
            .ok_or_else(|| invalid_data("Invalid segment header"))?;

        if header.segment_number != segment_number {
            return Err(invalid_data(format!(
                "Segment number mismatch: expected {}, got {}",
                segment_number, header.segment_number
            )));
        }

        let write_position = file.seek(SeekFrom::End(0))?;

        Ok(WalSegment {
            file: Arc::new(file),
            segment_number,
            write_position,
            path: Self::segment_path(dir, segment_number),
            store_uuid: header.store_uuid,
        })
    }

    /// Path of segment `segment_number` inside `dir`.
    pub fn segment_path(dir: &Path, segment_number: u64) -> PathBuf {
        dir.join(format!("wal-{:06}.seg", segment_number))
    }

    /// Parse a segment number out of a file name like `wal-000042.seg`.
    pub fn parse_segment_number(file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix("wal-")?
            .strip_suffix(".seg")?
            .parse()
            .ok()
    }

    /// Get segment number.
    pub fn segment_number(&self) -> u64 {
        self.segment_number
    }

    /// Get current segment size in bytes.
    pub fn size(&self) -> u64 {
        self.write_position
    }

    /// Get the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get store UUID.
    pub fn store_uuid(&self) -> [u8; 16] {
        self.store_uuid
    }

    /// True if the segment holds nothing but its header.
    pub fn is_empty(&self) -> bool {
        self.write_position <= SEGMENT_HEADER_SIZE as u64
    }

    /// Write bytes at the end of the segment.
    ///
    /// All-or-nothing: if the write fails part way, the file is cut back to
    /// its previous length so no partial frame is left behind.
    pub fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        let start = self.write_position;
        if let Err(e) = (&*self.file).write_all(data) {
            let _ = self.truncate(start);
            return Err(e);
        }
        self.write_position += data.len() as u64;
        Ok(())
    }

    /// Sync segment data to disk.
    pub fn sync(&self) -> std::io::Result<()> {
        self.file.sync_all()
    }

    /// Shared handle to the segment file, for syncing without `&mut self`.
    pub fn handle(&self) -> Arc<File> {
        Arc::clone(&self.file)
    }

    /// Read everything after the header.
    pub fn read_body(&mut self) -> std::io::Result<Vec<u8>> {
        let mut file = &*self.file;
        file.seek(SeekFrom::Start(SEGMENT_HEADER_SIZE as u64))?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        file.seek(SeekFrom::Start(self.write_position))?;
        Ok(buffer)
    }

    /// Truncate segment at the given position.
    ///
    /// Used by recovery to remove partial records, and by the writer to drop
    /// frames that failed to sync.
    pub fn truncate(&mut self, position: u64) -> std::io::Result<()> {
        let mut file = &*self.file;
        file.set_len(position)?;
        self.write_position = position;
        file.seek(SeekFrom::Start(position))?;
        Ok(())
    }
}

fn invalid_data(msg: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg.into())
}

/// Encode a record as a self-delimiting WAL frame.
///
/// Fails with `RecordTooLarge` when key and payload together exceed
/// [`MAX_RECORD_CONTENT`], since such a frame could never be read back.
pub fn encode_record(record: &Record) -> Result<Vec<u8>, WalRecordError> {
    let key = record.key().as_bytes();
    let payload = record.payload();

    let content = key.len().saturating_add(payload.len());
    if content > MAX_RECORD_CONTENT {
        return Err(WalRecordError::RecordTooLarge {
            size: content,
            max: MAX_RECORD_CONTENT,
        });
    }

    let mut body = Vec::with_capacity(RECORD_FIXED_BYTES + key.len() + payload.len());
    body.push(WAL_RECORD_FORMAT_VERSION);
    body.extend_from_slice(&record.store_version().to_le_bytes());
    body.extend_from_slice(&record.stream_version().to_le_bytes());
    body.extend_from_slice(&(key.len() as u32).to_le_bytes());
    body.extend_from_slice(key);
    body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    body.extend_from_slice(payload);

    let crc = compute_crc(&body);

    let total_len = body.len() + 4;
    let mut frame = Vec::with_capacity(4 + total_len);
    frame.extend_from_slice(&(total_len as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Decode one frame from the front of `bytes`.
///
/// Returns (record, bytes_consumed) on success.
pub fn decode_record(bytes: &[u8]) -> Result<(Record, usize), WalRecordError> {
    if bytes.len() < 4 {
        return Err(WalRecordError::InsufficientData);
    }

    let length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;

    if length < RECORD_FIXED_BYTES + 4 || length > MAX_RECORD_FRAME {
        return Err(WalRecordError::InvalidFormat);
    }
    if bytes.len() < 4 + length {
        return Err(WalRecordError::InsufficientData);
    }

    let framed = &bytes[4..4 + length];
    let (body, crc_bytes) = framed.split_at(length - 4);
    let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

    let computed_crc = compute_crc(body);
    if computed_crc != stored_crc {
        return Err(WalRecordError::ChecksumMismatch {
            expected: stored_crc,
            computed: computed_crc,
        });
    }

    let record = parse_body(body)?;
    Ok((record, 4 + length))
}

fn parse_body(body: &[u8]) -> Result<Record, WalRecordError> {
    let mut cursor = Cursor::new(body);

    let format_version = cursor.read_u8()?;
    if format_version != WAL_RECORD_FORMAT_VERSION {
        return Err(WalRecordError::UnsupportedVersion(format_version));
    }

    let store_version = cursor.read_u64::<LittleEndian>()?;
    let stream_version = cursor.read_u64::<LittleEndian>()?;

    let key_len = cursor.read_u32::<LittleEndian>()? as usize;
    let mut key = vec![0u8; key_len.min(body.len())];
    cursor.read_exact(&mut key)?;
    if key.len() != key_len {
        return Err(WalRecordError::InvalidFormat);
    }
    let key = String::from_utf8(key).map_err(|_| WalRecordError::InvalidFormat)?;

    let payload_len = cursor.read_u32::<LittleEndian>()? as usize;
    let mut payload = vec![0u8; payload_len.min(body.len())];
    cursor.read_exact(&mut payload)?;
    if payload.len() != payload_len || cursor.position() as usize != body.len() {
        return Err(WalRecordError::InvalidFormat);
    }

    if key.is_empty() || stream_version == 0 || store_version == 0 {
        return Err(WalRecordError::InvalidFormat);
    }

    Ok(Record::new(key, payload, stream_version, store_version))
}

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Errors from WAL record parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalRecordError {
    /// Not enough data to parse record
    #[error("Insufficient data to parse record")]
    InsufficientData,

    /// Record format is invalid
    #[error("Invalid record format")]
    InvalidFormat,

    /// Checksum verification failed
    #[error("Checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Expected checksum from record
        expected: u32,
        /// Computed checksum
        computed: u32,
    },

    /// Unsupported format version
    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u8),

    /// Key and payload do not fit in one frame
    #[error("Record of {size} bytes exceeds the frame limit of {max} bytes")]
    RecordTooLarge {
        /// Key plus payload bytes
        size: usize,
        /// Largest key plus payload a frame can hold
        max: usize,
    },
}

impl From<std::io::Error> for WalRecordError {
    // Cursor reads only fail when the body ends early
    fn from(_: std::io::Error) -> Self {
        WalRecordError::InvalidFormat
    }
}
