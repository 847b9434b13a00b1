//! Record and version types
//!
//! - `Record`: an immutable committed entry (key, payload, stream and store versions)
//! - `ExpectedVersion`: optimistic concurrency expectation passed to `append`
//! - `VersionPair`: the (stream, store) versions reserved for one append
//! - `AppendOutcome`: what a successful append reports back

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stream version of a stream that has no records yet
pub const EMPTY_STREAM_VERSION: u64 = 0;

/// An immutable committed record
///
/// Records are created only by a successful append and never change
/// afterwards. All fields are read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    key: String,
    payload: Vec<u8>,
    stream_version: u64,
    store_version: u64,
}

impl Record {
    /// Create a record
    pub fn new(
        key: impl Into<String>,
        payload: Vec<u8>,
        stream_version: u64,
        store_version: u64,
    ) -> Self {
        Record {
            key: key.into(),
            payload,
            stream_version,
            store_version,
        }
    }

    /// Stream the record belongs to
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Opaque payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// 1-based position within the stream
    pub fn stream_version(&self) -> u64 {
        self.stream_version
    }

    /// 1-based position within the whole store
    pub fn store_version(&self) -> u64 {
        self.store_version
    }

    /// The version pair this record was committed with
    pub fn versions(&self) -> VersionPair {
        VersionPair {
            stream: self.stream_version,
            store: self.store_version,
        }
    }
}

/// Expected stream version for optimistic concurrency control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// Append without checking the current version
    #[default]
    Any,
    /// Append only if the stream is currently at exactly this version.
    /// `Exact(0)` requires the stream to be empty.
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation that the stream has no records yet
    pub const NO_STREAM: ExpectedVersion = ExpectedVersion::Exact(EMPTY_STREAM_VERSION);

    /// Check an actual stream version against this expectation
    pub fn matches(&self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(expected) => *expected == actual,
        }
    }

    /// The required version, or None for `Any`
    pub fn exact(&self) -> Option<u64> {
        match self {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(expected) => Some(*expected),
        }
    }
}

impl From<u64> for ExpectedVersion {
    fn from(version: u64) -> Self {
        ExpectedVersion::Exact(version)
    }
}

/// Negative values mean "no check", matching the `-1` sentinel of the
/// classic append-only store contract.
impl From<i64> for ExpectedVersion {
    fn from(version: i64) -> Self {
        if version < 0 {
            ExpectedVersion::Any
        } else {
            ExpectedVersion::Exact(version as u64)
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedVersion::Any => write!(f, "any"),
            ExpectedVersion::Exact(v) => write!(f, "{}", v),
        }
    }
}

/// Versions reserved for a single append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionPair {
    /// Next stream-local version
    pub stream: u64,
    /// Next store-wide version
    pub store: u64,
}

/// Result of a successful append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppendOutcome {
    /// Version assigned within the stream
    pub stream_version: u64,
    /// Version assigned within the store
    pub store_version: u64,
}

impl From<VersionPair> for AppendOutcome {
    fn from(pair: VersionPair) -> Self {
        AppendOutcome {
            stream_version: pair.stream,
            store_version: pair.store,
        }
    }
}
