//! Core types and traits for streamlog
//!
//! This crate defines the foundational types used throughout the system:
//! - Record: immutable committed entry with stream and store versions
//! - ExpectedVersion: optimistic concurrency expectation
//! - Limits: stream key and payload size limits
//! - Error: Error type hierarchy
//! - Traits: the `CommitLog` durability seam

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod traits;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use limits::{Limits, MAX_PAYLOAD_SIZE, MAX_STREAM_KEY_LEN};
pub use traits::CommitLog;
pub use types::{AppendOutcome, ExpectedVersion, Record, VersionPair, EMPTY_STREAM_VERSION};
