//! Storage layer for streamlog
//!
//! This crate holds the in-memory committed record set:
//! - CommittedLog: per-stream and global append-only indexes
//! - RecordRange / Records: bounded snapshot views and their lazy iterators
//!
//! Nothing here touches disk; the durability crate owns the write-ahead log.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod committed;
pub mod snapshot;

pub use committed::CommittedLog;
pub use snapshot::{RecordRange, Records, SharedRecords};
