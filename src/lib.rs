//! streamlog - append-only multi-stream event log
//!
//! Records are appended to named streams with optimistic concurrency and get
//! two gap-free versions: one within their stream and one across the whole
//! store. Streams are read back in order, and the store can be read in
//! commit order from any checkpoint.
//!
//! # Quick Start
//!
//! ```no_run
//! use streamlog::{AppendOnlyStore, ExpectedVersion};
//!
//! # fn main() -> streamlog::Result<()> {
//! let store = AppendOnlyStore::open("./data")?;
//!
//! let created = store.append("orders", b"created".to_vec(), ExpectedVersion::NO_STREAM)?;
//! store.append("orders", b"paid".to_vec(), created.stream_version)?;
//!
//! // Projection: consume everything after the last checkpoint
//! let mut checkpoint = 0;
//! for record in store.read_all(checkpoint, 1000)? {
//!     checkpoint = record.store_version();
//! }
//!
//! store.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! Internal layers (allocator, committed set, WAL) live in their own crates;
//! only the store API and its value types are exposed here.

pub use streamlog_core::{
    AppendOutcome, Error, ErrorKind, ExpectedVersion, Limits, Record, Result, MAX_PAYLOAD_SIZE,
    MAX_STREAM_KEY_LEN,
};
pub use streamlog_engine::{
    AppendOnlyStore, DurabilityMode, RecordRange, Records, StoreConfig, StoreMetrics,
    CONFIG_FILE_NAME,
};
