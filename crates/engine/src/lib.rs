//! Store engine for streamlog
//!
//! This crate wires the lower layers together:
//! - AppendOnlyStore: open/recover/append/read/close
//! - StoreConfig: `streamlog.toml` settings
//! - StoreMetrics: append counters
//!
//! The engine is the only component that knows about both the allocator
//! and the WAL; neither of those knows about the other.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod metrics;
pub mod store;

pub use metrics::StoreMetrics;
pub use store::{AppendOnlyStore, StoreConfig, CONFIG_FILE_NAME, LOCK_FILE_NAME, WAL_DIR_NAME};

pub use streamlog_durability::{DurabilityMode, RecoveryStats};
pub use streamlog_storage::{RecordRange, Records};
