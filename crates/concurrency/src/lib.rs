//! Concurrency layer for streamlog
//!
//! This crate implements the version allocator:
//! - Per-stream append locks (one committer per stream at a time)
//! - A short sequencing section that issues store versions
//! - A completion step outside it, for waits that must not block other streams
//! - Counters that advance only when the paired write succeeds

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;

pub use allocator::{StreamSlot, VersionAllocator};
