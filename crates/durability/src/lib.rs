//! Durability layer for streamlog
//!
//! This crate makes committed records survive restarts:
//! - format: segment header and record frame encoding (CRC32 protected)
//! - wal: segmented writer with Always/Standard fsync modes, and a reader
//! - recovery: rebuilds records from the WAL and cuts off torn tails
//!
//! `WalWriter` implements `streamlog_core::CommitLog`, which is how the engine
//! talks to it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format;
pub mod recovery;
pub mod wal;

pub use format::{WalRecordError, WalSegment, MAX_RECORD_CONTENT};
pub use recovery::{recover, RecoveredLog, RecoveryStats};
pub use wal::{DurabilityMode, WalConfig, WalConfigError, WalCounters, WalReader, WalWriter};
