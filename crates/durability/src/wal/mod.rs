//! Segmented write-ahead log
//!
//! - `mode`: durability modes (Always, Standard)
//! - `config`: segment sizing (WalConfig)
//! - `writer`: appends frames, rotates segments, fsyncs per mode
//! - `reader`: scans segments and classifies torn tails vs corruption

pub mod config;
pub mod mode;
pub mod reader;
pub mod writer;

pub use config::{WalConfig, WalConfigError};
pub use mode::DurabilityMode;
pub use reader::{
    ReadStopReason, SegmentScan, TruncateInfo, WalReadResult, WalReader, WalReaderError,
};
pub use writer::{list_segments, WalCounters, WalWriter};
