//! Durability mode configuration
//!
//! Controls WAL sync behavior (Always, Standard).

/// Durability mode for WAL operations
///
/// | Mode | fsync | Data Loss Window |
/// |------|-------|-----------------|
/// | Always | Every append (shared by concurrent appends) | Zero |
/// | Standard | Periodic | Up to interval/batch |
///
/// `Always` is the default: an append does not return until its record is on
/// stable storage. `Standard` must be chosen explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// fsync after every append (maximum durability)
    Always,

    /// fsync every N appends OR every T milliseconds
    ///
    /// May lose up to `batch_size` appends or `interval_ms` of data on crash.
    /// A background thread calls `sync_if_overdue()` on the interval.
    Standard {
        /// Maximum time between fsyncs in milliseconds
        interval_ms: u64,
        /// Maximum appends between fsyncs
        batch_size: usize,
    },
}

impl DurabilityMode {
    /// Check if this mode requires immediate fsync on every append
    pub fn requires_immediate_fsync(&self) -> bool {
        matches!(self, DurabilityMode::Always)
    }

    /// Human-readable description of the mode
    pub fn description(&self) -> &'static str {
        match self {
            DurabilityMode::Always => "Always sync (safest, slowest)",
            DurabilityMode::Standard { .. } => "Standard (periodic fsync)",
        }
    }

    /// Standard mode with recommended defaults
    ///
    /// Returns `Standard { interval_ms: 100, batch_size: 1000 }`; whichever
    /// threshold is reached first triggers fsync.
    pub fn standard_default() -> Self {
        DurabilityMode::Standard {
            interval_ms: 100,
            batch_size: 1000,
        }
    }
}

impl Default for DurabilityMode {
    fn default() -> Self {
        DurabilityMode::Always
    }
}
