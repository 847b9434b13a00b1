//! WAL configuration.

/// WAL configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalConfig {
    /// Maximum segment size in bytes (default: 64MB).
    ///
    /// When the next record would push the active segment past this size,
    /// the writer rotates to a new segment. A record larger than the limit
    /// still gets written, alone, into a fresh segment.
    pub segment_size: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        WalConfig {
            segment_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

impl WalConfig {
    /// Create a new WAL configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set segment size (builder pattern).
    pub fn with_segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), WalConfigError> {
        if self.segment_size < 1024 {
            return Err(WalConfigError::SegmentSizeTooSmall);
        }
        Ok(())
    }

    /// Create a configuration optimized for testing (small segments).
    pub fn for_testing() -> Self {
        WalConfig {
            segment_size: 4 * 1024, // 4KB for frequent rotation in tests
        }
    }
}

/// WAL configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalConfigError {
    /// Segment size is too small (minimum 1KB).
    #[error("Segment size must be at least 1KB")]
    SegmentSizeTooSmall,
}
