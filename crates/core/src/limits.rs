//! Size limits for stream keys and payloads
//!
//! Enforced by the engine before an append takes any lock. Violations are
//! reported as [`Error::InvalidArgument`] and never reach the log.

use crate::error::{Error, Result};

/// Default maximum stream key length in bytes
pub const MAX_STREAM_KEY_LEN: usize = 1024;

/// Default maximum payload size in bytes (16MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Size limits for stream keys and payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum stream key length in bytes (default: 1024)
    pub max_stream_key_bytes: usize,

    /// Maximum payload length in bytes (default: 16MB)
    pub max_payload_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_stream_key_bytes: MAX_STREAM_KEY_LEN,
            max_payload_bytes: MAX_PAYLOAD_SIZE,
        }
    }
}

impl Limits {
    /// Create limits with small values for testing
    pub fn with_small_limits() -> Self {
        Limits {
            max_stream_key_bytes: 16,
            max_payload_bytes: 64,
        }
    }

    /// Validate a stream key: non-empty and within the length limit
    pub fn validate_stream_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_argument("stream key must not be empty"));
        }
        if key.len() > self.max_stream_key_bytes {
            return Err(Error::invalid_argument(format!(
                "stream key is {} bytes, limit is {}",
                key.len(),
                self.max_stream_key_bytes
            )));
        }
        Ok(())
    }

    /// Validate a payload length. Empty payloads are allowed.
    pub fn validate_payload(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_payload_bytes {
            return Err(Error::invalid_argument(format!(
                "payload is {} bytes, limit is {}",
                payload.len(),
                self.max_payload_bytes
            )));
        }
        Ok(())
    }
}
