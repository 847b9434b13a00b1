//! Store configuration via `streamlog.toml`
//!
//! On first open, a default `streamlog.toml` is written into the data
//! directory. To change settings, edit the file and reopen the store, or pass
//! a `StoreConfig` to `AppendOnlyStore::open_with_config`, which persists it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use streamlog_core::{Error, Result};
use streamlog_durability::{DurabilityMode, WalConfig};

/// Config file name placed in the store data directory.
pub const CONFIG_FILE_NAME: &str = "streamlog.toml";

/// Store configuration loaded from `streamlog.toml`.
///
/// # Example
///
/// ```toml
/// durability = "always"
/// segment_size = 67108864
/// flush_interval_ms = 100
/// flush_batch_size = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Durability mode: `"always"` or `"standard"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// WAL segment size in bytes.
    #[serde(default = "default_segment_size")]
    pub segment_size: u64,
    /// Background fsync interval for `"standard"` durability.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Appends between fsyncs for `"standard"` durability.
    #[serde(default = "default_flush_batch_size")]
    pub flush_batch_size: usize,
}

fn default_durability_str() -> String {
    "always".to_string()
}

fn default_segment_size() -> u64 {
    WalConfig::default().segment_size
}

fn default_flush_interval_ms() -> u64 {
    100
}

fn default_flush_batch_size() -> usize {
    1000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            durability: default_durability_str(),
            segment_size: default_segment_size(),
            flush_interval_ms: default_flush_interval_ms(),
            flush_batch_size: default_flush_batch_size(),
        }
    }
}

impl StoreConfig {
    /// Config using `"standard"` durability with default thresholds.
    pub fn standard() -> Self {
        Self {
            durability: "standard".to_string(),
            ..Self::default()
        }
    }

    /// Parse the durability string into a `DurabilityMode`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the string is not `"always"` or `"standard"`, or
    /// if a standard-mode threshold is zero.
    pub fn durability_mode(&self) -> Result<DurabilityMode> {
        match self.durability.as_str() {
            "always" => Ok(DurabilityMode::Always),
            "standard" => {
                if self.flush_interval_ms == 0 || self.flush_batch_size == 0 {
                    return Err(Error::Config(
                        "flush_interval_ms and flush_batch_size must be greater than zero"
                            .to_string(),
                    ));
                }
                Ok(DurabilityMode::Standard {
                    interval_ms: self.flush_interval_ms,
                    batch_size: self.flush_batch_size,
                })
            }
            other => Err(Error::Config(format!(
                "Invalid durability mode '{}' in {}. Expected \"always\" or \"standard\".",
                other, CONFIG_FILE_NAME
            ))),
        }
    }

    /// WAL segment settings.
    pub fn wal_config(&self) -> Result<WalConfig> {
        let config = WalConfig::new().with_segment_size(self.segment_size);
        config
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(config)
    }

    /// Check every field.
    pub fn validate(&self) -> Result<()> {
        self.durability_mode()?;
        self.wal_config()?;
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# streamlog store configuration
#
# Durability mode: "always" (default) or "standard"
#   "always"   = fsync before every append returns, zero data loss
#   "standard" = fsync on a background interval or every flush_batch_size
#                appends, may lose the last interval on crash
durability = "always"

# WAL segment size in bytes (default 64 MiB)
segment_size = 67108864

# Only used by "standard" durability
flush_interval_ms = 100
flush_batch_size = 1000
"#
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: StoreConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
