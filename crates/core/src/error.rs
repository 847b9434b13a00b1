//! Error types for streamlog
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Callers usually only care about the broad [`ErrorKind`]: a conflict means
//! "your assumption about the stream was stale, re-read and retry", while a
//! storage failure means "the store itself is broken".

use std::io;
use thiserror::Error;

/// Result type alias for streamlog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the event log
#[derive(Debug, Error)]
pub enum Error {
    /// Expected stream version did not match the actual one at append time
    #[error("Expected version {expected} in stream '{stream}' but got {actual}")]
    ConcurrencyConflict {
        /// Stream the append targeted
        stream: String,
        /// Version the caller expected
        expected: u64,
        /// Version the stream actually had
        actual: u64,
    },

    /// A required argument was missing or out of bounds
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be parsed or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation attempted after `close()`
    #[error("Store is closed")]
    StoreClosed,

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption detected in persisted state
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    StorageError(String),
}

/// Coarse classification of [`Error`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Stale expected version; recoverable by re-reading and retrying
    ConcurrencyConflict,
    /// Bad input; not retryable without fixing the call
    InvalidArgument,
    /// The store has been closed
    StoreClosed,
    /// I/O or durability failure in the storage layer
    StorageFailure,
}

impl Error {
    /// Build an `InvalidArgument` error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Build a `StorageError`
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::StorageError(msg.into())
    }

    /// Build a `Corruption` error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            Error::InvalidArgument(_) | Error::Config(_) => ErrorKind::InvalidArgument,
            Error::StoreClosed => ErrorKind::StoreClosed,
            Error::Io(_) | Error::Corruption(_) | Error::StorageError(_) => {
                ErrorKind::StorageFailure
            }
        }
    }

    /// True if the caller can recover by re-reading the stream and retrying
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::ConcurrencyConflict
    }

    /// True if this error originates from the storage layer
    pub fn is_storage_failure(&self) -> bool {
        self.kind() == ErrorKind::StorageFailure
    }
}
