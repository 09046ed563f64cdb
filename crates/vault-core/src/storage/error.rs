//! Storage error types.
//!
//! - `NotFound`: the record to update or delete does not exist
//! - `Conflict`: a uniqueness constraint or version check failed
//! - `Serialization`: failed to encode/decode a record
//! - `Io`: underlying storage system errors

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness or optimistic-version conflict
    ///
    /// Raised when inserting a duplicate entity, token or keypair, and when a
    /// ratchet state write carries a stale `state_version`.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, poisoned lock)
    #[error("I/O error: {0}")]
    Io(String),
}

impl StorageError {
    /// Whether retrying the same operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Conflict(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
