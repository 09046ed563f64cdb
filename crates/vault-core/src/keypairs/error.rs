//! Keypair lifecycle errors

use thiserror::Error;
use vault_crypto::CryptoError;

use crate::{model::ParseStatusError, storage::StorageError};

/// Errors from generation, rotation, export and self-test.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Version label does not start with `v`
    #[error("invalid version '{0}': versions must start with 'v', e.g. v1")]
    InvalidVersion(String),

    /// Status text is not a known status
    #[error(transparent)]
    InvalidStatus(#[from] ParseStatusError),

    /// No keypair with this version and id
    #[error("keypair {version}/{kid} not found")]
    NotFound {
        /// Version label
        version: String,
        /// Key id
        kid: u32,
    },

    /// Self-test needs at least two active keypairs
    #[error("self-test needs at least 2 active keypairs, found {available}")]
    InsufficientKeyMaterial {
        /// Active keypairs available
        available: usize,
    },

    /// The two directions of a test agreement produced different secrets
    #[error("key agreement mismatch between {first} and {second}")]
    KeyAgreementMismatch {
        /// First sampled keypair, `version/kid`
        first: String,
        /// Second sampled keypair, `version/kid`
        second: String,
    },

    /// Stored key material could not be decrypted or parsed
    #[error("key material error: {0}")]
    Crypto(#[from] CryptoError),

    /// Repository failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Keystore or export file failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Export encoding failure
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for LifecycleError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LifecycleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
