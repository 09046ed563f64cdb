//! Error types for ratchet sessions and payload envelopes

use thiserror::Error;

use crate::CryptoError;

/// Errors from ratchet encryption and decryption.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RatchetError {
    /// Header could not be parsed or refers to a message this session cannot
    /// produce a key for
    #[error("malformed header: {reason}")]
    MalformedHeader {
        /// What was wrong with the header
        reason: String,
    },

    /// Ciphertext or associated data failed authentication
    #[error("message authentication failed")]
    AuthenticationFailure,

    /// Header asks to skip more message keys than allowed in one step
    #[error("too many skipped messages: requested {requested}, limit {limit}")]
    TooManySkipped {
        /// Number of keys the header would require skipping
        requested: u32,
        /// Maximum allowed
        limit: u32,
    },

    /// A chain reached the maximum message index
    #[error("chain exhausted at index {index}")]
    ChainOverflow {
        /// Index at which the chain stopped
        index: u32,
    },

    /// Local key material is unusable
    #[error("key agreement failed: {0}")]
    KeyAgreement(#[source] CryptoError),

    /// Persisted session could not be restored or written
    #[error("corrupted session state: {reason}")]
    CorruptedState {
        /// What went wrong
        reason: String,
    },
}

impl RatchetError {
    /// Whether the session itself is unusable, as opposed to one message
    /// being rejected.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ChainOverflow { .. } | Self::KeyAgreement(_) | Self::CorruptedState { .. })
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedHeader { reason: reason.into() }
    }
}

/// Structural errors in the payload envelope.
///
/// These are raised before any cryptography runs and are kept distinct from
/// [`RatchetError::AuthenticationFailure`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Not valid base64
    #[error("envelope is not valid base64")]
    InvalidEncoding,

    /// Too short to hold the header length prefix
    #[error("envelope truncated: {actual} bytes")]
    Truncated {
        /// Decoded length in bytes
        actual: usize,
    },

    /// Declared header length runs past the end of the envelope
    #[error("header length {declared} exceeds remaining {available} bytes")]
    HeaderOverflow {
        /// Length from the prefix
        declared: usize,
        /// Bytes remaining after the prefix
        available: usize,
    },
}
