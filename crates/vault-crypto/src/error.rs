//! Error types for primitive operations

use thiserror::Error;

/// Errors from hashing, field encryption, token sealing and key handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Key material has the wrong length
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required length in bytes
        expected: usize,
        /// Length that was supplied
        actual: usize,
    },

    /// Ciphertext is shorter than its fixed-size prefix
    #[error("ciphertext truncated: need at least {minimum} bytes, got {actual}")]
    Truncated {
        /// Minimum length in bytes
        minimum: usize,
        /// Length that was supplied
        actual: usize,
    },

    /// Authentication tag did not verify
    ///
    /// Covers wrong keys, tampered ciphertext and tampered nonces alike.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// Text or binary encoding could not be parsed
    #[error("invalid encoding: {reason}")]
    InvalidEncoding {
        /// What was wrong with the input
        reason: String,
    },

    /// Serialized keypair failed validation
    #[error("corrupted keypair: {reason}")]
    CorruptedKeypair {
        /// Which check failed
        reason: &'static str,
    },

    /// Key agreement produced an all-zero shared secret
    ///
    /// Happens when the remote public key is a low-order point.
    #[error("key agreement was not contributory")]
    NonContributory,

    /// Sealed token carries a version byte this build does not understand
    #[error("unsupported token version 0x{0:02x}")]
    UnsupportedVersion(u8),

    /// Sealed token is older than the allowed time-to-live
    #[error("token expired: issued at {issued_at}, ttl {ttl_secs}s, now {now}")]
    Expired {
        /// Issue time embedded in the token (unix seconds)
        issued_at: u64,
        /// Allowed age in seconds
        ttl_secs: u64,
        /// Time of the check (unix seconds)
        now: u64,
    },

    /// Sealed token claims to be issued in the future
    #[error("token issued in the future: issued at {issued_at}, now {now}")]
    IssuedInFuture {
        /// Issue time embedded in the token (unix seconds)
        issued_at: u64,
        /// Time of the check (unix seconds)
        now: u64,
    },
}
