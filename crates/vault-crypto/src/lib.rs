//! Vault Cryptographic Primitives
//!
//! Cryptographic building blocks for the credential vault. Functions are pure
//! and deterministic given their inputs: callers provide random bytes (nonces,
//! fresh Diffie-Hellman secrets, token timestamps) so every path can be
//! exercised with a seeded environment. Fernet sealing is the exception; its
//! IV comes from the OS random source.
//!
//! # Building Blocks
//!
//! ```text
//! blind_index   HMAC-SHA512 lookup hashes, AES-256-EAX values at rest
//! versioned     Fernet tokens with an issue timestamp (second scheme)
//! keypair       X25519 static keypairs and their storage encoding
//! ratchet       Double Ratchet sessions, headers and the payload envelope
//! ```
//!
//! # Key Lifecycle
//!
//! A ratchet session starts from the X25519 agreement between a server-held
//! keypair and a client's published key. Every DH ratchet step mixes a fresh
//! agreement into the root chain; every message advances a symmetric chain.
//!
//! ```text
//! X25519(server static, client static) = shared secret
//!        │
//!        ▼
//! HKDF(root key, DH output) → root key', chain key
//!        │
//!        ▼
//! HMAC chain ratchet → one-time message keys
//!        │
//!        ▼
//! XChaCha20-Poly1305 → ciphertext
//! ```
//!
//! # Security
//!
//! - Message keys are used once and zeroized on drop
//! - Chain keys are overwritten when advanced
//! - Ratchet operations run on a copy of the session and only replace it on
//!   success, so a rejected message never moves the session forward
//! - Authentication failures are reported without revealing which check failed

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod blind_index;
pub mod cipher;
mod error;
pub mod keypair;
pub mod ratchet;
pub mod versioned;

pub use blind_index::{
    authenticated_decrypt, authenticated_encrypt, constant_time_verify, deterministic_hash,
};
pub use cipher::{AesFieldCipher, FieldCipher, Freshness};
pub use error::CryptoError;
pub use keypair::Keypair;
pub use ratchet::{
    Envelope, EnvelopeError, Header, RatchetEntropy, RatchetError, RatchetState, decode_envelope,
    encode_envelope,
};
pub use versioned::VersionedTokenCipher;
