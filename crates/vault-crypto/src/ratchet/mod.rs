//! Double Ratchet sessions
//!
//! A Signal-style Double Ratchet over X25519, HKDF-SHA256, an HMAC-SHA256
//! chain ratchet and XChaCha20-Poly1305.
//!
//! # Wire Format
//!
//! ```text
//! header   = ratchet_pub (32) || prev_chain_len (4, BE) || index (4, BE)
//! sealed   = nonce (24) || ciphertext || tag (16)
//! envelope = base64( header_len (4, LE) || header || sealed )
//! ```
//!
//! # Skipped Messages
//!
//! Out-of-order delivery is handled by storing message keys for indices the
//! receiver jumped over. A single step may skip at most
//! [`session::MAX_SKIP`] keys and at most [`session::MAX_STORED_SKIPPED`]
//! keys are retained across chains, oldest evicted first.
//!
//! # Limitations
//!
//! The session has no renegotiation. If both sides send their first message
//! before either receives one, the two chains diverge and every later message
//! fails authentication.

mod chain;
mod derivation;
mod encryption;
mod envelope;
mod error;
mod header;
pub mod session;

pub use chain::{ChainKey, MessageKey};
pub use derivation::derive_root_step;
pub use encryption::{NONCE_SIZE, open_message, seal_message};
pub use envelope::{Envelope, decode_envelope, encode_envelope};
pub use error::{EnvelopeError, RatchetError};
pub use header::{HEADER_SIZE, Header};
pub use session::{RatchetEntropy, RatchetState};
