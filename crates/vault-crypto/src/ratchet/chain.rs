//! Symmetric chain ratchet
//!
//! One sending or receiving chain of the Double Ratchet. Each
//! [`advance()`](ChainKey::advance) derives a one-time message key and
//! replaces the chain key.
//!
//! # Security Properties
//!
//! - Forward Secrecy: old chain keys are overwritten when advancing
//! - Key Uniqueness: each index produces a unique message key
//! - Determinism: the same chain key always produces the same key sequence

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use super::error::RatchetError;

type HmacSha256 = Hmac<Sha256>;

/// Label for deriving the next chain key
const CHAIN_LABEL: &[u8] = b"chain";

/// Label for deriving a message key
const MESSAGE_LABEL: &[u8] = b"message";

/// A one-time key for a single message.
pub struct MessageKey {
    key: [u8; 32],
    index: u32,
}

impl MessageKey {
    pub(crate) fn from_parts(key: [u8; 32], index: u32) -> Self {
        Self { key, index }
    }

    /// 32-byte symmetric key for XChaCha20-Poly1305.
    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    /// Position in the chain this key was derived at.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl Drop for MessageKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Current key and position of one chain.
#[derive(Clone, Serialize, Deserialize)]
pub struct ChainKey {
    key: [u8; 32],
    index: u32,
}

impl ChainKey {
    /// Start a chain at index 0.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key, index: 0 }
    }

    /// Index of the next message key this chain will produce.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Derive the message key for the current index and step the chain.
    pub fn advance(&mut self) -> Result<MessageKey, RatchetError> {
        if self.index == u32::MAX {
            return Err(RatchetError::ChainOverflow { index: self.index });
        }

        let message_key = self.derive(MESSAGE_LABEL);
        let next_chain_key = self.derive(CHAIN_LABEL);

        self.key.zeroize();
        self.key = next_chain_key;

        let index = self.index;
        self.index += 1;

        Ok(MessageKey { key: message_key, index })
    }

    fn derive(&self, label: &[u8]) -> [u8; 32] {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.key) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(label);
        let result = mac.finalize().into_bytes();

        let mut key = [0u8; 32];
        key.copy_from_slice(&result);
        key
    }
}

impl Drop for ChainKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
