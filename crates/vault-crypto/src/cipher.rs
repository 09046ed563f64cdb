//! Pluggable schemes for encrypting values at rest
//!
//! Stored fields go through a [`FieldCipher`] so the scheme can be chosen by
//! configuration. Two schemes exist:
//!
//! - [`AesFieldCipher`]: AES-256-EAX, `nonce16 || tag16 || ct`
//! - [`VersionedTokenCipher`]: Fernet tokens carrying their issue time (see
//!   [`crate::versioned`])

use zeroize::{Zeroize, Zeroizing};

use crate::{
    CryptoError, VersionedTokenCipher,
    blind_index::{self, KEY_SIZE, NONCE_SIZE},
};

/// Fresh per-call input for sealing.
#[derive(Clone, Zeroize)]
pub struct Freshness {
    /// Random nonce, used by schemes that take one from the caller
    pub nonce: [u8; NONCE_SIZE],
    /// Current wall-clock time in unix seconds
    pub now_secs: u64,
}

/// Symmetric encryption of a stored value.
pub trait FieldCipher: Send + Sync {
    /// Stable scheme name, used in logs.
    fn scheme(&self) -> &'static str;

    /// Encrypt `plaintext`. Never fails once the cipher is constructed.
    fn seal(&self, plaintext: &[u8], freshness: &Freshness) -> Vec<u8>;

    /// Decrypt a value produced by [`FieldCipher::seal`] under the same key.
    fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// AES-256-EAX field encryption.
#[derive(Clone)]
pub struct AesFieldCipher {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl AesFieldCipher {
    /// Build a cipher from a 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_SIZE] = key
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength { expected: KEY_SIZE, actual: key.len() })?;
        Ok(Self { key: Zeroizing::new(key) })
    }
}

impl FieldCipher for AesFieldCipher {
    fn scheme(&self) -> &'static str {
        "aes-256-eax"
    }

    fn seal(&self, plaintext: &[u8], freshness: &Freshness) -> Vec<u8> {
        let Ok(sealed) = blind_index::authenticated_encrypt(&*self.key, plaintext, &freshness.nonce) else {
            unreachable!("key length is checked at construction");
        };
        sealed
    }

    fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        blind_index::authenticated_decrypt(&*self.key, ciphertext)
    }
}

impl FieldCipher for VersionedTokenCipher {
    fn scheme(&self) -> &'static str {
        "fernet"
    }

    fn seal(&self, plaintext: &[u8], freshness: &Freshness) -> Vec<u8> {
        VersionedTokenCipher::seal(self, plaintext, freshness.now_secs).into_bytes()
    }

    fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let token = std::str::from_utf8(ciphertext)
            .map_err(|e| CryptoError::InvalidEncoding { reason: e.to_string() })?;
        VersionedTokenCipher::open(self, token)
    }
}

impl std::fmt::Debug for AesFieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesFieldCipher").finish_non_exhaustive()
    }
}
