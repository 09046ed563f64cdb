//! X25519 static keypairs
//!
//! Server-side keypairs are persisted encrypted. The plaintext form that goes
//! into the field cipher is a fixed 65-byte record:
//!
//! ```text
//! format (1, 0x01) || secret (32) || public (32)
//! ```
//!
//! On load the public half is re-derived from the secret and compared with the
//! stored copy, so a record that decrypts but was assembled from mismatched
//! halves is rejected.

use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::CryptoError;

/// Length of an X25519 public key
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Length of an X25519 secret key
pub const SECRET_KEY_SIZE: usize = 32;

/// Length of the serialized keypair record
pub const SERIALIZED_SIZE: usize = 1 + SECRET_KEY_SIZE + PUBLIC_KEY_SIZE;

const FORMAT_VERSION: u8 = 0x01;

/// An X25519 keypair whose secret half is zeroized on drop.
#[derive(Clone)]
pub struct Keypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl Keypair {
    /// Build a keypair from 32 bytes of secret material.
    ///
    /// The caller supplies the randomness; clamping happens inside the scalar
    /// multiplication, so any 32 bytes are a valid secret.
    pub fn from_secret(secret: [u8; SECRET_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(secret);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public half as raw bytes.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Secret half as raw bytes.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_SIZE]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// X25519 agreement with a remote public key.
    ///
    /// Rejects low-order remote keys, which would force an all-zero secret.
    pub fn agree(
        &self,
        remote_public: &[u8; PUBLIC_KEY_SIZE],
    ) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*remote_public));
        if !shared.was_contributory() {
            return Err(CryptoError::NonContributory);
        }
        Ok(Zeroizing::new(shared.to_bytes()))
    }

    /// Serialize into the 65-byte storage record.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut bytes = Zeroizing::new(Vec::with_capacity(SERIALIZED_SIZE));
        bytes.push(FORMAT_VERSION);
        bytes.extend_from_slice(self.secret.as_bytes());
        bytes.extend_from_slice(self.public.as_bytes());
        bytes
    }

    /// Parse a storage record produced by [`Keypair::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SERIALIZED_SIZE {
            return Err(CryptoError::CorruptedKeypair { reason: "unexpected record length" });
        }
        if bytes[0] != FORMAT_VERSION {
            return Err(CryptoError::CorruptedKeypair { reason: "unknown record format" });
        }

        let mut secret = Zeroizing::new([0u8; SECRET_KEY_SIZE]);
        secret.copy_from_slice(&bytes[1..=SECRET_KEY_SIZE]);
        let keypair = Self::from_secret(*secret);

        if keypair.public.as_bytes() != &bytes[1 + SECRET_KEY_SIZE..] {
            return Err(CryptoError::CorruptedKeypair { reason: "public key does not match secret" });
        }

        Ok(keypair)
    }
}

/// Validate the length of a raw public key.
pub fn public_key_from_slice(bytes: &[u8]) -> Result<[u8; PUBLIC_KEY_SIZE], CryptoError> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength { expected: PUBLIC_KEY_SIZE, actual: bytes.len() })
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair").field("public", &hex::encode(self.public.as_bytes())).finish_non_exhaustive()
    }
}
