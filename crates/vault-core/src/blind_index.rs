//! Blind index component
//!
//! Binds the vault keys and the environment to the primitives in
//! [`vault_crypto::blind_index`]: lookup hashes use the hashing key, values at
//! rest use the encryption key under the configured [`FieldScheme`], with a
//! fresh nonce from the environment on every call.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use vault_crypto::{
    AesFieldCipher, CryptoError, FieldCipher, Freshness, Keypair, VersionedTokenCipher,
    constant_time_verify, deterministic_hash,
};
use zeroize::Zeroizing;

use crate::{
    config::{FieldScheme, VaultKeys},
    env::Environment,
};

/// Keyed hashing and encryption of stored fields.
#[derive(Clone)]
pub struct BlindIndex<E: Environment> {
    hashing_key: Zeroizing<[u8; 32]>,
    cipher: Arc<dyn FieldCipher>,
    env: E,
}

impl<E: Environment> BlindIndex<E> {
    /// Build from the vault keys.
    pub fn new(keys: &VaultKeys, scheme: FieldScheme, env: E) -> Result<Self, CryptoError> {
        let cipher: Arc<dyn FieldCipher> = match scheme {
            FieldScheme::Aead => Arc::new(AesFieldCipher::new(keys.encryption_key())?),
            FieldScheme::Versioned => Arc::new(VersionedTokenCipher::new(keys.encryption_key())?),
        };

        Ok(Self { hashing_key: Zeroizing::new(*keys.hashing_key()), cipher, env })
    }

    /// Lookup hash of `value`.
    pub fn hash(&self, value: &str) -> Result<String, CryptoError> {
        deterministic_hash(self.hashing_key.as_slice(), value)
    }

    /// Whether `value` hashes to `expected`, compared in constant time.
    pub fn verify(&self, value: &str, expected: &str) -> Result<bool, CryptoError> {
        constant_time_verify(self.hashing_key.as_slice(), value, expected)
    }

    /// Encrypt a value for storage.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let freshness =
            Freshness { nonce: self.env.random_array(), now_secs: self.env.wall_clock_secs() };
        self.cipher.seal(plaintext, &freshness)
    }

    /// Decrypt a stored value.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        self.cipher.open(ciphertext).map(Zeroizing::new)
    }

    /// Decrypt and parse a stored keypair record.
    pub fn decrypt_keypair(&self, ciphertext: &[u8]) -> Result<Keypair, CryptoError> {
        let plaintext = self.decrypt(ciphertext)?;
        Keypair::from_bytes(&plaintext)
    }

    /// Encrypt text and encode the ciphertext as base64.
    pub fn encrypt_and_encode(&self, plaintext: &str) -> String {
        STANDARD.encode(self.encrypt(plaintext.as_bytes()))
    }

    /// Inverse of [`BlindIndex::encrypt_and_encode`].
    pub fn decrypt_and_decode(&self, encoded: &str) -> Result<Zeroizing<String>, CryptoError> {
        let ciphertext = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidEncoding { reason: e.to_string() })?;
        let plaintext = self.decrypt(&ciphertext)?;
        let text = std::str::from_utf8(&plaintext)
            .map_err(|e| CryptoError::InvalidEncoding { reason: e.to_string() })?;
        Ok(Zeroizing::new(text.to_string()))
    }

    /// Name of the field scheme in use.
    pub fn scheme(&self) -> &'static str {
        self.cipher.scheme()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SeededEnv;

    fn index(scheme: FieldScheme) -> BlindIndex<SeededEnv> {
        let keys = VaultKeys::from_bytes(&[1u8; 32], &[2u8; 32]).unwrap();
        BlindIndex::new(&keys, scheme, SeededEnv::new(5, 1_700_000_000)).unwrap()
    }

    #[test]
    fn hash_uses_hashing_key() {
        let index = index(FieldScheme::Aead);
        assert_eq!(index.hash("+15550100").unwrap(), deterministic_hash(&[1u8; 32], "+15550100").unwrap());
        assert!(index.verify("+15550100", &index.hash("+15550100").unwrap()).unwrap());
    }

    #[test]
    fn encryption_is_randomized() {
        let index = index(FieldScheme::Aead);
        assert_ne!(index.encrypt(b"same"), index.encrypt(b"same"));
    }

    #[test]
    fn text_helpers_roundtrip_under_both_schemes() {
        for scheme in [FieldScheme::Aead, FieldScheme::Versioned] {
            let index = index(scheme);
            let encoded = index.encrypt_and_encode("oauth-token");
            assert_eq!(index.decrypt_and_decode(&encoded).unwrap().as_str(), "oauth-token");
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        let index = index(FieldScheme::Aead);
        assert!(matches!(index.decrypt_and_decode("%%%"), Err(CryptoError::InvalidEncoding { .. })));
        assert!(matches!(
            index.decrypt_and_decode(&STANDARD.encode([0u8; 8])),
            Err(CryptoError::Truncated { .. })
        ));
    }

    #[test]
    fn keypair_records_roundtrip() {
        let index = index(FieldScheme::Versioned);
        let keypair = Keypair::from_secret([7u8; 32]);
        let sealed = index.encrypt(&keypair.to_bytes());
        assert_eq!(index.decrypt_keypair(&sealed).unwrap().public_key(), keypair.public_key());
        assert!(index.decrypt_keypair(&index.encrypt(b"short")).is_err());
    }

    #[test]
    fn scheme_name_reflects_config() {
        assert_eq!(index(FieldScheme::Aead).scheme(), "aes-256-eax");
        assert_eq!(index(FieldScheme::Versioned).scheme(), "fernet");
    }
}
