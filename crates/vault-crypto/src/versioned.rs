//! Versioned, timestamped sealed tokens
//!
//! Tokens use the Fernet format: the version byte and issue time travel in
//! the clear and are covered by the HMAC, so neither can be altered without
//! failing authentication.
//!
//! ```text
//! base64url(
//!   version (1, 0x80) || issued_at (8, BE) || iv (16) || AES-128-CBC ct || HMAC-SHA256 (32)
//! )
//! ```
//!
//! The 32-byte key splits into a 16-byte signing half and a 16-byte
//! encryption half. The IV is drawn from the OS random source on every seal.

use base64::{Engine, engine::general_purpose::URL_SAFE};
use fernet::Fernet;

use crate::CryptoError;

/// Version byte of the current token format
pub const TOKEN_VERSION: u8 = 0x80;

/// Required key length
pub const KEY_SIZE: usize = 32;

/// Tokens issued further than this in the future are rejected.
pub const MAX_CLOCK_SKEW_SECS: u64 = 60;

// version, timestamp, iv, one cipher block, hmac
const MIN_TOKEN_SIZE: usize = 1 + 8 + 16 + 16 + 32;

/// Seals and opens versioned tokens under one 32-byte key.
pub struct VersionedTokenCipher {
    fernet: Fernet,
}

impl VersionedTokenCipher {
    /// Build a cipher from raw key bytes.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let invalid = CryptoError::InvalidKeyLength { expected: KEY_SIZE, actual: key.len() };
        if key.len() != KEY_SIZE {
            return Err(invalid);
        }
        let fernet = Fernet::new(&URL_SAFE.encode(key)).ok_or(invalid)?;
        Ok(Self { fernet })
    }

    /// Seal `plaintext` into a URL-safe token stamped with `issued_at`.
    pub fn seal(&self, plaintext: &[u8], issued_at: u64) -> String {
        self.fernet.encrypt_at_time(plaintext, issued_at)
    }

    /// Open a token without an age check.
    pub fn open(&self, token: &str) -> Result<Vec<u8>, CryptoError> {
        self.open_stamped(token).map(|(_, plaintext)| plaintext)
    }

    /// Open a token and reject it if it is older than `ttl_secs` at `now`.
    pub fn open_with_ttl(&self, token: &str, now: u64, ttl_secs: u64) -> Result<Vec<u8>, CryptoError> {
        let (issued_at, plaintext) = self.open_stamped(token)?;

        if issued_at > now.saturating_add(MAX_CLOCK_SKEW_SECS) {
            return Err(CryptoError::IssuedInFuture { issued_at, now });
        }
        if now.saturating_sub(issued_at) > ttl_secs {
            return Err(CryptoError::Expired { issued_at, ttl_secs, now });
        }

        Ok(plaintext)
    }

    /// Open a token and return its issue time alongside the plaintext.
    pub fn open_stamped(&self, token: &str) -> Result<(u64, Vec<u8>), CryptoError> {
        let raw = URL_SAFE.decode(token).map_err(|e| CryptoError::InvalidEncoding { reason: e.to_string() })?;

        let Some(&version) = raw.first() else {
            return Err(CryptoError::Truncated { minimum: MIN_TOKEN_SIZE, actual: 0 });
        };
        if version != TOKEN_VERSION {
            return Err(CryptoError::UnsupportedVersion(version));
        }
        if raw.len() < MIN_TOKEN_SIZE {
            return Err(CryptoError::Truncated { minimum: MIN_TOKEN_SIZE, actual: raw.len() });
        }

        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(&raw[1..9]);
        let issued_at = u64::from_be_bytes(stamp);

        // Age and skew are judged above; here the token only has to authenticate.
        let plaintext = self
            .fernet
            .decrypt_at_time(token, None, issued_at.saturating_sub(MAX_CLOCK_SKEW_SECS))
            .map_err(|_| CryptoError::AuthenticationFailure)?;

        Ok((issued_at, plaintext))
    }
}

impl std::fmt::Debug for VersionedTokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedTokenCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // key 03*32, issued_at 1000, iv 00..0f, plaintext "payload"
    const PAYLOAD_TOKEN: &str =
        "gAAAAAAAAAPoAAECAwQFBgcICQoLDA0OD9iLOdWQZGUGoOyGAJE8w4jZ1w21hn7iB-6Jpq59bYvU3Ws8zXsI3UBVDsa22WxRcA==";

    // Published Fernet test vector
    const REFERENCE_KEY: &str = "730ff4c7af3d46923e8ed451ee813c87f790b0a226bc96a92de49b5e9c05e1ee";
    const REFERENCE_TOKEN: &str =
        "gAAAAAAdwJ6wAAECAwQFBgcICQoLDA0ODy021cpGVWKZ_eEwCGM4BLLF_5CV9dOPmrhuVUPgJobwOz7JcbmrR64jVmpU4IwqDA==";

    fn cipher() -> VersionedTokenCipher {
        VersionedTokenCipher::new(&[3u8; 32]).unwrap()
    }

    fn reencode(token: &str, edit: impl FnOnce(&mut Vec<u8>)) -> String {
        let mut raw = URL_SAFE.decode(token).unwrap();
        edit(&mut raw);
        URL_SAFE.encode(raw)
    }

    #[test]
    fn opens_reference_vector() {
        let key = hex::decode(REFERENCE_KEY).unwrap();
        let cipher = VersionedTokenCipher::new(&key).unwrap();
        assert_eq!(cipher.open_stamped(REFERENCE_TOKEN).unwrap(), (499_162_800, b"hello".to_vec()));
    }

    #[test]
    fn opens_fixed_token() {
        assert_eq!(cipher().open_stamped(PAYLOAD_TOKEN).unwrap(), (1_000, b"payload".to_vec()));
    }

    #[test]
    fn seal_then_open() {
        let token = cipher().seal(b"payload", 1_000);
        assert_eq!(cipher().open_stamped(&token).unwrap(), (1_000, b"payload".to_vec()));
    }

    #[test]
    fn token_is_url_safe() {
        let token = cipher().seal(&[0xffu8; 64], 1_000);
        assert!(token.starts_with("gAAAAA"));
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '=')));
    }

    #[test]
    fn ttl_boundary() {
        assert_eq!(cipher().open_with_ttl(PAYLOAD_TOKEN, 1_100, 100).unwrap(), b"payload");
        assert_eq!(
            cipher().open_with_ttl(PAYLOAD_TOKEN, 1_101, 100),
            Err(CryptoError::Expired { issued_at: 1_000, ttl_secs: 100, now: 1_101 })
        );
    }

    #[test]
    fn rejects_future_tokens_beyond_skew() {
        let token = cipher().seal(b"x", 10_000);

        assert!(cipher().open_with_ttl(&token, 10_000 - MAX_CLOCK_SKEW_SECS, 5).is_ok());
        assert!(matches!(
            cipher().open_with_ttl(&token, 10_000 - MAX_CLOCK_SKEW_SECS - 1, 5),
            Err(CryptoError::IssuedInFuture { .. })
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let token = reencode(PAYLOAD_TOKEN, |raw| raw[0] = 0x81);
        assert_eq!(cipher().open(&token), Err(CryptoError::UnsupportedVersion(0x81)));
    }

    #[test]
    fn rejects_altered_timestamp() {
        let token = reencode(PAYLOAD_TOKEN, |raw| raw[8] ^= 0x01);
        assert_eq!(cipher().open(&token), Err(CryptoError::AuthenticationFailure));
    }

    #[test]
    fn rejects_other_key() {
        let other = VersionedTokenCipher::new(&[4u8; 32]).unwrap();
        assert_eq!(other.open(PAYLOAD_TOKEN), Err(CryptoError::AuthenticationFailure));
    }

    #[test]
    fn rejects_truncated_token() {
        let token = URL_SAFE.encode([TOKEN_VERSION; 20]);
        assert_eq!(cipher().open(&token), Err(CryptoError::Truncated { minimum: MIN_TOKEN_SIZE, actual: 20 }));
    }

    #[test]
    fn rejects_bad_base64() {
        assert!(matches!(cipher().open("!!!"), Err(CryptoError::InvalidEncoding { .. })));
    }

    #[test]
    fn rejects_short_key() {
        assert!(matches!(
            VersionedTokenCipher::new(&[0u8; 31]),
            Err(CryptoError::InvalidKeyLength { expected: 32, actual: 31 })
        ));
    }
}
