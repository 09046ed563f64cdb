//! Vault configuration
//!
//! Built once at startup and passed by reference to every component. Secret
//! keys are held in zeroizing buffers and never appear in `Debug` output.

use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use zeroize::Zeroizing;

/// Length of the hashing and encryption keys.
pub const KEY_SIZE: usize = 32;

/// Default lifetime of a long-lived token: 90 days.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 90 * 24 * 60 * 60;

/// Default issuer claim for long-lived tokens.
pub const DEFAULT_ISSUER: &str = "vault";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key file holds fewer than [`KEY_SIZE`] bytes
    #[error("key file {path} is too short: need {KEY_SIZE} bytes, found {found}")]
    KeyTooShort {
        /// File that was read
        path: PathBuf,
        /// Bytes available
        found: usize,
    },

    /// Key file could not be read
    #[error("failed to read key file {path}: {reason}")]
    KeyUnreadable {
        /// File that was read
        path: PathBuf,
        /// Underlying I/O error
        reason: String,
    },

    /// Supplied key material has the wrong length
    #[error("invalid key length: expected {KEY_SIZE} bytes, got {0}")]
    InvalidKeyLength(usize),
}

/// Scheme used to encrypt values at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldScheme {
    /// AES-256-EAX, `nonce16 || tag16 || ct`
    #[default]
    Aead,
    /// Fernet tokens stamped with their issue time
    Versioned,
}

/// The two symmetric keys every component is built from.
#[derive(Clone)]
pub struct VaultKeys {
    hashing_key: Zeroizing<[u8; KEY_SIZE]>,
    encryption_key: Zeroizing<[u8; KEY_SIZE]>,
}

impl VaultKeys {
    /// Build from raw key bytes; each must be exactly [`KEY_SIZE`] bytes.
    pub fn from_bytes(hashing_key: &[u8], encryption_key: &[u8]) -> Result<Self, ConfigError> {
        Ok(Self { hashing_key: fixed_key(hashing_key)?, encryption_key: fixed_key(encryption_key)? })
    }

    /// Load both keys from files (first [`KEY_SIZE`] bytes of each).
    pub fn load(hashing_key_file: &Path, encryption_key_file: &Path) -> Result<Self, ConfigError> {
        Ok(Self {
            hashing_key: load_key(hashing_key_file)?,
            encryption_key: load_key(encryption_key_file)?,
        })
    }

    /// Key for deterministic lookup hashes.
    pub fn hashing_key(&self) -> &[u8; KEY_SIZE] {
        &self.hashing_key
    }

    /// Key for values encrypted at rest.
    pub fn encryption_key(&self) -> &[u8; KEY_SIZE] {
        &self.encryption_key
    }
}

impl std::fmt::Debug for VaultKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKeys").finish_non_exhaustive()
    }
}

fn fixed_key(bytes: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>, ConfigError> {
    let key: [u8; KEY_SIZE] =
        bytes.try_into().map_err(|_| ConfigError::InvalidKeyLength(bytes.len()))?;
    Ok(Zeroizing::new(key))
}

/// Read the first [`KEY_SIZE`] bytes of a key file.
///
/// Longer files are accepted and truncated; shorter files are an error.
pub fn load_key(path: &Path) -> Result<Zeroizing<[u8; KEY_SIZE]>, ConfigError> {
    let contents = Zeroizing::new(fs::read(path).map_err(|e| ConfigError::KeyUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?);

    if contents.len() < KEY_SIZE {
        return Err(ConfigError::KeyTooShort { path: path.to_path_buf(), found: contents.len() });
    }

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&contents[..KEY_SIZE]);
    Ok(key)
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Hashing and encryption keys
    pub keys: VaultKeys,
    /// Platforms accepted by token operations, compared case-insensitively
    pub supported_platforms: Vec<String>,
    /// Root directory for generated keypair artifacts
    pub keystore_path: PathBuf,
    /// Lifetime of issued long-lived tokens
    pub token_ttl_secs: u64,
    /// Issuer claim written into long-lived tokens
    pub issuer: String,
    /// Scheme for values encrypted at rest
    pub field_scheme: FieldScheme,
}

impl VaultConfig {
    /// Configuration with defaults for everything except the keys.
    pub fn new(keys: VaultKeys) -> Self {
        Self {
            keys,
            supported_platforms: vec!["gmail".to_string(), "twitter".to_string(), "telegram".to_string()],
            keystore_path: PathBuf::from("keystore"),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            issuer: DEFAULT_ISSUER.to_string(),
            field_scheme: FieldScheme::default(),
        }
    }

    /// Whether `platform` is supported, ignoring case.
    pub fn supports_platform(&self, platform: &str) -> bool {
        self.supported_platforms.iter().any(|p| p.eq_ignore_ascii_case(platform))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn load_key_takes_first_32_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("key");
        let mut contents = vec![1u8; KEY_SIZE];
        contents.extend_from_slice(b"\ntrailing");
        fs::write(&path, &contents).unwrap();

        assert_eq!(*load_key(&path).unwrap(), [1u8; KEY_SIZE]);
    }

    #[test]
    fn load_key_rejects_short_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("key");
        fs::write(&path, [0u8; 31]).unwrap();

        assert!(matches!(load_key(&path), Err(ConfigError::KeyTooShort { found: 31, .. })));
    }

    #[test]
    fn load_key_reports_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(load_key(&dir.path().join("absent")), Err(ConfigError::KeyUnreadable { .. })));
    }

    #[test]
    fn keys_require_exact_length() {
        assert!(matches!(VaultKeys::from_bytes(&[0u8; 32], &[0u8; 16]), Err(ConfigError::InvalidKeyLength(16))));
    }

    #[test]
    fn platform_match_ignores_case() {
        let config = VaultConfig::new(VaultKeys::from_bytes(&[0u8; 32], &[1u8; 32]).unwrap());

        assert!(config.supports_platform("Gmail"));
        assert!(!config.supports_platform("myspace"));
    }

    #[test]
    fn debug_hides_keys() {
        let keys = VaultKeys::from_bytes(&[0xaa; 32], &[0xbb; 32]).unwrap();
        assert_eq!(format!("{keys:?}"), "VaultKeys { .. }");
    }
}
