//! Persisted records
//!
//! Every identifier that could reveal a user is stored as a keyed hash, and
//! every secret or personal value as ciphertext. Nothing here holds plaintext.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::env::Environment;

/// Entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Random (version 4) identifier from environment randomness.
    pub fn random(env: &impl Environment) -> Self {
        Self(uuid::Builder::from_random_bytes(env.random_array()).into_uuid())
    }

    /// Raw 16-byte form, used as a storage key.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Rebuild from the raw 16-byte form.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A registered user's device owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Identifier
    pub id: EntityId,
    /// Keyed hash of the phone number; unique
    pub phone_number_hash: String,
    /// Device identifier; unique when present
    pub device_id: Option<String>,
    /// Encrypted country code, base64
    pub country_code: String,
    /// Client's publish public key, base64
    pub client_publish_pub_key: Option<String>,
    /// Client's device-id public key, base64
    pub client_device_id_pub_key: Option<String>,
    /// Encrypted server publish keypair
    pub publish_keypair: Option<Vec<u8>>,
    /// Encrypted server device-id keypair
    pub device_id_keypair: Option<Vec<u8>>,
    /// Encrypted ratchet state; absent before the first payload exchange
    pub server_state: Option<Vec<u8>>,
    /// Bumped on every `server_state` write
    pub state_version: u64,
    /// Whether bridging is enabled for this entity
    pub is_bridge_enabled: bool,
    /// Creation time, unix seconds
    pub date_created: u64,
}

/// A stored platform credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Owning entity
    pub entity_id: EntityId,
    /// Platform name, lowercase
    pub platform: String,
    /// Keyed hash of the account identifier
    pub account_identifier_hash: String,
    /// Encrypted account identifier, base64
    pub account_identifier: String,
    /// Encrypted platform tokens, base64
    pub account_tokens: String,
    /// Creation time, unix seconds
    pub date_created: u64,
}

/// Lookup key of a [`Token`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    /// Owning entity
    pub entity_id: EntityId,
    /// Platform name, lowercase
    pub platform: String,
    /// Keyed hash of the account identifier
    pub account_identifier_hash: String,
}

impl Token {
    /// Key this token is stored under.
    pub fn key(&self) -> TokenKey {
        TokenKey {
            entity_id: self.entity_id,
            platform: self.platform.clone(),
            account_identifier_hash: self.account_identifier_hash.clone(),
        }
    }
}

/// Lifecycle status of a static keypair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeypairStatus {
    /// Used for agreement, export and self-test
    Active,
    /// Retained but not used
    Inactive,
    /// Retained for history only
    Archived,
}

impl KeypairStatus {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for KeypairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown keypair status text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid keypair status '{0}': expected active, inactive or archived")]
pub struct ParseStatusError(pub String);

impl FromStr for KeypairStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "archived" => Ok(Self::Archived),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// A generated server keypair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticKeypair {
    /// Key id, scoped to `version`
    pub kid: u32,
    /// Generation batch, e.g. `v1`
    pub version: String,
    /// Encrypted serialized keypair
    pub keypair_bytes: Vec<u8>,
    /// Lifecycle status
    pub status: KeypairStatus,
    /// Number of times the keypair was fetched
    pub usage_count: u64,
    /// Last fetch time, unix seconds
    pub date_last_used: Option<u64>,
    /// Creation time, unix seconds
    pub date_created: u64,
}
