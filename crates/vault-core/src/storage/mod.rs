//! Storage abstraction for vault records
//!
//! Three repository traits, one per record type. The traits are synchronous
//! and every method is a single atomic operation on the backing store, so
//! read-modify-write sequences (usage counters, ratchet state swaps) happen
//! inside the backend and never race in the caller.
//!
//! # Clone Semantics
//!
//! Implementations share internal state via `Arc`, so clones access the same
//! underlying storage.

mod error;
mod memory;

pub use error::StorageError;
pub use memory::MemoryStorage;

use crate::model::{Entity, EntityId, KeypairStatus, StaticKeypair, Token, TokenKey};

/// Entity persistence.
pub trait EntityStore: Clone + Send + Sync + 'static {
    /// Insert a new entity.
    ///
    /// # Errors
    ///
    /// `Conflict` if the id, phone number hash or device id is already taken.
    fn insert_entity(&self, entity: &Entity) -> Result<(), StorageError>;

    /// Look up an entity by id.
    fn find_entity(&self, id: &EntityId) -> Result<Option<Entity>, StorageError>;

    /// Look up an entity by device id.
    fn find_entity_by_device_id(&self, device_id: &str) -> Result<Option<Entity>, StorageError>;

    /// Look up an entity by phone number hash.
    fn find_entity_by_phone_hash(&self, phone_hash: &str) -> Result<Option<Entity>, StorageError>;

    /// Replace the encrypted ratchet state if the stored version still equals
    /// `expected_version`.
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown entity, `Conflict` if another writer bumped
    /// the version first.
    fn swap_server_state(
        &self,
        id: &EntityId,
        expected_version: u64,
        state: &[u8],
    ) -> Result<u64, StorageError>;
}

/// Platform token persistence.
pub trait TokenStore: Clone + Send + Sync + 'static {
    /// Insert a new token.
    ///
    /// # Errors
    ///
    /// `Conflict` if a token with the same key exists.
    fn insert_token(&self, token: &Token) -> Result<(), StorageError>;

    /// Look up a token by key.
    fn find_token(&self, key: &TokenKey) -> Result<Option<Token>, StorageError>;

    /// All tokens of one entity.
    fn list_tokens(&self, entity_id: &EntityId) -> Result<Vec<Token>, StorageError>;

    /// Replace the encrypted token payload of an existing token.
    ///
    /// # Errors
    ///
    /// `NotFound` if no token has this key.
    fn update_account_tokens(&self, key: &TokenKey, account_tokens: &str) -> Result<(), StorageError>;

    /// Delete a token.
    ///
    /// # Errors
    ///
    /// `NotFound` if no token has this key.
    fn delete_token(&self, key: &TokenKey) -> Result<(), StorageError>;
}

/// Static keypair persistence.
pub trait KeypairStore: Clone + Send + Sync + 'static {
    /// Insert a new keypair row.
    ///
    /// # Errors
    ///
    /// `Conflict` if `(version, kid)` already exists.
    fn insert_keypair(&self, keypair: &StaticKeypair) -> Result<(), StorageError>;

    /// Keypairs, optionally filtered by status, ordered by `(version, kid)`.
    fn list_keypairs(&self, status: Option<KeypairStatus>) -> Result<Vec<StaticKeypair>, StorageError>;

    /// Fetch a keypair and record the use in one atomic step: `usage_count`
    /// is incremented and `date_last_used` set to `now_secs`.
    ///
    /// Returns the updated row, or `None` if it does not exist.
    fn touch_keypair(
        &self,
        version: &str,
        kid: u32,
        now_secs: u64,
    ) -> Result<Option<StaticKeypair>, StorageError>;

    /// Change the status of a keypair.
    ///
    /// # Errors
    ///
    /// `NotFound` if `(version, kid)` does not exist.
    fn set_keypair_status(
        &self,
        version: &str,
        kid: u32,
        status: KeypairStatus,
    ) -> Result<(), StorageError>;
}

/// Everything the service needs from a backend.
pub trait Storage: EntityStore + TokenStore + KeypairStore {}

impl<T: EntityStore + TokenStore + KeypairStore> Storage for T {}
