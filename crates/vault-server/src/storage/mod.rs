//! Storage backends for the vault repository traits
//!
//! - [`MemoryStorage`]: in-process maps, for tests and tooling
//! - [`RedbStorage`]: durable, one write transaction per operation
//! - [`ChaoticStorage`]: wraps another backend and injects failures

mod chaotic;
mod redb;

pub use chaotic::ChaoticStorage;
pub use vault_core::storage::{
    EntityStore, KeypairStore, MemoryStorage, Storage, StorageError, TokenStore,
};

pub use self::redb::RedbStorage;
