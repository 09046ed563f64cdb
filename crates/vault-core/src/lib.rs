//! Vault core components.
//!
//! Composes the primitives in [`vault_crypto`] with persistent records into
//! the four components of the credential vault and the service that exposes
//! them.
//!
//! # Components
//!
//! - [`BlindIndex`]: keyed lookup hashes and encryption of values at rest
//! - [`KeypairLifecycle`]: versioned static keypairs, rotation, export and
//!   self-test
//! - [`RatchetChannel`]: per-entity Double Ratchet sessions with persisted
//!   state
//! - [`TokenAuthority`]: long-lived device tokens
//! - [`VaultService`]: request validation, entity resolution and status
//!   mapping over the components
//!
//! # Determinism
//!
//! Time and randomness come from an [`Environment`]. With a seeded
//! environment and in-memory storage every operation is reproducible, which
//! is how the tests drive ratchet sessions and token expiry.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod authority;
pub mod blind_index;
pub mod channel;
pub mod config;
pub mod env;
pub mod keypairs;
pub mod model;
pub mod service;
pub mod storage;

pub use authority::{AuthError, Claims, TokenAuthority};
pub use blind_index::BlindIndex;
pub use channel::{ChannelError, RatchetChannel};
pub use config::{ConfigError, FieldScheme, VaultConfig, VaultKeys};
pub use env::{Environment, SeededEnv};
pub use keypairs::{KeypairLifecycle, LifecycleError};
pub use model::{Entity, EntityId, KeypairStatus, StaticKeypair, Token, TokenKey};
pub use service::{Code, Status, VaultService};
pub use storage::{EntityStore, KeypairStore, MemoryStorage, Storage, StorageError, TokenStore};
