//! Ratchet channel
//!
//! Binds a [`RatchetState`] to each entity. The state lives in the entity
//! record, encrypted under the vault key, and is written back only when an
//! operation succeeds.
//!
//! # Session Setup
//!
//! A session starts from the X25519 agreement between the entity's server
//! publish keypair and the client's publish public key. The agreement is
//! recomputed from the stored keys whenever a session has to be created; it
//! is never cached.
//!
//! # Concurrency
//!
//! Operations on one entity are serialized by an in-process lock table
//! striped over entity ids. Across processes, the state write is a
//! compare-and-swap on `state_version`: a concurrent writer surfaces as
//! [`StorageError::Conflict`] and nothing is persisted.
//!
//! # Associated Data
//!
//! Both directions bind the server publish public key as associated data.

use std::sync::{Mutex, MutexGuard, PoisonError};

use base64::{Engine, engine::general_purpose::STANDARD};
use thiserror::Error;
use tracing::{debug, warn};
use vault_crypto::{
    CryptoError, EnvelopeError, Header, Keypair, RatchetEntropy, RatchetError, RatchetState,
    decode_envelope, encode_envelope, keypair::public_key_from_slice,
};

use crate::{
    blind_index::BlindIndex,
    env::Environment,
    model::{Entity, EntityId},
    storage::{EntityStore, StorageError},
};

const LOCK_STRIPES: usize = 64;

/// Channel failures.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Message rejected by the ratchet
    #[error(transparent)]
    Ratchet(#[from] RatchetError),

    /// Stored keys or state could not be decrypted
    #[error("stored key material: {0}")]
    Crypto(#[from] CryptoError),

    /// Repository failure or concurrent state write
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Payload blob is structurally invalid
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Entity lacks a key the channel needs
    #[error("entity has no {what}")]
    MissingState {
        /// Which field is missing
        what: &'static str,
    },

    /// Client publish key is not a usable X25519 public key
    #[error("client publish key is invalid")]
    InvalidClientKey,

    /// Entity disappeared between lookup and use
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
}

impl ChannelError {
    /// Whether the payload itself was bad, as opposed to a server-side failure.
    pub fn is_content_error(&self) -> bool {
        match self {
            Self::Envelope(_) => true,
            Self::Ratchet(err) => !err.is_fatal(),
            _ => false,
        }
    }
}

/// Per-entity Double Ratchet channel.
pub struct RatchetChannel<E: Environment, S: EntityStore> {
    store: S,
    index: BlindIndex<E>,
    env: E,
    locks: Box<[Mutex<()>]>,
}

impl<E: Environment, S: EntityStore> RatchetChannel<E, S> {
    /// Create a channel over `store`.
    pub fn new(store: S, index: BlindIndex<E>, env: E) -> Self {
        let locks = (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect();
        Self { store, index, env, locks }
    }

    /// Encrypt a payload for the entity's client.
    ///
    /// Returns the serialized header and the sealed message.
    pub fn encrypt(&self, entity: &Entity, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), ChannelError> {
        self.with_session(&entity.id, |state, server_public, entropy| {
            let (header, sealed) = state.encrypt(plaintext, server_public, entropy)?;
            Ok((header.to_bytes().to_vec(), sealed))
        })
    }

    /// Decrypt a payload from the entity's client.
    pub fn decrypt(&self, entity: &Entity, header: &[u8], sealed: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let header = Header::from_bytes(header)?;
        self.with_session(&entity.id, |state, server_public, entropy| {
            state.decrypt(&header, sealed, server_public, entropy)
        })
    }

    /// [`Self::encrypt`] packed into a base64 envelope.
    pub fn encrypt_packed(&self, entity: &Entity, plaintext: &[u8]) -> Result<String, ChannelError> {
        let (header, sealed) = self.encrypt(entity, plaintext)?;
        Ok(encode_envelope(&header, &sealed))
    }

    /// [`Self::decrypt`] of a base64 envelope.
    pub fn decrypt_packed(&self, entity: &Entity, blob: &str) -> Result<Vec<u8>, ChannelError> {
        let envelope = decode_envelope(blob)?;
        self.decrypt(entity, &envelope.header, &envelope.ciphertext)
    }

    fn with_session<T>(
        &self,
        id: &EntityId,
        operation: impl FnOnce(&mut RatchetState, &[u8], &RatchetEntropy) -> Result<T, RatchetError>,
    ) -> Result<T, ChannelError> {
        let _guard = self.lock(id);

        let entity = self.store.find_entity(id)?.ok_or(ChannelError::UnknownEntity(*id))?;
        let publish = self.publish_keypair(&entity)?;
        let mut state = self.restore_state(&entity, &publish)?;

        let server_public = publish.public_key();
        let entropy = RatchetEntropy { dh_secret: self.env.random_array(), nonce: self.env.random_array() };
        let output = operation(&mut state, server_public.as_slice(), &entropy).inspect_err(|e| {
            debug!(entity_id = %id, error = %e, "ratchet rejected message");
        })?;

        let sealed = self.index.encrypt(&state.to_bytes()?);
        let version = self.store.swap_server_state(id, entity.state_version, &sealed).inspect_err(|e| {
            warn!(entity_id = %id, error = %e, "ratchet state not persisted");
        })?;
        debug!(entity_id = %id, version, "ratchet state persisted");

        Ok(output)
    }

    fn restore_state(&self, entity: &Entity, publish: &Keypair) -> Result<RatchetState, ChannelError> {
        if let Some(sealed) = &entity.server_state {
            let plaintext = self.index.decrypt(sealed)?;
            return Ok(RatchetState::from_bytes(&plaintext)?);
        }

        let client_key = entity
            .client_publish_pub_key
            .as_deref()
            .ok_or(ChannelError::MissingState { what: "client publish key" })?;
        let client_key = STANDARD.decode(client_key).map_err(|_| ChannelError::InvalidClientKey)?;
        let client_key = public_key_from_slice(&client_key).map_err(|_| ChannelError::InvalidClientKey)?;

        let shared = publish.agree(&client_key).map_err(|_| ChannelError::InvalidClientKey)?;
        debug!(entity_id = %entity.id, "starting ratchet session");
        Ok(RatchetState::new(&shared, publish, client_key))
    }

    fn publish_keypair(&self, entity: &Entity) -> Result<Keypair, ChannelError> {
        let sealed =
            entity.publish_keypair.as_deref().ok_or(ChannelError::MissingState { what: "publish keypair" })?;
        Ok(self.index.decrypt_keypair(sealed)?)
    }

    fn lock(&self, id: &EntityId) -> MutexGuard<'_, ()> {
        let stripe = id.as_bytes().iter().fold(0usize, |acc, byte| acc.wrapping_mul(31) ^ usize::from(*byte));
        self.locks[stripe % self.locks.len()].lock().unwrap_or_else(PoisonError::into_inner)
    }
}
