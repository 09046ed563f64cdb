//! Vault RPC service
//!
//! Composes the components into the operations exposed to other services.
//! Every operation validates its request, resolves the calling entity, does
//! its work, and maps failures to a [`Status`]. Callers see fixed messages
//! for authentication and internal failures; the detail is logged.
//!
//! # Entity Resolution
//!
//! Depending on the operation the caller is identified by a long-lived token,
//! a device id, or a phone number (hashed before lookup). When several are
//! present the token wins, then the device id.

mod request;
mod status;

use std::fmt::Display;

use base64::{Engine, engine::general_purpose::STANDARD};
pub use request::{
    DecryptPayloadRequest, DeleteEntityTokenRequest, EncryptPayloadRequest, Field,
    GetEntityAccessTokenRequest, RegisterEntityRequest, RegisteredEntity, Request,
    StoreEntityTokenRequest, UpdateEntityTokenRequest,
};
pub use status::{CONTENT_MESSAGE, Code, INTERNAL_MESSAGE, SESSION_MESSAGE, Status};
use tracing::{error, info, warn};
use vault_crypto::{CryptoError, Keypair, keypair::public_key_from_slice};

use crate::{
    authority::{AuthError, TokenAuthority, derive_device_id},
    blind_index::BlindIndex,
    channel::{ChannelError, RatchetChannel},
    config::VaultConfig,
    env::Environment,
    model::{Entity, EntityId, Token, TokenKey},
    storage::{Storage, StorageError},
};

/// The vault's RPC surface.
pub struct VaultService<E: Environment, S: Storage> {
    config: VaultConfig,
    store: S,
    env: E,
    index: BlindIndex<E>,
    channel: RatchetChannel<E, S>,
    authority: TokenAuthority<E, S>,
}

impl<E: Environment, S: Storage> VaultService<E, S> {
    /// Build the service and its components from `config`.
    pub fn new(config: VaultConfig, store: S, env: E) -> Result<Self, CryptoError> {
        let index = BlindIndex::new(&config.keys, config.field_scheme, env.clone())?;
        let channel = RatchetChannel::new(store.clone(), index.clone(), env.clone());
        let authority = TokenAuthority::new(
            store.clone(),
            index.clone(),
            env.clone(),
            config.issuer.clone(),
            config.token_ttl_secs,
        );
        Ok(Self { config, store, env, index, channel, authority })
    }

    /// The blind index used for lookup hashes and stored values.
    pub fn blind_index(&self) -> &BlindIndex<E> {
        &self.index
    }

    /// The token authority.
    pub fn authority(&self) -> &TokenAuthority<E, S> {
        &self.authority
    }

    /// Store a platform token for the token holder.
    ///
    /// If a token already exists for the account, it is overwritten and
    /// `AlreadyExists` is reported. This also holds when a concurrent request
    /// inserts the same account between the lookup and the insert.
    ///
    /// The account identifier is stored encrypted exactly as given; only its
    /// lookup hash is computed with newlines removed.
    pub fn store_entity_token(&self, request: &StoreEntityTokenRequest) -> Result<String, Status> {
        request.validate()?;
        let entity = self.authenticate(&request.long_lived_token)?;
        let platform = self.supported_platform(&request.platform)?;
        let key = self.token_key(&entity, &platform, &request.account_identifier)?;

        let account_tokens = self.index.encrypt_and_encode(&request.token);

        if self.store.find_token(&key).map_err(|e| internal("token lookup", &e))?.is_some() {
            return Err(self.overwrite_token(&key, &account_tokens, &request.account_identifier));
        }

        let token = Token {
            entity_id: entity.id,
            platform,
            account_identifier_hash: key.account_identifier_hash.clone(),
            account_identifier: self.index.encrypt_and_encode(&request.account_identifier),
            account_tokens,
            date_created: self.env.wall_clock_secs(),
        };
        match self.store.insert_token(&token) {
            Ok(()) => {},
            Err(StorageError::Conflict(_)) => {
                return Err(self.overwrite_token(&key, &token.account_tokens, &request.account_identifier));
            },
            Err(e) => return Err(internal("token insert", &e)),
        }
        info!(entity_id = %entity.id, platform = %token.platform, "token stored");

        Ok("Token stored successfully.".to_string())
    }

    /// Decrypt a payload from the entity's client.
    pub fn decrypt_payload(&self, request: &DecryptPayloadRequest) -> Result<Vec<u8>, Status> {
        request.validate()?;
        let entity = self.resolve_by_device_or_phone(&request.device_id, &request.phone_number)?;

        let plaintext = self
            .channel
            .decrypt_packed(&entity, &request.payload_ciphertext)
            .map_err(|e| channel_status(&entity, &e))?;
        info!(entity_id = %entity.id, "payload decrypted");

        Ok(plaintext)
    }

    /// Encrypt a payload for the entity's client.
    ///
    /// Returns the base64 envelope.
    pub fn encrypt_payload(&self, request: &EncryptPayloadRequest) -> Result<String, Status> {
        request.validate()?;
        let entity = self.resolve_by_device(&request.device_id)?;

        let envelope = self
            .channel
            .encrypt_packed(&entity, request.payload_plaintext.as_bytes())
            .map_err(|e| channel_status(&entity, &e))?;
        info!(entity_id = %entity.id, "payload encrypted");

        Ok(envelope)
    }

    /// Fetch a stored platform token in plaintext.
    pub fn get_entity_access_token(&self, request: &GetEntityAccessTokenRequest) -> Result<String, Status> {
        request.validate()?;
        let entity = if request.long_lived_token.is_empty() {
            self.resolve_by_device_or_phone(&request.device_id, &request.phone_number)?
        } else {
            self.authenticate(&request.long_lived_token)?
        };
        let platform = self.supported_platform(&request.platform)?;
        let key = self.token_key(&entity, &platform, &request.account_identifier)?;

        let token = self.existing_token(&key, request)?;
        let plaintext = self
            .index
            .decrypt_and_decode(&token.account_tokens)
            .map_err(|e| internal("token decrypt", &e))?;
        info!(entity_id = %entity.id, %platform, "token fetched");

        Ok(plaintext.to_string())
    }

    /// Replace a stored platform token.
    ///
    /// The platform is not checked against the supported set, so tokens for
    /// a retired platform can still be refreshed.
    pub fn update_entity_token(&self, request: &UpdateEntityTokenRequest) -> Result<String, Status> {
        request.validate()?;
        let entity = self.resolve_by_device_or_phone(&request.device_id, &request.phone_number)?;
        let platform = request.platform.to_lowercase();
        let key = self.token_key(&entity, &platform, &request.account_identifier)?;

        self.existing_token(&key, request)?;
        self.store
            .update_account_tokens(&key, &self.index.encrypt_and_encode(&request.token))
            .map_err(|e| internal("token update", &e))?;
        info!(entity_id = %entity.id, %platform, "token updated");

        Ok("Token updated successfully.".to_string())
    }

    /// Delete a stored platform token.
    pub fn delete_entity_token(&self, request: &DeleteEntityTokenRequest) -> Result<String, Status> {
        request.validate()?;
        let entity = self.authenticate(&request.long_lived_token)?;
        let platform = self.supported_platform(&request.platform)?;
        let key = self.token_key(&entity, &platform, &request.account_identifier)?;

        self.existing_token(&key, request)?;
        self.store.delete_token(&key).map_err(|e| internal("token delete", &e))?;
        info!(entity_id = %entity.id, %platform, "token deleted");

        Ok("Token deleted successfully.".to_string())
    }

    /// Provision an entity: generate its server keypairs, derive its device
    /// id and issue its long-lived token.
    pub fn register_entity(&self, request: &RegisterEntityRequest) -> Result<RegisteredEntity, Status> {
        request.validate()?;

        let client_publish = decode_public_key(&request.client_publish_pub_key)?;
        let client_device = decode_public_key(&request.client_device_id_pub_key)?;

        let phone_number_hash = self.index.hash(&request.phone_number).map_err(|e| internal("phone hash", &e))?;
        if self
            .store
            .find_entity_by_phone_hash(&phone_number_hash)
            .map_err(|e| internal("entity lookup", &e))?
            .is_some()
        {
            return Err(Status::already_exists("An entity with this phone number already exists."));
        }

        let publish = Keypair::from_secret(self.env.random_array());
        let device = Keypair::from_secret(self.env.random_array());

        publish.agree(&client_publish).map_err(|_| Status::invalid_argument("Invalid client publish public key."))?;
        let device_shared =
            device.agree(&client_device).map_err(|_| Status::invalid_argument("Invalid client device ID public key."))?;
        let device_id = derive_device_id(&device_shared, &phone_number_hash, &request.client_device_id_pub_key);

        let entity = Entity {
            id: EntityId::random(&self.env),
            phone_number_hash,
            device_id: Some(device_id.clone()),
            country_code: self.index.encrypt_and_encode(&request.country_code),
            client_publish_pub_key: Some(request.client_publish_pub_key.clone()),
            client_device_id_pub_key: Some(request.client_device_id_pub_key.clone()),
            publish_keypair: Some(self.index.encrypt(&publish.to_bytes())),
            device_id_keypair: Some(self.index.encrypt(&device.to_bytes())),
            server_state: None,
            state_version: 0,
            is_bridge_enabled: true,
            date_created: self.env.wall_clock_secs(),
        };

        self.store.insert_entity(&entity).map_err(|e| match e {
            StorageError::Conflict(_) => Status::already_exists("An entity with this phone number already exists."),
            other => internal("entity insert", &other),
        })?;

        let long_lived_token = self.authority.issue(&entity).map_err(|e| internal("token issue", &e))?;
        info!(entity_id = %entity.id, "entity registered");

        Ok(RegisteredEntity {
            entity_id: entity.id.to_string(),
            device_id,
            long_lived_token,
            server_publish_pub_key: STANDARD.encode(publish.public_key()),
            server_device_id_pub_key: STANDARD.encode(device.public_key()),
        })
    }

    fn authenticate(&self, long_lived_token: &str) -> Result<Entity, Status> {
        let (_, entity) = self.authority.verify(long_lived_token).map_err(|e| {
            if e.is_unauthenticated() {
                warn!(error = %e, "long-lived token rejected");
            }
            Status::from(e)
        })?;
        Ok(entity)
    }

    fn resolve_by_device_or_phone(&self, device_id: &str, phone_number: &str) -> Result<Entity, Status> {
        if !device_id.is_empty() {
            return self.resolve_by_device(device_id);
        }

        let phone_number_hash = self.index.hash(phone_number).map_err(|e| internal("phone hash", &e))?;
        self.store
            .find_entity_by_phone_hash(&phone_number_hash)
            .map_err(|e| internal("entity lookup", &e))?
            .ok_or_else(|| {
                Status::unauthenticated(
                    "Entity associated with this phone number not found. Please check your phone number and try again.",
                )
            })
    }

    fn resolve_by_device(&self, device_id: &str) -> Result<Entity, Status> {
        self.store.find_entity_by_device_id(device_id).map_err(|e| internal("entity lookup", &e))?.ok_or_else(|| {
            Status::unauthenticated(format!(
                "Entity associated with device ID '{device_id}' not found. Please log in again to obtain a valid device ID."
            ))
        })
    }

    fn supported_platform(&self, platform: &str) -> Result<String, Status> {
        if self.config.supports_platform(platform) {
            Ok(platform.to_lowercase())
        } else {
            Err(Status::unsupported_platform(platform))
        }
    }

    /// Build the lookup key. The account identifier is hashed with newlines
    /// removed.
    fn token_key(&self, entity: &Entity, platform: &str, account_identifier: &str) -> Result<TokenKey, Status> {
        let account_identifier_hash = self
            .index
            .hash(&account_identifier.replace('\n', ""))
            .map_err(|e| internal("account hash", &e))?;
        Ok(TokenKey { entity_id: entity.id, platform: platform.to_string(), account_identifier_hash })
    }

    /// Replace the payload of an existing token and report `AlreadyExists`.
    fn overwrite_token(&self, key: &TokenKey, account_tokens: &str, account_identifier: &str) -> Status {
        if let Err(e) = self.store.update_account_tokens(key, account_tokens) {
            return internal("token overwrite", &e);
        }
        info!(entity_id = %key.entity_id, platform = %key.platform, "token overwritten");
        Status::already_exists(format!(
            "A token is already associated with the account identifier '{account_identifier}'."
        ))
    }

    fn existing_token(&self, key: &TokenKey, request: &impl Request) -> Result<Token, Status> {
        self.store.find_token(key).map_err(|e| internal("token lookup", &e))?.ok_or_else(|| {
            Status::not_found(format!(
                "No token found with account identifier {} for {}",
                request.field(Field::AccountIdentifier),
                request.field(Field::Platform)
            ))
        })
    }
}

fn decode_public_key(encoded: &str) -> Result<[u8; 32], Status> {
    STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| public_key_from_slice(&bytes).ok())
        .ok_or_else(|| Status::invalid_argument("Client public keys must be 32-byte base64 values."))
}

fn channel_status(entity: &Entity, err: &ChannelError) -> Status {
    if err.is_content_error() {
        warn!(entity_id = %entity.id, error = %err, "payload rejected");
        Status::invalid_content()
    } else {
        internal("ratchet channel", err)
    }
}

fn internal(context: &str, err: &impl Display) -> Status {
    error!(context, error = %err, "internal error");
    Status::internal()
}

impl From<AuthError> for Status {
    fn from(err: AuthError) -> Self {
        if err.is_unauthenticated() { Self::session_expired() } else { internal("token verification", &err) }
    }
}
