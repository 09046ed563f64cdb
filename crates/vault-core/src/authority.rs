//! Long-lived token authority
//!
//! A long-lived token proves that a request comes from the device an entity
//! enrolled. Its key material is the X25519 agreement between the entity's
//! server device-id keypair and the client's device-id public key, so only
//! that device and this server can mint or check it.
//!
//! # Token Format
//!
//! ```text
//! <entity_id> ":" <body>
//!
//! body    = versioned_seal(seal_key, claims_b64 "." tag_b64)
//! tag     = HMAC-SHA256(sign_key, claims_b64)
//! claims  = {"eid", "iss", "iat", "exp"} as JSON, base64url
//!
//! seal_key = HKDF-SHA256(device shared secret, "llt-seal")
//! sign_key = HKDF-SHA256(device shared secret, "llt-sign")
//! ```
//!
//! The entity id in the clear only selects which key to try. The id inside
//! the signed claims must match it.

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, warn};
use vault_crypto::{VersionedTokenCipher, keypair::public_key_from_slice};
use zeroize::Zeroizing;

use crate::{
    blind_index::BlindIndex,
    env::Environment,
    model::{Entity, EntityId},
    storage::{EntityStore, StorageError},
};

type HmacSha256 = Hmac<Sha256>;

const SEAL_LABEL: &[u8] = b"llt-seal";
const SIGN_LABEL: &[u8] = b"llt-sign";

/// Signed claims carried by a long-lived token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Entity id
    pub eid: String,
    /// Issuer
    pub iss: String,
    /// Issued at, unix seconds
    pub iat: u64,
    /// Expires at, unix seconds
    pub exp: u64,
}

/// Token verification failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token is not in the expected shape, or the entity's device keys are
    /// unusable
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Body did not decrypt or the tag did not verify
    #[error("invalid token signature")]
    InvalidSignature,

    /// Claims are past their expiry
    #[error("token expired at {exp}, now {now}")]
    Expired {
        /// Expiry claim
        exp: u64,
        /// Time of the check
        now: u64,
    },

    /// Signed entity id differs from the id in the clear
    #[error("token identity mismatch: presented {outer}, signed {inner}")]
    IdentityMismatch {
        /// Id before the separator
        outer: String,
        /// Id inside the claims
        inner: String,
    },

    /// No entity with the presented id
    #[error("unknown entity {0}")]
    UnknownEntity(String),

    /// Repository failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AuthError {
    /// Whether the caller should be told to re-authenticate, as opposed to an
    /// internal failure.
    pub fn is_unauthenticated(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

/// Issues and verifies long-lived tokens.
pub struct TokenAuthority<E: Environment, S: EntityStore> {
    store: S,
    index: BlindIndex<E>,
    env: E,
    issuer: String,
    ttl_secs: u64,
}

impl<E: Environment, S: EntityStore> TokenAuthority<E, S> {
    /// Create an authority issuing tokens as `issuer`, valid for `ttl_secs`.
    pub fn new(store: S, index: BlindIndex<E>, env: E, issuer: impl Into<String>, ttl_secs: u64) -> Self {
        Self { store, index, env, issuer: issuer.into(), ttl_secs }
    }

    /// Issue a token for an enrolled entity.
    pub fn issue(&self, entity: &Entity) -> Result<String, AuthError> {
        let now = self.env.wall_clock_secs();
        let claims = Claims {
            eid: entity.id.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        };
        let body = self.seal_claims(entity, &claims)?;
        Ok(format!("{}:{body}", entity.id))
    }

    /// Sign and seal `claims` under `entity`'s device keys.
    ///
    /// Returns the body only; [`Self::issue`] prefixes the entity id.
    pub fn seal_claims(&self, entity: &Entity, claims: &Claims) -> Result<String, AuthError> {
        let keys = self.token_keys(entity)?;

        let json = serde_json::to_vec(claims).map_err(|e| AuthError::MalformedToken(e.to_string()))?;
        let claims_b64 = URL_SAFE_NO_PAD.encode(json);
        let tag = sign(&keys.sign, &claims_b64).finalize().into_bytes();
        let compact = format!("{claims_b64}.{}", URL_SAFE_NO_PAD.encode(tag));

        Ok(keys.seal.seal(compact.as_bytes(), claims.iat))
    }

    /// Verify a token and return its claims and entity.
    pub fn verify(&self, token: &str) -> Result<(Claims, Entity), AuthError> {
        let (outer, body) = token
            .split_once(':')
            .ok_or_else(|| AuthError::MalformedToken("missing entity separator".to_string()))?;

        let entity = outer
            .parse::<EntityId>()
            .ok()
            .map(|id| self.store.find_entity(&id))
            .transpose()?
            .flatten()
            .ok_or_else(|| AuthError::UnknownEntity(outer.to_string()))?;

        let keys = self.token_keys(&entity)?;

        let compact = keys.seal.open(body).map_err(|e| {
            debug!(entity_id = %entity.id, error = %e, "token body did not open");
            AuthError::InvalidSignature
        })?;
        let compact = std::str::from_utf8(&compact).map_err(|_| AuthError::InvalidSignature)?;
        let (claims_b64, tag_b64) = compact
            .split_once('.')
            .ok_or_else(|| AuthError::MalformedToken("missing signature separator".to_string()))?;

        let tag = URL_SAFE_NO_PAD.decode(tag_b64).map_err(|_| AuthError::InvalidSignature)?;
        sign(&keys.sign, claims_b64).verify_slice(&tag).map_err(|_| AuthError::InvalidSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|e| AuthError::MalformedToken(format!("claims encoding: {e}")))?;
        let claims: Claims = serde_json::from_slice(&json)
            .map_err(|e| AuthError::MalformedToken(format!("claims: {e}")))?;

        let now = self.env.wall_clock_secs();
        if now >= claims.exp {
            return Err(AuthError::Expired { exp: claims.exp, now });
        }

        if claims.eid != outer {
            warn!(outer, inner = %claims.eid, "token identity mismatch");
            return Err(AuthError::IdentityMismatch { outer: outer.to_string(), inner: claims.eid });
        }

        Ok((claims, entity))
    }

    fn token_keys(&self, entity: &Entity) -> Result<TokenKeys, AuthError> {
        let shared = device_shared_secret(&self.index, entity)
            .map_err(|reason| AuthError::MalformedToken(reason.to_string()))?;
        TokenKeys::derive(&shared)
    }
}

struct TokenKeys {
    seal: VersionedTokenCipher,
    sign: Zeroizing<[u8; 32]>,
}

impl TokenKeys {
    fn derive(shared: &[u8; 32]) -> Result<Self, AuthError> {
        let hkdf = Hkdf::<Sha256>::new(None, shared);

        let mut seal_key = Zeroizing::new([0u8; 32]);
        let mut sign_key = Zeroizing::new([0u8; 32]);
        let Ok(()) = hkdf.expand(SEAL_LABEL, seal_key.as_mut_slice()) else {
            unreachable!("32 bytes is a valid HKDF-SHA256 output length");
        };
        let Ok(()) = hkdf.expand(SIGN_LABEL, sign_key.as_mut_slice()) else {
            unreachable!("32 bytes is a valid HKDF-SHA256 output length");
        };

        let seal = VersionedTokenCipher::new(seal_key.as_slice())
            .map_err(|e| AuthError::MalformedToken(e.to_string()))?;
        Ok(Self { seal, sign: sign_key })
    }
}

fn sign(key: &[u8; 32], message: &str) -> HmacSha256 {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(message.as_bytes());
    mac
}

/// X25519 agreement between the entity's server device-id keypair and the
/// client's device-id public key.
pub(crate) fn device_shared_secret<E: Environment>(
    index: &BlindIndex<E>,
    entity: &Entity,
) -> Result<Zeroizing<[u8; 32]>, &'static str> {
    let sealed = entity.device_id_keypair.as_deref().ok_or("entity has no device keypair")?;
    let keypair = index.decrypt_keypair(sealed).map_err(|_| "device keypair does not decrypt")?;

    let client_key = entity.client_device_id_pub_key.as_deref().ok_or("entity has no client device key")?;
    let client_key = STANDARD.decode(client_key).map_err(|_| "client device key is not base64")?;
    let client_key = public_key_from_slice(&client_key).map_err(|_| "client device key has wrong length")?;

    keypair.agree(&client_key).map_err(|_| "client device key is not a valid public key")
}

/// Device identifier: hex HMAC-SHA256 keyed by the device shared secret over
/// the phone number hash followed by the client's device-id public key
/// (base64 text).
pub fn derive_device_id(shared: &[u8; 32], phone_number_hash: &str, client_device_pub_key: &str) -> String {
    let mut mac = sign(shared, phone_number_hash);
    mac.update(client_device_pub_key.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use vault_crypto::Keypair;

    use super::*;
    use crate::{
        config::{FieldScheme, VaultKeys},
        env::SeededEnv,
        storage::MemoryStorage,
    };

    const NOW: u64 = 1_700_000_000;

    struct Fixture {
        env: SeededEnv,
        store: MemoryStorage,
        index: BlindIndex<SeededEnv>,
        authority: TokenAuthority<SeededEnv, MemoryStorage>,
    }

    fn fixture() -> Fixture {
        let env = SeededEnv::new(9, NOW);
        let keys = VaultKeys::from_bytes(&[1u8; 32], &[2u8; 32]).unwrap();
        let index = BlindIndex::new(&keys, FieldScheme::Aead, env.clone()).unwrap();
        let store = MemoryStorage::new();
        let authority = TokenAuthority::new(store.clone(), index.clone(), env.clone(), "vault", 3_600);
        Fixture { env, store, index, authority }
    }

    fn enroll(fixture: &Fixture, phone: &str) -> Entity {
        let server_device = Keypair::from_secret(fixture.env.random_array());
        let client_device = Keypair::from_secret(fixture.env.random_array());
        let entity = Entity {
            id: EntityId::random(&fixture.env),
            phone_number_hash: phone.to_string(),
            device_id: None,
            country_code: String::new(),
            client_publish_pub_key: None,
            client_device_id_pub_key: Some(STANDARD.encode(client_device.public_key())),
            publish_keypair: None,
            device_id_keypair: Some(fixture.index.encrypt(&server_device.to_bytes())),
            server_state: None,
            state_version: 0,
            is_bridge_enabled: true,
            date_created: NOW,
        };
        fixture.store.insert_entity(&entity).unwrap();
        entity
    }

    #[test]
    fn issued_token_verifies() {
        let fixture = fixture();
        let entity = enroll(&fixture, "p1");

        let token = fixture.authority.issue(&entity).unwrap();
        assert!(token.starts_with(&format!("{}:", entity.id)));

        let (claims, verified) = fixture.authority.verify(&token).unwrap();
        assert_eq!(verified.id, entity.id);
        assert_eq!(claims.iss, "vault");
        assert_eq!(claims.exp, NOW + 3_600);
    }

    #[test]
    fn expired_token_is_rejected() {
        let fixture = fixture();
        let entity = enroll(&fixture, "p1");
        let token = fixture.authority.issue(&entity).unwrap();

        fixture.env.advance_clock(3_600);
        assert!(matches!(fixture.authority.verify(&token), Err(AuthError::Expired { .. })));
    }

    #[test]
    fn missing_separator_is_malformed() {
        let fixture = fixture();
        assert!(matches!(fixture.authority.verify("no-separator"), Err(AuthError::MalformedToken(_))));
    }

    #[test]
    fn unknown_entity_is_reported() {
        let fixture = fixture();
        assert!(matches!(fixture.authority.verify("not-a-uuid:body"), Err(AuthError::UnknownEntity(_))));

        let stranger = EntityId::random(&fixture.env);
        assert!(matches!(
            fixture.authority.verify(&format!("{stranger}:body")),
            Err(AuthError::UnknownEntity(_))
        ));
    }

    #[test]
    fn swapped_prefix_fails_signature() {
        let fixture = fixture();
        let first = enroll(&fixture, "p1");
        let second = enroll(&fixture, "p2");

        let token = fixture.authority.issue(&second).unwrap();
        let (_, body) = token.split_once(':').unwrap();

        let forged = format!("{}:{body}", first.id);
        assert!(matches!(fixture.authority.verify(&forged), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn signed_claims_for_other_entity_mismatch() {
        let fixture = fixture();
        let first = enroll(&fixture, "p1");
        let second = enroll(&fixture, "p2");

        let claims = Claims { eid: second.id.to_string(), iss: "vault".to_string(), iat: NOW, exp: NOW + 60 };
        let body = fixture.authority.seal_claims(&first, &claims).unwrap();

        let result = fixture.authority.verify(&format!("{}:{body}", first.id));
        assert!(matches!(result, Err(AuthError::IdentityMismatch { .. })));
    }

    #[test]
    fn tampered_body_fails_signature() {
        let fixture = fixture();
        let entity = enroll(&fixture, "p1");
        let token = fixture.authority.issue(&entity).unwrap();

        let mut bytes = token.into_bytes();
        let last = bytes.len() - 2;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert!(matches!(fixture.authority.verify(&tampered), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn device_id_is_stable_hex() {
        let first = derive_device_id(&[3u8; 32], "hash", "key");
        assert_eq!(first, derive_device_id(&[3u8; 32], "hash", "key"));
        assert_eq!(first.len(), 64);
        assert_ne!(first, derive_device_id(&[3u8; 32], "hash", "other"));
    }
}
