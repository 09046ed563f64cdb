use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use super::{EntityStore, KeypairStore, StorageError, TokenStore};
use crate::model::{Entity, EntityId, KeypairStatus, StaticKeypair, Token, TokenKey};

/// In-memory storage for tests and tooling.
///
/// `HashMap` indexes behind one `Arc<Mutex<_>>`, so every trait method is a
/// single critical section. A poisoned lock surfaces as
/// [`StorageError::Io`].
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    entities: HashMap<EntityId, Entity>,
    entity_by_device: HashMap<String, EntityId>,
    entity_by_phone: HashMap<String, EntityId>,
    tokens: HashMap<TokenKey, Token>,
    /// Ordered so listings come back sorted by `(version, kid)`
    keypairs: BTreeMap<(String, u32), StaticKeypair>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStorageInner>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Io("memory storage lock poisoned".to_string()))
    }
}

impl EntityStore for MemoryStorage {
    fn insert_entity(&self, entity: &Entity) -> Result<(), StorageError> {
        let mut inner = self.lock()?;

        if inner.entities.contains_key(&entity.id) {
            return Err(StorageError::Conflict(format!("entity {} exists", entity.id)));
        }
        if inner.entity_by_phone.contains_key(&entity.phone_number_hash) {
            return Err(StorageError::Conflict("phone number hash already registered".to_string()));
        }
        if let Some(device_id) = &entity.device_id
            && inner.entity_by_device.contains_key(device_id)
        {
            return Err(StorageError::Conflict("device id already registered".to_string()));
        }

        inner.entity_by_phone.insert(entity.phone_number_hash.clone(), entity.id);
        if let Some(device_id) = &entity.device_id {
            inner.entity_by_device.insert(device_id.clone(), entity.id);
        }
        inner.entities.insert(entity.id, entity.clone());
        Ok(())
    }

    fn find_entity(&self, id: &EntityId) -> Result<Option<Entity>, StorageError> {
        Ok(self.lock()?.entities.get(id).cloned())
    }

    fn find_entity_by_device_id(&self, device_id: &str) -> Result<Option<Entity>, StorageError> {
        let inner = self.lock()?;
        Ok(inner.entity_by_device.get(device_id).and_then(|id| inner.entities.get(id)).cloned())
    }

    fn find_entity_by_phone_hash(&self, phone_hash: &str) -> Result<Option<Entity>, StorageError> {
        let inner = self.lock()?;
        Ok(inner.entity_by_phone.get(phone_hash).and_then(|id| inner.entities.get(id)).cloned())
    }

    fn swap_server_state(
        &self,
        id: &EntityId,
        expected_version: u64,
        state: &[u8],
    ) -> Result<u64, StorageError> {
        let mut inner = self.lock()?;
        let entity = inner
            .entities
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("entity {id}")))?;

        if entity.state_version != expected_version {
            return Err(StorageError::Conflict(format!(
                "entity {id} state version is {}, expected {expected_version}",
                entity.state_version
            )));
        }

        entity.server_state = Some(state.to_vec());
        entity.state_version += 1;
        Ok(entity.state_version)
    }
}

impl TokenStore for MemoryStorage {
    fn insert_token(&self, token: &Token) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let key = token.key();
        if inner.tokens.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "token for entity {} on {} exists",
                key.entity_id, key.platform
            )));
        }
        inner.tokens.insert(key, token.clone());
        Ok(())
    }

    fn find_token(&self, key: &TokenKey) -> Result<Option<Token>, StorageError> {
        Ok(self.lock()?.tokens.get(key).cloned())
    }

    fn list_tokens(&self, entity_id: &EntityId) -> Result<Vec<Token>, StorageError> {
        let inner = self.lock()?;
        let mut tokens: Vec<Token> =
            inner.tokens.values().filter(|t| &t.entity_id == entity_id).cloned().collect();
        tokens.sort_by(|a, b| {
            (a.date_created, &a.platform, &a.account_identifier_hash).cmp(&(
                b.date_created,
                &b.platform,
                &b.account_identifier_hash,
            ))
        });
        Ok(tokens)
    }

    fn update_account_tokens(&self, key: &TokenKey, account_tokens: &str) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let token = inner
            .tokens
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound(format!("token for entity {}", key.entity_id)))?;
        token.account_tokens = account_tokens.to_string();
        Ok(())
    }

    fn delete_token(&self, key: &TokenKey) -> Result<(), StorageError> {
        self.lock()?
            .tokens
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("token for entity {}", key.entity_id)))
    }
}

impl KeypairStore for MemoryStorage {
    fn insert_keypair(&self, keypair: &StaticKeypair) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let key = (keypair.version.clone(), keypair.kid);
        if inner.keypairs.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "keypair {} {} exists",
                keypair.version, keypair.kid
            )));
        }
        inner.keypairs.insert(key, keypair.clone());
        Ok(())
    }

    fn list_keypairs(&self, status: Option<KeypairStatus>) -> Result<Vec<StaticKeypair>, StorageError> {
        Ok(self
            .lock()?
            .keypairs
            .values()
            .filter(|k| status.is_none_or(|s| k.status == s))
            .cloned()
            .collect())
    }

    fn touch_keypair(
        &self,
        version: &str,
        kid: u32,
        now_secs: u64,
    ) -> Result<Option<StaticKeypair>, StorageError> {
        let mut inner = self.lock()?;
        let Some(keypair) = inner.keypairs.get_mut(&(version.to_string(), kid)) else {
            return Ok(None);
        };
        keypair.usage_count += 1;
        keypair.date_last_used = Some(now_secs);
        Ok(Some(keypair.clone()))
    }

    fn set_keypair_status(
        &self,
        version: &str,
        kid: u32,
        status: KeypairStatus,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let keypair = inner
            .keypairs
            .get_mut(&(version.to_string(), kid))
            .ok_or_else(|| StorageError::NotFound(format!("keypair {version} {kid}")))?;
        keypair.status = status;
        Ok(())
    }
}
