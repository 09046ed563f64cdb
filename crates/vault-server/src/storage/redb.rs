//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. Every
//! repository method runs in a single transaction, so uniqueness checks,
//! usage counters and ratchet state swaps are atomic.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};
use vault_core::model::{Entity, EntityId, KeypairStatus, StaticKeypair, Token, TokenKey};

use super::{EntityStore, KeypairStore, StorageError, TokenStore};

/// Table: entities
/// Key: entity id [16 bytes]
/// Value: CBOR-encoded Entity
const ENTITIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entities");

/// Table: entity_by_device
/// Key: device id
/// Value: entity id [16 bytes]
const ENTITY_BY_DEVICE: TableDefinition<&str, &[u8]> = TableDefinition::new("entity_by_device");

/// Table: entity_by_phone
/// Key: phone number hash
/// Value: entity id [16 bytes]
const ENTITY_BY_PHONE: TableDefinition<&str, &[u8]> = TableDefinition::new("entity_by_phone");

/// Table: tokens
/// Key: entity id [16 bytes] + platform + 0x00 + account identifier hash
/// Value: CBOR-encoded Token
const TOKENS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("tokens");

/// Table: keypairs
/// Key: version + 0x00 + kid (4 bytes BE), so keys sort by (version, kid)
/// Value: CBOR-encoded StaticKeypair
const KEYPAIRS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("keypairs");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(ENTITIES).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(ENTITY_BY_DEVICE).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(ENTITY_BY_PHONE).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(TOKENS).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(KEYPAIRS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn find_entity_by_index(
        &self,
        index: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> Result<Option<Entity>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let lookup = txn.open_table(index).map_err(|e| StorageError::Io(e.to_string()))?;

        let id = match lookup.get(key).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => value.value().to_vec(),
            None => return Ok(None),
        };

        let entities = txn.open_table(ENTITIES).map_err(|e| StorageError::Io(e.to_string()))?;
        let entity = entities.get(id.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
        entity.map(|value| decode(value.value())).transpose()
    }
}

impl EntityStore for RedbStorage {
    fn insert_entity(&self, entity: &Entity) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut entities = txn.open_table(ENTITIES).map_err(|e| StorageError::Io(e.to_string()))?;
            let mut by_phone =
                txn.open_table(ENTITY_BY_PHONE).map_err(|e| StorageError::Io(e.to_string()))?;
            let mut by_device =
                txn.open_table(ENTITY_BY_DEVICE).map_err(|e| StorageError::Io(e.to_string()))?;

            let id = entity.id.as_bytes().as_slice();

            if entities.get(id).map_err(|e| StorageError::Io(e.to_string()))?.is_some() {
                return Err(StorageError::Conflict(format!("entity {} exists", entity.id)));
            }
            if by_phone
                .get(entity.phone_number_hash.as_str())
                .map_err(|e| StorageError::Io(e.to_string()))?
                .is_some()
            {
                return Err(StorageError::Conflict("phone number hash is taken".to_string()));
            }
            if let Some(device_id) = entity.device_id.as_deref()
                && by_device.get(device_id).map_err(|e| StorageError::Io(e.to_string()))?.is_some()
            {
                return Err(StorageError::Conflict("device id is taken".to_string()));
            }

            let bytes = encode(entity)?;
            entities.insert(id, bytes.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
            by_phone
                .insert(entity.phone_number_hash.as_str(), id)
                .map_err(|e| StorageError::Io(e.to_string()))?;
            if let Some(device_id) = entity.device_id.as_deref() {
                by_device.insert(device_id, id).map_err(|e| StorageError::Io(e.to_string()))?;
            }
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn find_entity(&self, id: &EntityId) -> Result<Option<Entity>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(ENTITIES).map_err(|e| StorageError::Io(e.to_string()))?;

        match table.get(id.as_bytes().as_slice()).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn find_entity_by_device_id(&self, device_id: &str) -> Result<Option<Entity>, StorageError> {
        self.find_entity_by_index(ENTITY_BY_DEVICE, device_id)
    }

    fn find_entity_by_phone_hash(&self, phone_hash: &str) -> Result<Option<Entity>, StorageError> {
        self.find_entity_by_index(ENTITY_BY_PHONE, phone_hash)
    }

    fn swap_server_state(
        &self,
        id: &EntityId,
        expected_version: u64,
        state: &[u8],
    ) -> Result<u64, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        let version = {
            let mut table = txn.open_table(ENTITIES).map_err(|e| StorageError::Io(e.to_string()))?;
            let key = id.as_bytes().as_slice();

            let mut entity: Entity = match table.get(key).map_err(|e| StorageError::Io(e.to_string()))? {
                Some(value) => decode(value.value())?,
                None => return Err(StorageError::NotFound(format!("entity {id}"))),
            };

            if entity.state_version != expected_version {
                return Err(StorageError::Conflict(format!(
                    "entity {id} state version is {}, expected {expected_version}",
                    entity.state_version
                )));
            }

            entity.server_state = Some(state.to_vec());
            entity.state_version += 1;

            let bytes = encode(&entity)?;
            table.insert(key, bytes.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
            entity.state_version
        };

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(version)
    }
}

impl TokenStore for RedbStorage {
    fn insert_token(&self, token: &Token) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table = txn.open_table(TOKENS).map_err(|e| StorageError::Io(e.to_string()))?;
            let key = encode_token_key(&token.key());

            if table.get(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?.is_some() {
                return Err(StorageError::Conflict(format!(
                    "token for {} on {} exists",
                    token.entity_id, token.platform
                )));
            }

            let bytes = encode(token)?;
            table.insert(key.as_slice(), bytes.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn find_token(&self, key: &TokenKey) -> Result<Option<Token>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(TOKENS).map_err(|e| StorageError::Io(e.to_string()))?;

        let key = encode_token_key(key);
        match table.get(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn list_tokens(&self, entity_id: &EntityId) -> Result<Vec<Token>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(TOKENS).map_err(|e| StorageError::Io(e.to_string()))?;

        let prefix = entity_id.as_bytes().as_slice();
        let results = table.range(prefix..).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut tokens = Vec::new();
        for result in results {
            let (key, value) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            if !key.value().starts_with(prefix) {
                break;
            }
            tokens.push(decode(value.value())?);
        }

        Ok(tokens)
    }

    fn update_account_tokens(&self, key: &TokenKey, account_tokens: &str) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table = txn.open_table(TOKENS).map_err(|e| StorageError::Io(e.to_string()))?;
            let encoded_key = encode_token_key(key);

            let mut token: Token =
                match table.get(encoded_key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))? {
                    Some(value) => decode(value.value())?,
                    None => {
                        return Err(StorageError::NotFound(format!(
                            "token for {} on {}",
                            key.entity_id, key.platform
                        )));
                    },
                };

            token.account_tokens = account_tokens.to_string();
            let bytes = encode(&token)?;
            table
                .insert(encoded_key.as_slice(), bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn delete_token(&self, key: &TokenKey) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table = txn.open_table(TOKENS).map_err(|e| StorageError::Io(e.to_string()))?;
            let encoded_key = encode_token_key(key);

            if table.remove(encoded_key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?.is_none() {
                return Err(StorageError::NotFound(format!(
                    "token for {} on {}",
                    key.entity_id, key.platform
                )));
            }
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }
}

impl KeypairStore for RedbStorage {
    fn insert_keypair(&self, keypair: &StaticKeypair) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table = txn.open_table(KEYPAIRS).map_err(|e| StorageError::Io(e.to_string()))?;
            let key = encode_keypair_key(&keypair.version, keypair.kid);

            if table.get(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?.is_some() {
                return Err(StorageError::Conflict(format!(
                    "keypair {}/{} exists",
                    keypair.version, keypair.kid
                )));
            }

            let bytes = encode(keypair)?;
            table.insert(key.as_slice(), bytes.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn list_keypairs(&self, status: Option<KeypairStatus>) -> Result<Vec<StaticKeypair>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(KEYPAIRS).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut keypairs = Vec::new();
        for result in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (_, value) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            let keypair: StaticKeypair = decode(value.value())?;
            if status.is_none_or(|wanted| keypair.status == wanted) {
                keypairs.push(keypair);
            }
        }

        Ok(keypairs)
    }

    fn touch_keypair(
        &self,
        version: &str,
        kid: u32,
        now_secs: u64,
    ) -> Result<Option<StaticKeypair>, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        let keypair = {
            let mut table = txn.open_table(KEYPAIRS).map_err(|e| StorageError::Io(e.to_string()))?;
            let key = encode_keypair_key(version, kid);

            let mut keypair: StaticKeypair =
                match table.get(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))? {
                    Some(value) => decode(value.value())?,
                    None => return Ok(None),
                };

            keypair.usage_count += 1;
            keypair.date_last_used = Some(now_secs);

            let bytes = encode(&keypair)?;
            table.insert(key.as_slice(), bytes.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
            keypair
        };

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Some(keypair))
    }

    fn set_keypair_status(
        &self,
        version: &str,
        kid: u32,
        status: KeypairStatus,
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table = txn.open_table(KEYPAIRS).map_err(|e| StorageError::Io(e.to_string()))?;
            let key = encode_keypair_key(version, kid);

            let mut keypair: StaticKeypair =
                match table.get(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))? {
                    Some(value) => decode(value.value())?,
                    None => return Err(StorageError::NotFound(format!("keypair {version}/{kid}"))),
                };

            keypair.status = status;
            let bytes = encode(&keypair)?;
            table.insert(key.as_slice(), bytes.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Encode token key: entity id || platform || 0x00 || account identifier hash
fn encode_token_key(key: &TokenKey) -> Vec<u8> {
    let mut bytes =
        Vec::with_capacity(16 + key.platform.len() + 1 + key.account_identifier_hash.len());
    bytes.extend_from_slice(key.entity_id.as_bytes());
    bytes.extend_from_slice(key.platform.as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(key.account_identifier_hash.as_bytes());
    bytes
}

/// Encode keypair key: version || 0x00 || kid (BE)
fn encode_keypair_key(version: &str, kid: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(version.len() + 5);
    bytes.extend_from_slice(version.as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(&kid.to_be_bytes());
    bytes
}
