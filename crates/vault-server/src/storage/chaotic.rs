//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails operations to test error handling and
//! rollback. Used to check that a failed keypair insert removes its artifact
//! and that a failed state swap leaves the ratchet session where it was.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use vault_core::model::{Entity, EntityId, KeypairStatus, StaticKeypair, Token, TokenKey};

use super::{EntityStore, KeypairStore, StorageError, TokenStore};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but randomly fails
/// operations based on a configured failure rate. Failures are injected
/// before the inner call, so a failed operation never reaches the inner
/// storage. The RNG state is shared between clones.
#[derive(Clone)]
pub struct ChaoticStorage<S> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    operation_count: Arc<AtomicUsize>,
}

/// Simple deterministic RNG for chaos injection
///
/// Uses linear congruential generator (LCG) for fast, deterministic randomness.
/// This ensures chaos tests are reproducible with the same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    #[allow(clippy::cast_precision_loss)]
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    /// Check if we should fail (returns true with probability = `failure_rate`)
    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next() < failure_rate
    }
}

impl<S> ChaoticStorage<S> {
    /// Create a new chaotic storage wrapper
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted, failed ones included.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::SeqCst)
    }

    /// Count the operation and decide whether it fails.
    fn inject(&self) -> Result<(), StorageError> {
        self.operation_count.fetch_add(1, Ordering::SeqCst);
        let fail =
            self.rng.lock().unwrap_or_else(PoisonError::into_inner).should_fail(self.failure_rate);
        if fail {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<S: EntityStore> EntityStore for ChaoticStorage<S> {
    fn insert_entity(&self, entity: &Entity) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.insert_entity(entity)
    }

    fn find_entity(&self, id: &EntityId) -> Result<Option<Entity>, StorageError> {
        self.inject()?;
        self.inner.find_entity(id)
    }

    fn find_entity_by_device_id(&self, device_id: &str) -> Result<Option<Entity>, StorageError> {
        self.inject()?;
        self.inner.find_entity_by_device_id(device_id)
    }

    fn find_entity_by_phone_hash(&self, phone_hash: &str) -> Result<Option<Entity>, StorageError> {
        self.inject()?;
        self.inner.find_entity_by_phone_hash(phone_hash)
    }

    fn swap_server_state(
        &self,
        id: &EntityId,
        expected_version: u64,
        state: &[u8],
    ) -> Result<u64, StorageError> {
        self.inject()?;
        self.inner.swap_server_state(id, expected_version, state)
    }
}

impl<S: TokenStore> TokenStore for ChaoticStorage<S> {
    fn insert_token(&self, token: &Token) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.insert_token(token)
    }

    fn find_token(&self, key: &TokenKey) -> Result<Option<Token>, StorageError> {
        self.inject()?;
        self.inner.find_token(key)
    }

    fn list_tokens(&self, entity_id: &EntityId) -> Result<Vec<Token>, StorageError> {
        self.inject()?;
        self.inner.list_tokens(entity_id)
    }

    fn update_account_tokens(&self, key: &TokenKey, account_tokens: &str) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.update_account_tokens(key, account_tokens)
    }

    fn delete_token(&self, key: &TokenKey) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.delete_token(key)
    }
}

impl<S: KeypairStore> KeypairStore for ChaoticStorage<S> {
    fn insert_keypair(&self, keypair: &StaticKeypair) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.insert_keypair(keypair)
    }

    fn list_keypairs(&self, status: Option<KeypairStatus>) -> Result<Vec<StaticKeypair>, StorageError> {
        self.inject()?;
        self.inner.list_keypairs(status)
    }

    fn touch_keypair(
        &self,
        version: &str,
        kid: u32,
        now_secs: u64,
    ) -> Result<Option<StaticKeypair>, StorageError> {
        self.inject()?;
        self.inner.touch_keypair(version, kid, now_secs)
    }

    fn set_keypair_status(
        &self,
        version: &str,
        kid: u32,
        status: KeypairStatus,
    ) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.set_keypair_status(version, kid, status)
    }
}
