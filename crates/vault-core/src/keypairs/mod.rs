//! Static keypair lifecycle
//!
//! Generates versioned batches of X25519 keypairs, tracks their use, rotates
//! their status, exports the active public keys and checks that stored key
//! material still agrees.
//!
//! # Keystore Layout
//!
//! ```text
//! <keystore>/<version>/<kid>-<uuid>.key    encrypted keypair record
//! ```
//!
//! A batch is skipped entirely if its version directory already holds any
//! file, so re-running generation for an existing version is a no-op. Within
//! a batch each key is generated independently: a failure removes only that
//! key's artifact and the batch continues.

mod error;
mod export;

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use base64::{Engine, engine::general_purpose::STANDARD};
pub use error::LifecycleError;
pub use export::{ExportOutcome, ExportPolicy, PublicKeyRecord};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};
use vault_crypto::Keypair;

use crate::{
    blind_index::BlindIndex,
    env::Environment,
    model::{KeypairStatus, StaticKeypair},
    storage::{KeypairStore, StorageError},
};

/// Outcome of [`KeypairLifecycle::generate_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchReport {
    /// Version directory was already populated; nothing was generated
    Skipped {
        /// Version label
        version: String,
    },
    /// Batch ran
    Completed {
        /// Version label
        version: String,
        /// Key ids generated and stored
        generated: Vec<u32>,
        /// Key ids that failed and were rolled back
        failed: Vec<u32>,
    },
}

/// The pair of keypairs exercised by [`KeypairLifecycle::self_test`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfTestReport {
    /// First sampled keypair, `(version, kid)`
    pub first: (String, u32),
    /// Second sampled keypair, `(version, kid)`
    pub second: (String, u32),
}

/// Manages server static keypairs.
pub struct KeypairLifecycle<E: Environment, S: KeypairStore> {
    store: S,
    index: BlindIndex<E>,
    env: E,
    keystore_path: PathBuf,
}

impl<E: Environment, S: KeypairStore> KeypairLifecycle<E, S> {
    /// Create a lifecycle manager rooted at `keystore_path`.
    pub fn new(store: S, index: BlindIndex<E>, env: E, keystore_path: impl Into<PathBuf>) -> Self {
        Self { store, index, env, keystore_path: keystore_path.into() }
    }

    /// Generate `count` keypairs with ids `0..count` under `version`.
    pub fn generate_batch(&self, count: u32, version: &str) -> Result<BatchReport, LifecycleError> {
        validate_version(version)?;

        let directory = self.keystore_path.join(version);
        if is_populated(&directory)? {
            info!(version, path = %directory.display(), "keystore already populated, skipping generation");
            return Ok(BatchReport::Skipped { version: version.to_string() });
        }
        fs::create_dir_all(&directory)?;

        let mut generated = Vec::new();
        let mut failed = Vec::new();

        for kid in 0..count {
            match self.generate_one(kid, version, &directory) {
                Ok(path) => {
                    debug!(version, kid, path = %path.display(), "keypair generated");
                    generated.push(kid);
                },
                Err(e) => {
                    error!(version, kid, error = %e, "keypair generation failed, rolled back");
                    failed.push(kid);
                },
            }
        }

        info!(version, generated = generated.len(), failed = failed.len(), "keypair batch complete");
        Ok(BatchReport::Completed { version: version.to_string(), generated, failed })
    }

    fn generate_one(&self, kid: u32, version: &str, directory: &Path) -> Result<PathBuf, LifecycleError> {
        let keypair = Keypair::from_secret(self.env.random_array());
        let ciphertext = self.index.encrypt(&keypair.to_bytes());

        let artifact_id = uuid::Builder::from_random_bytes(self.env.random_array()).into_uuid();
        let path = directory.join(format!("{kid}-{artifact_id}.key"));

        let record = StaticKeypair {
            kid,
            version: version.to_string(),
            keypair_bytes: ciphertext.clone(),
            status: KeypairStatus::Active,
            usage_count: 0,
            date_last_used: None,
            date_created: self.env.wall_clock_secs(),
        };

        let written = fs::write(&path, &ciphertext)
            .map_err(LifecycleError::from)
            .and_then(|()| self.store.insert_keypair(&record).map_err(LifecycleError::from));

        if let Err(e) = written {
            rollback_artifact(&path);
            return Err(e);
        }
        Ok(path)
    }

    /// Fetch a keypair row and record the use.
    pub fn get_keypair(&self, version: &str, kid: u32) -> Result<Option<StaticKeypair>, LifecycleError> {
        let keypair = self.store.touch_keypair(version, kid, self.env.wall_clock_secs())?;
        if keypair.is_none() {
            warn!(version, kid, "keypair not found");
        }
        Ok(keypair)
    }

    /// Change the status of a keypair.
    pub fn set_status(&self, version: &str, kid: u32, status: KeypairStatus) -> Result<(), LifecycleError> {
        match self.store.set_keypair_status(version, kid, status) {
            Ok(()) => {
                info!(version, kid, %status, "keypair status updated");
                Ok(())
            },
            Err(StorageError::NotFound(_)) => {
                Err(LifecycleError::NotFound { version: version.to_string(), kid })
            },
            Err(e) => Err(e.into()),
        }
    }

    /// [`Self::set_status`] with the status given as text.
    pub fn set_status_str(&self, version: &str, kid: u32, status: &str) -> Result<(), LifecycleError> {
        self.set_status(version, kid, status.parse()?)
    }

    /// Decrypt and parse a stored keypair.
    pub fn load_keypair(&self, ciphertext: &[u8]) -> Result<Keypair, LifecycleError> {
        Ok(self.index.decrypt_keypair(ciphertext)?)
    }

    /// Write the public keys of all active keypairs to `destination` as a
    /// pretty-printed JSON array.
    pub fn export_public_keys(
        &self,
        destination: &Path,
        policy: ExportPolicy<'_>,
    ) -> Result<ExportOutcome, LifecycleError> {
        if destination.exists() {
            match policy {
                ExportPolicy::SkipIfExists => {
                    info!(path = %destination.display(), "export file exists, skipping");
                    return Ok(ExportOutcome::Skipped);
                },
                ExportPolicy::Confirm(confirm) => {
                    if !confirm(destination) {
                        info!(path = %destination.display(), "export declined");
                        return Ok(ExportOutcome::Declined);
                    }
                },
                ExportPolicy::Overwrite => {},
            }
        }

        let parent = match destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                parent
            },
            None => Path::new("."),
        };

        let records = self
            .store
            .list_keypairs(Some(KeypairStatus::Active))?
            .iter()
            .map(|row| {
                let keypair = self.load_keypair(&row.keypair_bytes)?;
                Ok(PublicKeyRecord {
                    kid: row.kid,
                    public_key: STANDARD.encode(keypair.public_key()),
                    status: row.status,
                    version: row.version.clone(),
                })
            })
            .collect::<Result<Vec<_>, LifecycleError>>()?;

        let json = serde_json::to_string_pretty(&records)?;
        let mut staging = NamedTempFile::new_in(parent)?;
        staging.write_all(json.as_bytes())?;
        staging.as_file().sync_all()?;
        staging.persist(destination).map_err(|e| e.error)?;

        info!(path = %destination.display(), count = records.len(), "public keys exported");
        Ok(ExportOutcome::Written { path: destination.to_path_buf(), count: records.len() })
    }

    /// Sample two distinct active keypairs and check that X25519 agreement
    /// yields the same secret in both directions.
    pub fn self_test(&self) -> Result<SelfTestReport, LifecycleError> {
        let active = self.store.list_keypairs(Some(KeypairStatus::Active))?;
        if active.len() < 2 {
            return Err(LifecycleError::InsufficientKeyMaterial { available: active.len() });
        }

        let count = active.len() as u64;
        let first = (self.env.random_u64() % count) as usize;
        let mut second = (self.env.random_u64() % (count - 1)) as usize;
        if second >= first {
            second += 1;
        }

        let (a, b) = (&active[first], &active[second]);
        let label_a = format!("{}/{}", a.version, a.kid);
        let label_b = format!("{}/{}", b.version, b.kid);

        let keypair_a = self.load_keypair(&a.keypair_bytes)?;
        let keypair_b = self.load_keypair(&b.keypair_bytes)?;

        let forward = keypair_a.agree(&keypair_b.public_key())?;
        let backward = keypair_b.agree(&keypair_a.public_key())?;

        if *forward != *backward {
            error!(first = %label_a, second = %label_b, "key agreement mismatch");
            return Err(LifecycleError::KeyAgreementMismatch { first: label_a, second: label_b });
        }

        info!(first = %label_a, second = %label_b, "key agreement successful, shared secrets match");
        Ok(SelfTestReport { first: (a.version.clone(), a.kid), second: (b.version.clone(), b.kid) })
    }
}

fn validate_version(version: &str) -> Result<(), LifecycleError> {
    let valid = version.len() > 1
        && version.starts_with('v')
        && version.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_');
    if valid { Ok(()) } else { Err(LifecycleError::InvalidVersion(version.to_string())) }
}

fn is_populated(directory: &Path) -> Result<bool, LifecycleError> {
    match fs::read_dir(directory) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn rollback_artifact(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed keystore artifact"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {},
        Err(e) => error!(path = %path.display(), error = %e, "failed to remove keystore artifact"),
    }
}
