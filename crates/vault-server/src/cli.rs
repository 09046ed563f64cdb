//! `vault-keys` command line
//!
//! Key management for operators: generate a batch of static keypairs, export
//! the active public keys, self-test stored key material, and change a key's
//! status. Every command opens the Redb database and loads the vault keys
//! from their files.

use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::{info, warn};
use vault_core::{
    BlindIndex, ConfigError, Environment, KeypairLifecycle, KeypairStore, LifecycleError, StorageError,
    VaultConfig, VaultKeys,
    keypairs::{BatchReport, ExportOutcome, ExportPolicy},
};
use vault_crypto::CryptoError;

use crate::{storage::RedbStorage, system_env::SystemEnv};

/// Vault key management
#[derive(Parser, Debug)]
#[command(name = "vault-keys")]
#[command(about = "Manage the vault's static keypairs")]
#[command(version)]
pub struct Cli {
    /// Path to the vault database
    #[arg(long, global = true, default_value = "vault.redb")]
    pub db: PathBuf,

    /// Directory for generated keypair artifacts
    #[arg(long, global = true, default_value = "keystore")]
    pub keystore: PathBuf,

    /// File holding the encryption key (first 32 bytes are used)
    #[arg(long, global = true, default_value = "encryption.key")]
    pub encryption_key_file: PathBuf,

    /// File holding the hashing key (first 32 bytes are used)
    #[arg(long, global = true, default_value = "hashing.key")]
    pub hashing_key_file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Operation to run
    #[command(subcommand)]
    pub command: Command,
}

/// `vault-keys` subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Generate a batch of keypairs for a version
    Generate {
        /// Number of keypairs
        #[arg(short = 'n', long, default_value_t = 10)]
        count: u32,

        /// Version label, e.g. v1
        #[arg(short = 'v', long, default_value = "v1")]
        version: String,
    },

    /// Export the active public keys as JSON
    Export {
        /// Destination file
        #[arg(short = 'f', long, default_value = "public_keys.json")]
        file: PathBuf,

        /// Overwrite an existing file without asking
        #[arg(short = 'y', long)]
        yes: bool,

        /// Leave an existing file alone without asking
        #[arg(long, conflicts_with = "yes")]
        skip_if_exists: bool,
    },

    /// Check that two stored keypairs still agree
    Test,

    /// Change the status of a keypair
    SetStatus {
        /// Version label
        #[arg(long)]
        version: String,

        /// Key id
        #[arg(long)]
        kid: u32,

        /// New status: active, inactive or archived
        #[arg(long)]
        status: String,
    },
}

/// Command failures.
#[derive(Debug, Error)]
pub enum CliError {
    /// Key files could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Database could not be opened
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    /// Key material could not be set up
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),

    /// Lifecycle operation failed
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Batch finished with failed keys
    #[error("{failed} of {total} keypairs failed for {version}")]
    PartialBatch {
        /// Version label
        version: String,
        /// Failed keys
        failed: usize,
        /// Keys attempted
        total: usize,
    },
}

/// Run a parsed command against the configured database and keystore.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    let keys = VaultKeys::load(&cli.hashing_key_file, &cli.encryption_key_file)?;
    let mut config = VaultConfig::new(keys);
    config.keystore_path.clone_from(&cli.keystore);

    let storage = RedbStorage::open(&cli.db)?;
    let env = SystemEnv::new();
    let index = BlindIndex::new(&config.keys, config.field_scheme, env.clone())?;
    let lifecycle = KeypairLifecycle::new(storage, index, env, config.keystore_path);

    execute(&lifecycle, &cli.command, &mut io::stdin().lock(), &mut io::stderr())
}

/// Execute `command` with `lifecycle`.
///
/// `input` and `prompt` carry the overwrite confirmation for `export`.
pub fn execute<E: Environment, S: KeypairStore>(
    lifecycle: &KeypairLifecycle<E, S>,
    command: &Command,
    input: &mut impl BufRead,
    prompt: &mut impl Write,
) -> Result<(), CliError> {
    match command {
        Command::Generate { count, version } => match lifecycle.generate_batch(*count, version)? {
            BatchReport::Skipped { version } => {
                warn!(%version, "keystore for this version is not empty, nothing generated");
                Ok(())
            },
            BatchReport::Completed { version, generated, failed } => {
                info!(%version, generated = generated.len(), "keypairs generated");
                if failed.is_empty() {
                    Ok(())
                } else {
                    Err(CliError::PartialBatch { version, failed: failed.len(), total: *count as usize })
                }
            },
        },
        Command::Export { file, yes, skip_if_exists } => {
            let policy = if *yes {
                ExportPolicy::Overwrite
            } else if *skip_if_exists {
                ExportPolicy::SkipIfExists
            } else {
                ExportPolicy::Confirm(Box::new(|path: &Path| confirm_overwrite(path, input, prompt)))
            };

            match lifecycle.export_public_keys(file, policy)? {
                ExportOutcome::Written { path, count } => {
                    info!(path = %path.display(), count, "public keys exported");
                },
                ExportOutcome::Skipped => info!(path = %file.display(), "export exists, skipped"),
                ExportOutcome::Declined => info!(path = %file.display(), "export cancelled"),
            }
            Ok(())
        },
        Command::Test => {
            let report = lifecycle.self_test()?;
            info!(
                first = %format_args!("{}/{}", report.first.0, report.first.1),
                second = %format_args!("{}/{}", report.second.0, report.second.1),
                "key agreement self-test passed"
            );
            Ok(())
        },
        Command::SetStatus { version, kid, status } => {
            lifecycle.set_status_str(version, *kid, status)?;
            Ok(())
        },
    }
}

/// Ask on `prompt` and read a yes/no answer from `input`. Anything but `y`
/// or `yes` declines.
fn confirm_overwrite(path: &Path, input: &mut impl BufRead, prompt: &mut impl Write) -> bool {
    if write!(prompt, "'{}' already exists. Overwrite? [y/N] ", path.display()).and_then(|()| prompt.flush()).is_err()
    {
        return false;
    }

    let mut answer = String::new();
    if input.read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
