//! `vault-keys` command tests
//!
//! Drive [`vault_server::cli::execute`] against in-memory storage:
//! 1. **Generate**: a batch creates rows and artifacts, a second run is a no-op
//! 2. **Export**: confirmation answers decide whether a file is replaced
//! 3. **Status**: archived keys drop out of the export
//! 4. **Self-test**: needs two active keys

use std::fs;

use tempfile::tempdir;
use vault_core::{
    BlindIndex, FieldScheme, KeypairLifecycle, LifecycleError, SeededEnv, VaultKeys,
    keypairs::PublicKeyRecord,
};
use vault_server::{
    cli::{CliError, Command, execute},
    storage::{KeypairStore, MemoryStorage},
};

fn lifecycle(keystore: &std::path::Path) -> (KeypairLifecycle<SeededEnv, MemoryStorage>, MemoryStorage) {
    let env = SeededEnv::new(99, 1_700_000_000);
    let keys = VaultKeys::from_bytes(&[1u8; 32], &[2u8; 32]).unwrap();
    let index = BlindIndex::new(&keys, FieldScheme::Aead, env.clone()).unwrap();
    let storage = MemoryStorage::new();
    (KeypairLifecycle::new(storage.clone(), index, env, keystore), storage)
}

fn run(lifecycle: &KeypairLifecycle<SeededEnv, MemoryStorage>, command: Command, answer: &str) -> Result<(), CliError> {
    execute(lifecycle, &command, &mut answer.as_bytes(), &mut Vec::new())
}

fn generate(count: u32) -> Command {
    Command::Generate { count, version: "v1".to_string() }
}

#[test]
fn generate_is_idempotent_per_version() {
    let dir = tempdir().unwrap();
    let (lifecycle, storage) = lifecycle(dir.path());

    run(&lifecycle, generate(4), "").unwrap();
    assert_eq!(storage.list_keypairs(None).unwrap().len(), 4);
    assert_eq!(fs::read_dir(dir.path().join("v1")).unwrap().count(), 4);

    run(&lifecycle, generate(4), "").unwrap();
    assert_eq!(storage.list_keypairs(None).unwrap().len(), 4);
}

#[test]
fn export_respects_confirmation() {
    let dir = tempdir().unwrap();
    let (lifecycle, _) = lifecycle(&dir.path().join("keystore"));
    run(&lifecycle, generate(3), "").unwrap();

    let file = dir.path().join("public_keys.json");
    fs::write(&file, "old").unwrap();

    let export = Command::Export { file: file.clone(), yes: false, skip_if_exists: false };
    run(&lifecycle, export.clone(), "n\n").unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), "old");

    run(&lifecycle, Command::Export { file: file.clone(), yes: false, skip_if_exists: true }, "").unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), "old");

    run(&lifecycle, export, "y\n").unwrap();
    let records: Vec<PublicKeyRecord> = serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(records.len(), 3);
}

#[test]
fn archived_keys_are_not_exported() {
    let dir = tempdir().unwrap();
    let (lifecycle, _) = lifecycle(&dir.path().join("keystore"));
    run(&lifecycle, generate(3), "").unwrap();

    let set_status = Command::SetStatus { version: "v1".to_string(), kid: 1, status: "archived".to_string() };
    run(&lifecycle, set_status, "").unwrap();

    let file = dir.path().join("keys.json");
    run(&lifecycle, Command::Export { file: file.clone(), yes: true, skip_if_exists: false }, "").unwrap();

    let records: Vec<PublicKeyRecord> = serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(records.iter().map(|r| r.kid).collect::<Vec<_>>(), vec![0, 2]);
}

#[test]
fn set_status_rejects_unknown_keys_and_statuses() {
    let dir = tempdir().unwrap();
    let (lifecycle, _) = lifecycle(dir.path());
    run(&lifecycle, generate(1), "").unwrap();

    let missing = Command::SetStatus { version: "v1".to_string(), kid: 9, status: "inactive".to_string() };
    assert!(matches!(
        run(&lifecycle, missing, ""),
        Err(CliError::Lifecycle(LifecycleError::NotFound { kid: 9, .. }))
    ));

    let bogus = Command::SetStatus { version: "v1".to_string(), kid: 0, status: "retired".to_string() };
    assert!(matches!(run(&lifecycle, bogus, ""), Err(CliError::Lifecycle(LifecycleError::InvalidStatus(_)))));
}

#[test]
fn self_test_needs_two_active_keys() {
    let dir = tempdir().unwrap();
    let (lifecycle, _) = lifecycle(dir.path());

    run(&lifecycle, generate(1), "").unwrap();
    assert!(matches!(
        run(&lifecycle, Command::Test, ""),
        Err(CliError::Lifecycle(LifecycleError::InsufficientKeyMaterial { available: 1 }))
    ));

    let more = Command::Generate { count: 2, version: "v2".to_string() };
    run(&lifecycle, more, "").unwrap();
    run(&lifecycle, Command::Test, "").unwrap();
}
