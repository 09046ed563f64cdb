//! Fuzz target for versioned token opening
//!
//! Long-lived tokens carry a sealed body that is opened before any signature
//! check, so the opener sees attacker-controlled text. The fuzzer should
//! NEVER panic; malformed tokens must be rejected with an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vault_crypto::VersionedTokenCipher;

fuzz_target!(|data: &str| {
    let Ok(cipher) = VersionedTokenCipher::new(&[0x42; 32]) else {
        return;
    };
    let _ = cipher.open(data);
    let _ = cipher.open_with_ttl(data, u64::MAX, 60);
});
