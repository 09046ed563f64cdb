//! Property-based tests for blind indexing and field encryption
//!
//! 1. **Determinism**: the keyed hash of a value never changes
//! 2. **Verification**: a value verifies against its own hash only
//! 3. **Round-trip**: decrypt(encrypt(m)) == m under both field schemes
//! 4. **Integrity**: flipping any bit of a ciphertext fails authentication

use proptest::prelude::*;
use vault_crypto::{
    AesFieldCipher, CryptoError, FieldCipher, Freshness, VersionedTokenCipher,
    authenticated_decrypt, authenticated_encrypt, constant_time_verify, deterministic_hash,
};

fn key_strategy() -> impl Strategy<Value = [u8; 32]> {
    prop::collection::vec(any::<u8>(), 32..=32).prop_map(|v| {
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&v);
        arr
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_hash_deterministic(key in key_strategy(), value in ".{0,64}") {
        let first = deterministic_hash(&key, &value).unwrap();
        let second = deterministic_hash(&key, &value).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert!(constant_time_verify(&key, &value, &first).unwrap());
    }

    #[test]
    fn prop_hash_distinguishes_values(key in key_strategy(), a in "[a-z0-9]{1,32}", b in "[a-z0-9]{1,32}") {
        prop_assume!(a != b);
        let hash_a = deterministic_hash(&key, &a).unwrap();
        prop_assert!(!constant_time_verify(&key, &b, &hash_a).unwrap());
    }

    #[test]
    fn prop_aes_roundtrip(
        key in key_strategy(),
        plaintext in prop::collection::vec(any::<u8>(), 0..512),
        nonce in any::<[u8; 16]>(),
    ) {
        let ciphertext = authenticated_encrypt(&key, &plaintext, &nonce).unwrap();
        prop_assert_eq!(ciphertext.len(), plaintext.len() + 32);
        prop_assert_eq!(authenticated_decrypt(&key, &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn prop_aes_detects_any_bit_flip(
        key in key_strategy(),
        plaintext in prop::collection::vec(any::<u8>(), 1..64),
        nonce in any::<[u8; 16]>(),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut ciphertext = authenticated_encrypt(&key, &plaintext, &nonce).unwrap();
        let index = position.index(ciphertext.len());
        ciphertext[index] ^= 1 << bit;

        prop_assert_eq!(authenticated_decrypt(&key, &ciphertext), Err(CryptoError::AuthenticationFailure));
    }

    #[test]
    fn prop_field_schemes_roundtrip(
        key in key_strategy(),
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
        nonce in any::<[u8; 16]>(),
        now_secs in any::<u64>(),
    ) {
        let freshness = Freshness { nonce, now_secs };
        let schemes: Vec<Box<dyn FieldCipher>> = vec![
            Box::new(AesFieldCipher::new(&key).unwrap()),
            Box::new(VersionedTokenCipher::new(&key).unwrap()),
        ];

        for scheme in schemes {
            let sealed = scheme.seal(&plaintext, &freshness);
            prop_assert_eq!(scheme.open(&sealed).unwrap(), plaintext.clone());
        }
    }
}

#[test]
fn truncated_ciphertext_is_not_an_authentication_failure() {
    let key = [1u8; 32];
    for len in 0..32 {
        assert_eq!(
            authenticated_decrypt(&key, &vec![0u8; len]),
            Err(CryptoError::Truncated { minimum: 32, actual: len })
        );
    }
}
