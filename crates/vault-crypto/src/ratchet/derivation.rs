//! Root-chain key derivation using HKDF

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Label used for root-chain steps
const ROOT_LABEL: &[u8] = b"vaultRatchetRootV1";

/// Mix a Diffie-Hellman output into the root chain.
///
/// Returns `(next_root_key, chain_key)`. The current root key is the HKDF
/// salt and the DH output is the input keying material.
pub fn derive_root_step(root_key: &[u8; 32], dh_output: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let hkdf = Hkdf::<Sha256>::new(Some(root_key), dh_output);

    let mut okm = Zeroizing::new([0u8; 64]);
    let Ok(()) = hkdf.expand(ROOT_LABEL, okm.as_mut_slice()) else {
        unreachable!("64 bytes is a valid HKDF-SHA256 output length");
    };

    let mut next_root = [0u8; 32];
    let mut chain = [0u8; 32];
    next_root.copy_from_slice(&okm[..32]);
    chain.copy_from_slice(&okm[32..]);
    (next_root, chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(derive_root_step(&[1u8; 32], &[2u8; 32]), derive_root_step(&[1u8; 32], &[2u8; 32]));
    }

    #[test]
    fn outputs_are_distinct() {
        let (root, chain) = derive_root_step(&[1u8; 32], &[2u8; 32]);
        assert_ne!(root, chain);
        assert_ne!(root, [1u8; 32]);
    }

    #[test]
    fn both_inputs_matter() {
        let base = derive_root_step(&[1u8; 32], &[2u8; 32]);
        assert_ne!(base, derive_root_step(&[9u8; 32], &[2u8; 32]));
        assert_ne!(base, derive_root_step(&[1u8; 32], &[9u8; 32]));
    }
}
