//! Fuzz target for ratchet decryption
//!
//! Runs arbitrary headers and ciphertexts through a live receiving session:
//! - Huge message indexes must hit the skip limit, not exhaust memory
//! - Forged headers must never advance the session
//! - Persisted state must survive any sequence of rejected messages

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vault_crypto::{Header, Keypair, RatchetEntropy, RatchetState};

#[derive(Debug, Arbitrary)]
struct Input {
    dh_public: [u8; 32],
    previous_chain_len: u32,
    message_index: u32,
    ciphertext: Vec<u8>,
    state_bytes: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let _ = RatchetState::from_bytes(&input.state_bytes);

    let server = Keypair::from_secret([1; 32]);
    let client = Keypair::from_secret([2; 32]);
    let Ok(shared) = client.agree(&server.public_key()) else {
        return;
    };
    let mut state = RatchetState::new(&shared, &client, server.public_key());
    let Ok(before) = state.to_bytes() else {
        return;
    };

    let header = Header {
        dh_public: input.dh_public,
        previous_chain_len: input.previous_chain_len,
        message_index: input.message_index,
    };
    let entropy = RatchetEntropy { dh_secret: [3; 32], nonce: [4; 24] };
    if state.decrypt(&header, &input.ciphertext, &server.public_key(), &entropy).is_err() {
        let Ok(after) = state.to_bytes() else {
            return;
        };
        assert_eq!(*before, *after, "rejected message changed the session");
    }
});
