//! Fuzz target for envelope and header decoding
//!
//! Client payloads arrive as base64 text wrapping a length-prefixed header
//! and ciphertext. This fuzzer feeds arbitrary strings through both layers to
//! find:
//! - Panics on truncated or oversized length prefixes
//! - Header lengths that slip past validation
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vault_crypto::{Header, decode_envelope};

fuzz_target!(|data: &str| {
    if let Ok(envelope) = decode_envelope(data) {
        let _ = Header::from_bytes(&envelope.header);
    }
});
