//! Blind indexing primitives
//!
//! Lookup columns store a keyed hash of the value so a record can be found by
//! value without the value ever being written. Confidential columns store the
//! value under AES-256 in EAX mode with a 16-byte random nonce.
//!
//! # Ciphertext Layout
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────────────────┐
//! │ nonce (16)   │ tag (16)     │ ciphertext (len(pt))    │
//! └──────────────┴──────────────┴─────────────────────────┘
//! ```
//!
//! Both keys must be exactly [`KEY_SIZE`] bytes. Key length is checked before
//! any work is done.

use aes::Aes256;
use eax::{
    Eax,
    aead::{AeadInPlace, KeyInit, generic_array::GenericArray},
};
use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::CryptoError;

type HmacSha512 = Hmac<Sha512>;

/// AES-256-EAX with a 16-byte nonce and 16-byte tag.
type Aes256Eax = Eax<Aes256>;

/// Required key length for hashing and field encryption
pub const KEY_SIZE: usize = 32;

/// Nonce length in the ciphertext prefix
pub const NONCE_SIZE: usize = 16;

/// Authentication tag length in the ciphertext prefix
pub const TAG_SIZE: usize = 16;

/// Fixed prefix before the ciphertext body
pub const PREFIX_SIZE: usize = NONCE_SIZE + TAG_SIZE;

fn check_key(key: &[u8]) -> Result<(), CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength { expected: KEY_SIZE, actual: key.len() });
    }
    Ok(())
}

fn keyed_mac(key: &[u8], message: &str) -> HmacSha512 {
    let Ok(mut mac) = <HmacSha512 as Mac>::new_from_slice(key) else {
        unreachable!("HMAC-SHA512 accepts any key size");
    };
    mac.update(message.as_bytes());
    mac
}

/// Keyed HMAC-SHA512 of `message`, lowercase hex.
///
/// Deterministic: the same key and message always hash to the same string, so
/// the digest can serve as an equality index.
pub fn deterministic_hash(key: &[u8], message: &str) -> Result<String, CryptoError> {
    check_key(key)?;
    Ok(hex::encode(keyed_mac(key, message).finalize().into_bytes()))
}

/// Recompute the keyed hash of `message` and compare it with `expected` in
/// constant time.
///
/// A malformed `expected` (not hex, wrong length) is a mismatch, not an error.
pub fn constant_time_verify(
    key: &[u8],
    message: &str,
    expected: &str,
) -> Result<bool, CryptoError> {
    check_key(key)?;
    let Ok(expected) = hex::decode(expected) else {
        return Ok(false);
    };
    Ok(keyed_mac(key, message).verify_slice(&expected).is_ok())
}

fn field_cipher(key: &[u8]) -> Result<Aes256Eax, CryptoError> {
    check_key(key)?;
    <Aes256Eax as KeyInit>::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidKeyLength { expected: KEY_SIZE, actual: key.len() })
}

fn seal_with(cipher: &Aes256Eax, plaintext: &[u8], nonce: &[u8; NONCE_SIZE]) -> Vec<u8> {
    let mut body = plaintext.to_vec();
    let Ok(tag) = cipher.encrypt_in_place_detached(GenericArray::from_slice(nonce), b"", &mut body)
    else {
        unreachable!("EAX encryption has no plaintext length limit");
    };

    let mut output = Vec::with_capacity(PREFIX_SIZE + body.len());
    output.extend_from_slice(nonce);
    output.extend_from_slice(&tag);
    output.extend_from_slice(&body);
    output
}

fn open_with(cipher: &Aes256Eax, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < PREFIX_SIZE {
        return Err(CryptoError::Truncated { minimum: PREFIX_SIZE, actual: ciphertext.len() });
    }

    let (nonce, rest) = ciphertext.split_at(NONCE_SIZE);
    let (tag, body) = rest.split_at(TAG_SIZE);

    let mut buffer = body.to_vec();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            b"",
            &mut buffer,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CryptoError::AuthenticationFailure)?;

    Ok(buffer)
}

/// Encrypt `plaintext` under `key` with AES-256-EAX.
///
/// Returns `nonce || tag || ciphertext`. The caller supplies the nonce and
/// MUST use fresh random bytes for each call in production.
pub fn authenticated_encrypt(
    key: &[u8],
    plaintext: &[u8],
    nonce: &[u8; NONCE_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = field_cipher(key)?;
    Ok(seal_with(&cipher, plaintext, nonce))
}

/// Decrypt the output of [`authenticated_encrypt`].
///
/// Fails with [`CryptoError::Truncated`] if the input is shorter than the
/// fixed prefix, and [`CryptoError::AuthenticationFailure`] on any tampering
/// or key mismatch.
pub fn authenticated_decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = field_cipher(key)?;
    open_with(&cipher, ciphertext)
}
