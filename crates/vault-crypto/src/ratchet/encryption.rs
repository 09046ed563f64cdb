//! Message encryption using `XChaCha20-Poly1305`
//!
//! Pure functions: the nonce is supplied by the caller. The sealed form is
//! `nonce (24) || ciphertext || tag (16)`.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};

use super::{chain::MessageKey, error::RatchetError};

/// `XChaCha20` nonce length
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size
const POLY1305_TAG_SIZE: usize = 16;

/// Seal `plaintext` under a one-time message key.
pub fn seal_message(
    message_key: &MessageKey,
    plaintext: &[u8],
    associated_data: &[u8],
    nonce: &[u8; NONCE_SIZE],
) -> Vec<u8> {
    let cipher = XChaCha20Poly1305::new(message_key.key().into());

    let Ok(ciphertext) =
        cipher.encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad: associated_data })
    else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(nonce);
    sealed.extend_from_slice(&ciphertext);
    sealed
}

/// Open a message sealed by [`seal_message`].
///
/// Input too short to hold a nonce and tag is treated as an authentication
/// failure: it cannot have come from a valid sender.
pub fn open_message(
    message_key: &MessageKey,
    sealed: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>, RatchetError> {
    if sealed.len() < NONCE_SIZE + POLY1305_TAG_SIZE {
        return Err(RatchetError::AuthenticationFailure);
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(message_key.key().into());

    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad: associated_data })
        .map_err(|_| RatchetError::AuthenticationFailure)
}
