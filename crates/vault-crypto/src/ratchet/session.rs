//! Double Ratchet session state
//!
//! Each side holds one [`RatchetState`]. Both start from the same shared
//! secret (the X25519 agreement of their static keys) with their own static
//! keypair as the first ratchet key. Whichever side sends first performs a
//! DH step against the peer's static key; the other side follows with a
//! regular DH ratchet when that message arrives.
//!
//! Every operation runs on a copy of the state and replaces `self` only when
//! it succeeds. A forged, tampered or replayed message therefore never
//! advances a chain or consumes a skipped key.
//!
//! # Associated Data
//!
//! The caller's associated data is bound together with the encoded header:
//! `ad || header`. Both peers must agree on `ad`; the vault uses the
//! receiver's static publish key.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{
    chain::{ChainKey, MessageKey},
    derivation::derive_root_step,
    encryption::{self, NONCE_SIZE},
    error::RatchetError,
    header::Header,
};
use crate::Keypair;

/// Maximum message keys skipped in a single chain step.
pub const MAX_SKIP: u32 = 256;

/// Maximum skipped message keys retained across chains; oldest are evicted.
pub const MAX_STORED_SKIPPED: usize = 512;

const STATE_FORMAT: u8 = 1;

/// Fresh randomness consumed by one ratchet operation.
///
/// `dh_secret` is used only if the operation performs a DH ratchet step.
/// `nonce` is used only when encrypting.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct RatchetEntropy {
    /// Secret for a new ratchet keypair
    pub dh_secret: [u8; 32],
    /// AEAD nonce
    pub nonce: [u8; NONCE_SIZE],
}

#[derive(Clone, Serialize, Deserialize)]
struct SkippedKey {
    remote: [u8; 32],
    index: u32,
    key: [u8; 32],
}

impl Drop for SkippedKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// One side of a Double Ratchet session.
#[derive(Clone, Serialize, Deserialize)]
pub struct RatchetState {
    format: u8,
    dh_secret: [u8; 32],
    dh_public: [u8; 32],
    peer_static: [u8; 32],
    remote: Option<[u8; 32]>,
    root_key: [u8; 32],
    sending: Option<ChainKey>,
    receiving: Option<ChainKey>,
    previous_chain_len: u32,
    skipped: Vec<SkippedKey>,
}

impl RatchetState {
    /// Start a session from the static agreement `shared_secret`.
    pub fn new(shared_secret: &[u8; 32], local: &Keypair, peer_static: [u8; 32]) -> Self {
        Self {
            format: STATE_FORMAT,
            dh_secret: *local.secret_bytes(),
            dh_public: local.public_key(),
            peer_static,
            remote: None,
            root_key: *shared_secret,
            sending: None,
            receiving: None,
            previous_chain_len: 0,
            skipped: Vec::new(),
        }
    }

    /// Index of the next outgoing message, or 0 before the first send.
    pub fn sending_index(&self) -> u32 {
        self.sending.as_ref().map_or(0, ChainKey::index)
    }

    /// Index of the next expected incoming message in the current chain.
    pub fn receiving_index(&self) -> u32 {
        self.receiving.as_ref().map_or(0, ChainKey::index)
    }

    /// Number of retained skipped message keys.
    pub fn skipped_keys(&self) -> usize {
        self.skipped.len()
    }

    /// Encrypt one message.
    ///
    /// Returns the header to send alongside the sealed message.
    pub fn encrypt(
        &mut self,
        plaintext: &[u8],
        associated_data: &[u8],
        entropy: &RatchetEntropy,
    ) -> Result<(Header, Vec<u8>), RatchetError> {
        let mut next = self.clone();

        if next.sending.is_none() {
            next.start_sending_chain(&entropy.dh_secret)?;
        }

        let header = Header {
            dh_public: next.dh_public,
            previous_chain_len: next.previous_chain_len,
            message_index: next.sending_index(),
        };

        let Some(chain) = next.sending.as_mut() else {
            unreachable!("sending chain initialized above");
        };
        let message_key = chain.advance()?;

        let aad = bind_header(associated_data, &header);
        let sealed = encryption::seal_message(&message_key, plaintext, &aad, &entropy.nonce);

        *self = next;
        Ok((header, sealed))
    }

    /// Decrypt one message.
    pub fn decrypt(
        &mut self,
        header: &Header,
        sealed: &[u8],
        associated_data: &[u8],
        entropy: &RatchetEntropy,
    ) -> Result<Vec<u8>, RatchetError> {
        let mut next = self.clone();
        let aad = bind_header(associated_data, header);

        if let Some(message_key) = next.take_skipped(header) {
            let plaintext = encryption::open_message(&message_key, sealed, &aad)?;
            *self = next;
            return Ok(plaintext);
        }

        if next.remote != Some(header.dh_public) {
            next.skip_receiving(header.previous_chain_len)?;
            next.ratchet_step(header.dh_public, &entropy.dh_secret)?;
        }

        next.skip_receiving(header.message_index)?;

        let Some(chain) = next.receiving.as_mut() else {
            return Err(RatchetError::malformed("no receiving chain for this ratchet key"));
        };
        if chain.index() != header.message_index {
            return Err(RatchetError::malformed(format!(
                "message index {} already consumed",
                header.message_index
            )));
        }
        let message_key = chain.advance()?;
        let plaintext = encryption::open_message(&message_key, sealed, &aad)?;

        *self = next;
        Ok(plaintext)
    }

    /// Serialize for persistence. The output holds secrets and must be
    /// encrypted before it is stored.
    pub fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, RatchetError> {
        let mut buffer = Zeroizing::new(Vec::new());
        ciborium::into_writer(self, &mut *buffer)
            .map_err(|e| RatchetError::CorruptedState { reason: e.to_string() })?;
        Ok(buffer)
    }

    /// Restore a state produced by [`RatchetState::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RatchetError> {
        let state: Self = ciborium::from_reader(bytes)
            .map_err(|e| RatchetError::CorruptedState { reason: e.to_string() })?;

        if state.format != STATE_FORMAT {
            return Err(RatchetError::CorruptedState {
                reason: format!("unknown state format {}", state.format),
            });
        }
        if Keypair::from_secret(state.dh_secret).public_key() != state.dh_public {
            return Err(RatchetError::CorruptedState {
                reason: "ratchet public key does not match secret".to_string(),
            });
        }

        Ok(state)
    }

    fn start_sending_chain(&mut self, dh_secret: &[u8; 32]) -> Result<(), RatchetError> {
        let remote = self.remote.unwrap_or(self.peer_static);
        let fresh = Keypair::from_secret(*dh_secret);
        let dh_output = fresh.agree(&remote).map_err(RatchetError::KeyAgreement)?;

        let (root_key, chain_key) = derive_root_step(&self.root_key, &dh_output);
        self.root_key = root_key;
        self.sending = Some(ChainKey::new(chain_key));
        self.install_ratchet_key(&fresh);
        self.remote = Some(remote);
        Ok(())
    }

    fn ratchet_step(&mut self, remote: [u8; 32], dh_secret: &[u8; 32]) -> Result<(), RatchetError> {
        self.previous_chain_len = self.sending_index();

        let current = Keypair::from_secret(self.dh_secret);
        let dh_output = current
            .agree(&remote)
            .map_err(|_| RatchetError::malformed("ratchet key is not a valid public key"))?;
        let (root_key, receiving_key) = derive_root_step(&self.root_key, &dh_output);
        self.receiving = Some(ChainKey::new(receiving_key));

        let fresh = Keypair::from_secret(*dh_secret);
        let dh_output = fresh.agree(&remote).map_err(RatchetError::KeyAgreement)?;
        let (root_key, sending_key) = derive_root_step(&root_key, &dh_output);

        self.root_key = root_key;
        self.sending = Some(ChainKey::new(sending_key));
        self.install_ratchet_key(&fresh);
        self.remote = Some(remote);
        Ok(())
    }

    fn install_ratchet_key(&mut self, keypair: &Keypair) {
        self.dh_secret.zeroize();
        self.dh_secret = *keypair.secret_bytes();
        self.dh_public = keypair.public_key();
    }

    fn skip_receiving(&mut self, until: u32) -> Result<(), RatchetError> {
        let Some(remote) = self.remote else {
            return Ok(());
        };
        let Some(chain) = self.receiving.as_mut() else {
            return Ok(());
        };
        if until <= chain.index() {
            return Ok(());
        }

        let gap = until - chain.index();
        if gap > MAX_SKIP {
            return Err(RatchetError::TooManySkipped { requested: gap, limit: MAX_SKIP });
        }

        while chain.index() < until {
            let message_key = chain.advance()?;
            self.skipped.push(SkippedKey {
                remote,
                index: message_key.index(),
                key: *message_key.key(),
            });
        }

        if self.skipped.len() > MAX_STORED_SKIPPED {
            let excess = self.skipped.len() - MAX_STORED_SKIPPED;
            self.skipped.drain(..excess);
        }
        Ok(())
    }

    fn take_skipped(&mut self, header: &Header) -> Option<MessageKey> {
        let position = self
            .skipped
            .iter()
            .position(|s| s.remote == header.dh_public && s.index == header.message_index)?;
        let entry = self.skipped.remove(position);
        Some(MessageKey::from_parts(entry.key, entry.index))
    }
}

impl Drop for RatchetState {
    fn drop(&mut self) {
        self.dh_secret.zeroize();
        self.root_key.zeroize();
    }
}

impl std::fmt::Debug for RatchetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatchetState")
            .field("sending_index", &self.sending_index())
            .field("receiving_index", &self.receiving_index())
            .field("skipped", &self.skipped.len())
            .finish_non_exhaustive()
    }
}

fn bind_header(associated_data: &[u8], header: &Header) -> Vec<u8> {
    let mut aad = Vec::with_capacity(associated_data.len() + super::header::HEADER_SIZE);
    aad.extend_from_slice(associated_data);
    aad.extend_from_slice(&header.to_bytes());
    aad
}
