//! Ratchet message header
//!
//! Fixed 40-byte wire form, big-endian counters:
//!
//! ```text
//! ┌──────────────────────┬──────────────┬──────────────┐
//! │ ratchet public (32)  │ prev len (4) │ index (4)    │
//! └──────────────────────┴──────────────┴──────────────┘
//! ```

use super::error::RatchetError;

/// Encoded header length
pub const HEADER_SIZE: usize = 40;

/// Per-message ratchet metadata, sent in the clear and authenticated as
/// associated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Sender's current ratchet public key
    pub dh_public: [u8; 32],
    /// Length of the sender's previous sending chain
    pub previous_chain_len: u32,
    /// Index of this message in the sender's current chain
    pub message_index: u32,
}

impl Header {
    /// Encode into the fixed wire form.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..32].copy_from_slice(&self.dh_public);
        bytes[32..36].copy_from_slice(&self.previous_chain_len.to_be_bytes());
        bytes[36..].copy_from_slice(&self.message_index.to_be_bytes());
        bytes
    }

    /// Decode the wire form. Any length other than [`HEADER_SIZE`] is
    /// malformed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RatchetError> {
        if bytes.len() != HEADER_SIZE {
            return Err(RatchetError::malformed(format!(
                "expected {HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let mut dh_public = [0u8; 32];
        dh_public.copy_from_slice(&bytes[..32]);

        let mut previous = [0u8; 4];
        previous.copy_from_slice(&bytes[32..36]);
        let mut index = [0u8; 4];
        index.copy_from_slice(&bytes[36..]);

        Ok(Self {
            dh_public,
            previous_chain_len: u32::from_be_bytes(previous),
            message_index: u32::from_be_bytes(index),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_big_endian() {
        let header = Header { dh_public: [0xaa; 32], previous_chain_len: 1, message_index: 0x0102_0304 };
        let bytes = header.to_bytes();

        assert_eq!(&bytes[32..36], &[0, 0, 0, 1]);
        assert_eq!(&bytes[36..], &[1, 2, 3, 4]);
        assert_eq!(Header::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn wrong_length_is_malformed() {
        assert!(matches!(Header::from_bytes(&[0u8; 39]), Err(RatchetError::MalformedHeader { .. })));
        assert!(matches!(Header::from_bytes(&[0u8; 41]), Err(RatchetError::MalformedHeader { .. })));
        assert!(matches!(Header::from_bytes(&[]), Err(RatchetError::MalformedHeader { .. })));
    }
}
