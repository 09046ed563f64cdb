//! Payload envelope
//!
//! Header and ciphertext travel together as one base64 blob:
//!
//! ```text
//! base64( header_len (4, LE) || header || ciphertext )
//! ```
//!
//! Decoding only checks structure. Whether the header parses and the
//! ciphertext authenticates is decided by the ratchet.

use base64::{Engine, engine::general_purpose::STANDARD};

use super::error::EnvelopeError;

const LENGTH_PREFIX: usize = 4;

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Raw header bytes
    pub header: Vec<u8>,
    /// Sealed message
    pub ciphertext: Vec<u8>,
}

/// Pack a header and ciphertext into a base64 blob.
pub fn encode_envelope(header: &[u8], ciphertext: &[u8]) -> String {
    let mut payload = Vec::with_capacity(LENGTH_PREFIX + header.len() + ciphertext.len());
    payload.extend_from_slice(&(header.len() as u32).to_le_bytes());
    payload.extend_from_slice(header);
    payload.extend_from_slice(ciphertext);
    STANDARD.encode(payload)
}

/// Split a base64 blob into header and ciphertext.
pub fn decode_envelope(blob: &str) -> Result<Envelope, EnvelopeError> {
    let payload = STANDARD.decode(blob.trim()).map_err(|_| EnvelopeError::InvalidEncoding)?;

    if payload.len() < LENGTH_PREFIX {
        return Err(EnvelopeError::Truncated { actual: payload.len() });
    }

    let (prefix, rest) = payload.split_at(LENGTH_PREFIX);
    let mut length = [0u8; LENGTH_PREFIX];
    length.copy_from_slice(prefix);
    let declared = u32::from_le_bytes(length) as usize;

    if declared > rest.len() {
        return Err(EnvelopeError::HeaderOverflow { declared, available: rest.len() });
    }

    let (header, ciphertext) = rest.split_at(declared);
    Ok(Envelope { header: header.to_vec(), ciphertext: ciphertext.to_vec() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_is_little_endian() {
        let blob = encode_envelope(&[1u8; 40], b"ct");
        let raw = STANDARD.decode(blob).unwrap();
        assert_eq!(&raw[..4], &[40, 0, 0, 0]);
    }

    #[test]
    fn decode_splits_at_declared_length() {
        let envelope = decode_envelope(&encode_envelope(b"head", b"body")).unwrap();
        assert_eq!(envelope.header, b"head");
        assert_eq!(envelope.ciphertext, b"body");
    }

    #[test]
    fn empty_ciphertext_is_structurally_valid() {
        let envelope = decode_envelope(&encode_envelope(b"head", b"")).unwrap();
        assert!(envelope.ciphertext.is_empty());
    }

    #[test]
    fn rejects_non_base64() {
        assert_eq!(decode_envelope("not*base64"), Err(EnvelopeError::InvalidEncoding));
    }

    #[test]
    fn rejects_missing_prefix() {
        assert_eq!(decode_envelope(&STANDARD.encode([1u8, 2])), Err(EnvelopeError::Truncated { actual: 2 }));
    }

    #[test]
    fn rejects_overlong_header() {
        let mut raw = 100u32.to_le_bytes().to_vec();
        raw.extend_from_slice(&[0u8; 10]);
        assert_eq!(
            decode_envelope(&STANDARD.encode(raw)),
            Err(EnvelopeError::HeaderOverflow { declared: 100, available: 10 })
        );
    }
}
