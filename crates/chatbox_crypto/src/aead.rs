//! Sealing of boxed headers and bodies.
//!
//! XChaCha20-Poly1305 with a random 24-byte nonce per seal. The conversation
//! key for the message's generation is the AEAD key.
//!
//! Sealed wire format:
//!   [ nonce (24 bytes) | ciphertext + tag (16 bytes) ]
//!
//! The header and the body are sealed in separate slots, each bound to its
//! own associated-data label. A sealed header never opens as a body.

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng, Payload},
    XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Header,
    Body,
}

impl Slot {
    fn label(self) -> &'static [u8] {
        match self {
            Slot::Header => b"chatbox-header-v1",
            Slot::Body => b"chatbox-body-v1",
        }
    }
}

/// Seal the encoded, signed header.
pub fn seal_header(key: &[u8; 32], header: &[u8]) -> Result<Vec<u8>, CryptoError> {
    seal(key, Slot::Header, header)
}

/// Seal the encoded message body.
pub fn seal_body(key: &[u8; 32], body: &[u8]) -> Result<Vec<u8>, CryptoError> {
    seal(key, Slot::Body, body)
}

pub fn open_header(key: &[u8; 32], sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    open(key, Slot::Header, sealed)
}

pub fn open_body(key: &[u8; 32], sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    open(key, Slot::Body, sealed)
}

fn seal(key: &[u8; 32], slot: Slot, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce = XChaCha20Poly1305::generate_nonce(&mut AeadOsRng);
    let payload = Payload {
        msg: plaintext,
        aad: slot.label(),
    };
    let sealed = XChaCha20Poly1305::new(key.into())
        .encrypt(&nonce, payload)
        .map_err(|_| CryptoError::AeadEncrypt)?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

fn open(key: &[u8; 32], slot: Slot, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    let (nonce, ct) = sealed.split_at(NONCE_LEN);
    let payload = Payload {
        msg: ct,
        aad: slot.label(),
    };
    XChaCha20Poly1305::new(key.into())
        .decrypt(XNonce::from_slice(nonce), payload)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::AeadDecrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_opens_in_its_own_slot() {
        let key = [7u8; 32];
        let sealed = seal_body(&key, b"hello").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + 5 + TAG_LEN);
        assert_eq!(open_body(&key, &sealed).unwrap().as_slice(), b"hello");
    }

    #[test]
    fn slots_do_not_cross() {
        let key = [7u8; 32];
        let header = seal_header(&key, b"{\"conv\":1}").unwrap();
        let body = seal_body(&key, b"hello").unwrap();
        assert!(matches!(open_body(&key, &header), Err(CryptoError::AeadDecrypt)));
        assert!(matches!(open_header(&key, &body), Err(CryptoError::AeadDecrypt)));
        assert!(open_header(&key, &header).is_ok());
    }

    #[test]
    fn wrong_key_or_truncation_fails() {
        let sealed = seal_header(&[1u8; 32], b"header").unwrap();
        assert!(open_header(&[2u8; 32], &sealed).is_err());
        assert!(open_header(&[1u8; 32], &sealed[..NONCE_LEN + TAG_LEN - 1]).is_err());
        assert!(open_body(&[1u8; 32], &[]).is_err());
    }

    #[test]
    fn nonces_are_fresh() {
        let key = [1u8; 32];
        let a = seal_body(&key, b"same").unwrap();
        let b = seal_body(&key, b"same").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
    }
}
