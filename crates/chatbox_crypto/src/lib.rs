//! chatbox_crypto: cryptographic primitives used to box chat messages
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Hashing and signing are exposed as strategy traits so the boxer can be
//!   built with substitutes (adversarial fixtures, future algorithm upgrades).
//!
//! # Module layout
//! - `aead`   : XChaCha20-Poly1305 sealing of headers and bodies
//! - `hash`   : `HashFunction` strategies (SHA-256, BLAKE3)
//! - `signing`: Ed25519 signing keys, prefixed header signatures
//! - `error`  : unified error type

pub mod aead;
pub mod error;
pub mod hash;
pub mod signing;

pub use error::CryptoError;
pub use hash::{constant_time_eq, Blake3Hash, HashFunction, Sha256Hash};
pub use signing::{
    Ed25519Signer, HeaderSigner, SignatureInfo, SignaturePrefix, SigningKeyPair, VerifyKey,
};
