//! Signing key management
//!
//! Each *device* of a user owns one Ed25519 `SigningKeyPair`. Chat headers
//! are signed by the sending device; the recipient learns which key signed
//! from `SignatureInfo::k` and asks the identity system whether that key was
//! ever valid for the claimed sender.
//!
//! Domain separation
//! -----------------
//! Signatures never cover raw message bytes. The signed payload is
//!
//!   prefix || 0x00 || message
//!
//! where the prefix names the protocol context (`chatbox-chat-header-v1` for
//! chat headers). A signature produced for one context therefore cannot be
//! replayed into another. Prefixes may not contain NUL.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

/// Version tag stamped on prefixed signatures.
pub const SIGNATURE_VERSION: u8 = 2;

// ── Newtype wrappers ──────────────────────────────────────────────────────────

/// 32-byte Ed25519 public key, hex-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VerifyKey(#[serde(with = "hex")] pub Vec<u8>);

impl VerifyKey {
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "Verify key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// Human-readable fingerprint: BLAKE3 of the key, truncated to 10 bytes,
    /// hex-encoded in groups of 4. Used for log lines only.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        let hex = hex::encode(&hash.as_bytes()[..10]);
        hex.as_bytes()
            .chunks(4)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_dalek(&self) -> Result<VerifyingKey, CryptoError> {
        let arr: [u8; 32] = self
            .0
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("Bad verify key len".into()))?;
        VerifyingKey::from_bytes(&arr).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }
}

impl std::fmt::Display for VerifyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Domain-separation context for a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePrefix(String);

impl SignaturePrefix {
    pub const CHAT_HEADER: &'static str = "chatbox-chat-header-v1";

    pub fn new(prefix: impl Into<String>) -> Result<Self, CryptoError> {
        let prefix = prefix.into();
        if prefix.is_empty() || prefix.as_bytes().contains(&0) {
            return Err(CryptoError::InvalidPrefix(prefix));
        }
        Ok(Self(prefix))
    }

    pub fn chat_header() -> Self {
        Self(Self::CHAT_HEADER.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bytes actually covered by the signature.
    pub fn prefixed(&self, message: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() + 1 + message.len());
        out.extend_from_slice(self.0.as_bytes());
        out.push(0);
        out.extend_from_slice(message);
        out
    }
}

impl Default for SignaturePrefix {
    fn default() -> Self {
        Self::chat_header()
    }
}

/// A detached, prefixed signature and the key that made it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub v: u8,
    #[serde(with = "hex")]
    pub s: Vec<u8>,
    pub k: VerifyKey,
}

// ── Signing keypair ───────────────────────────────────────────────────────────

/// Device signing key.  Drop clears memory via ZeroizeOnDrop.
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    #[zeroize(skip)]
    pub public: VerifyKey,
    secret_bytes: [u8; 32],
}

impl SigningKeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public = VerifyKey(signing_key.verifying_key().to_bytes().to_vec());
        Self {
            public,
            secret_bytes: signing_key.to_bytes(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("Signing key must be 32 bytes, got {}", bytes.len()))
        })?;
        let signing_key = SigningKey::from_bytes(&arr);
        let public = VerifyKey(signing_key.verifying_key().to_bytes().to_vec());
        Ok(Self {
            public,
            secret_bytes: arr,
        })
    }

    pub fn verify_key(&self) -> &VerifyKey {
        &self.public
    }

    /// Sign `message` under `prefix`.
    pub fn sign_prefixed(&self, message: &[u8], prefix: &SignaturePrefix) -> SignatureInfo {
        let sig = SigningKey::from_bytes(&self.secret_bytes).sign(&prefix.prefixed(message));
        SignatureInfo {
            v: SIGNATURE_VERSION,
            s: sig.to_bytes().to_vec(),
            k: self.public.clone(),
        }
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public", &self.public.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Verify a prefixed signature against the key it names.
pub fn verify(
    info: &SignatureInfo,
    message: &[u8],
    prefix: &SignaturePrefix,
) -> Result<(), CryptoError> {
    if info.v != SIGNATURE_VERSION {
        return Err(CryptoError::BadSignature);
    }
    let vk = info.k.to_dalek()?;
    let sig_bytes: [u8; 64] = info
        .s
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::BadSignature)?;
    let sig = Signature::from_bytes(&sig_bytes);
    vk.verify_strict(&prefix.prefixed(message), &sig)
        .map_err(|_| CryptoError::BadSignature)
}

// ── Signing strategy ──────────────────────────────────────────────────────────

/// How the boxer turns a header hash into a `SignatureInfo`.
pub trait HeaderSigner: Send + Sync + std::fmt::Debug {
    fn sign(
        &self,
        key: &SigningKeyPair,
        message: &[u8],
        prefix: &SignaturePrefix,
    ) -> Result<SignatureInfo, CryptoError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Signer;

impl HeaderSigner for Ed25519Signer {
    fn sign(
        &self,
        key: &SigningKeyPair,
        message: &[u8],
        prefix: &SignaturePrefix,
    ) -> Result<SignatureInfo, CryptoError> {
        Ok(key.sign_prefixed(message, prefix))
    }
}
