//! Boxing and unboxing error taxonomy.
//!
//! Unboxing failures split into permanent (the message itself is invalid;
//! retrying cannot help) and transient (key material or an external lookup
//! was not available yet). Boxing failures are local and always fatal.

use chatbox_crypto::CryptoError;
use chatbox_proto::{BoxedVersion, CodecError, KeyGeneration, MessageType};

use crate::cache::ChainError;

/// Failure reported by an external capability (key finder, sender validator).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("lookup unavailable: {0}")]
    Unavailable(String),
    #[error("lookup timed out")]
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum BoxingError {
    #[error("Unsupported boxed version: {0}")]
    UnsupportedVersion(BoxedVersion),
    #[error("{body:?} body cannot be boxed as a {header:?} message")]
    BodyTypeMismatch {
        header: MessageType,
        body: MessageType,
    },
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("no key found for {tlf_name}")]
    NoKeyFound { tlf_name: String },
    #[error("key lookup failed: {0}")]
    Lookup(#[from] LookupError),
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnboxingError {
    // ── Permanent ────────────────────────────────────────────────────────────
    #[error("unsupported boxed version: {0}")]
    UnsupportedVersion(BoxedVersion),
    #[error("boxed message has no server header")]
    MissingServerHeader,
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    #[error("malformed body: {0}")]
    MalformedBody(String),
    #[error("failed to decrypt {0}")]
    Decryption(&'static str),
    #[error("key generation mismatch: boxed as {outer}, signed as {inner}")]
    KeyGenerationMismatch {
        outer: KeyGeneration,
        inner: KeyGeneration,
    },
    #[error("body hash does not match signed header")]
    BodyHashInvalid,
    #[error("bad header signature: {0}")]
    BadSignature(String),
    #[error("{body:?} body under a signed {header:?} header")]
    BodyTypeMismatch {
        header: MessageType,
        body: MessageType,
    },
    #[error("sender key not valid: {0}")]
    NoKey(String),
    #[error("sender does not match signed header")]
    SenderMismatch,
    #[error("outer header field {0} does not match signed header")]
    HeaderMismatch(&'static str),
    #[error("conversation id does not match signed header")]
    ConversationIdMismatch,
    #[error(transparent)]
    Chain(#[from] ChainError),

    // ── Transient ────────────────────────────────────────────────────────────
    #[error("no key found for {tlf_name} at generation {key_generation}")]
    NoKeyFound {
        tlf_name: String,
        key_generation: KeyGeneration,
    },
    #[error("lookup failed: {0}")]
    Lookup(#[from] LookupError),
    #[error("cancelled")]
    Cancelled,
}

/// Copyable classification of an `UnboxingError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnboxingErrorKind {
    UnsupportedVersion,
    MissingServerHeader,
    MalformedHeader,
    MalformedBody,
    Decryption,
    KeyGenerationMismatch,
    BodyHashInvalid,
    BadSignature,
    BodyTypeMismatch,
    NoKey,
    SenderMismatch,
    HeaderMismatch,
    ConversationIdMismatch,
    ChainConflict,
    Replay,
    NoKeyFound,
    Lookup,
    Cancelled,
}

impl UnboxingErrorKind {
    pub fn is_permanent(self) -> bool {
        !matches!(self, Self::NoKeyFound | Self::Lookup | Self::Cancelled)
    }
}

impl UnboxingError {
    pub fn kind(&self) -> UnboxingErrorKind {
        match self {
            Self::UnsupportedVersion(_) => UnboxingErrorKind::UnsupportedVersion,
            Self::MissingServerHeader => UnboxingErrorKind::MissingServerHeader,
            Self::MalformedHeader(_) => UnboxingErrorKind::MalformedHeader,
            Self::MalformedBody(_) => UnboxingErrorKind::MalformedBody,
            Self::Decryption(_) => UnboxingErrorKind::Decryption,
            Self::KeyGenerationMismatch { .. } => UnboxingErrorKind::KeyGenerationMismatch,
            Self::BodyHashInvalid => UnboxingErrorKind::BodyHashInvalid,
            Self::BadSignature(_) => UnboxingErrorKind::BadSignature,
            Self::BodyTypeMismatch { .. } => UnboxingErrorKind::BodyTypeMismatch,
            Self::NoKey(_) => UnboxingErrorKind::NoKey,
            Self::SenderMismatch => UnboxingErrorKind::SenderMismatch,
            Self::HeaderMismatch(_) => UnboxingErrorKind::HeaderMismatch,
            Self::ConversationIdMismatch => UnboxingErrorKind::ConversationIdMismatch,
            Self::Chain(ChainError::Conflict { .. }) => UnboxingErrorKind::ChainConflict,
            Self::Chain(ChainError::Replay { .. }) => UnboxingErrorKind::Replay,
            Self::NoKeyFound { .. } => UnboxingErrorKind::NoKeyFound,
            Self::Lookup(_) => UnboxingErrorKind::Lookup,
            Self::Cancelled => UnboxingErrorKind::Cancelled,
        }
    }

    /// Permanent failures must not be retried; the message is recorded as
    /// invalid instead.
    pub fn is_permanent(&self) -> bool {
        self.kind().is_permanent()
    }
}

impl From<CodecError> for UnboxingError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnsupportedVersion(v) => Self::UnsupportedVersion(v),
            CodecError::MalformedBody(msg) => Self::MalformedBody(msg),
            CodecError::MalformedHeader(msg) => Self::MalformedHeader(msg),
            CodecError::Serialization(e) => Self::MalformedHeader(e.to_string()),
        }
    }
}
