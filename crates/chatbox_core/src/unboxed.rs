//! Unboxing outcomes.

use chatbox_crypto::{SignatureInfo, VerifyKey};
use chatbox_proto::{
    BoxedVersion, ClientHeader, Hash, MessageBody, MessageId, MessageType, ServerHeader, Timestamp,
};

use crate::error::UnboxingErrorKind;

/// A message that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnboxedMessageValid {
    /// The signed header, as decrypted.
    pub client_header: ClientHeader,
    pub server_header: ServerHeader,
    pub message_body: MessageBody,
    pub sender_username: String,
    pub sender_device_name: String,
    pub sender_device_type: String,
    pub header_hash: Hash,
    /// Body hash from the signed header.
    pub body_hash: Hash,
    pub header_signature: Option<SignatureInfo>,
    /// Signing key, for versions that expose it. `None` for legacy messages.
    pub verification_key: Option<VerifyKey>,
    /// Set when the signing key was valid at send time but has since been
    /// revoked.
    pub sender_device_revoked_at: Option<Timestamp>,
}

impl UnboxedMessageValid {
    pub fn message_id(&self) -> MessageId {
        self.server_header.message_id
    }

    /// True when the server had stripped the body.
    pub fn is_deleted(&self) -> bool {
        self.message_body.is_empty()
    }
}

/// Placeholder for a message that failed permanently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnboxedError {
    pub kind: UnboxingErrorKind,
    pub message: String,
    pub message_id: MessageId,
    /// Taken from the unauthenticated outer header.
    pub message_type: MessageType,
    pub version: BoxedVersion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnboxedMessage {
    Valid(UnboxedMessageValid),
    Error(UnboxedError),
}

impl UnboxedMessage {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn valid(&self) -> Option<&UnboxedMessageValid> {
        match self {
            Self::Valid(m) => Some(m),
            Self::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&UnboxedError> {
        match self {
            Self::Valid(_) => None,
            Self::Error(e) => Some(e),
        }
    }

    pub fn message_id(&self) -> MessageId {
        match self {
            Self::Valid(m) => m.message_id(),
            Self::Error(e) => e.message_id,
        }
    }
}
