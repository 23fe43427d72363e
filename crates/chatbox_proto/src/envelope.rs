//! Boxed message envelope: what the server stores and relays.
//!
//! The server sees:
//!   - the outer client header (routing copy: conversation, folder, type)
//!   - header_ciphertext (signed header, encrypted)
//!   - body_ciphertext (opaque; empty means "deleted")
//!   - header_signature over the hash of the signed header
//!   - key_generation (which conversation key to decrypt with)
//!
//! The server assigns the ServerHeader after boxing. Nothing in it is
//! covered by the sender's signature.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use chatbox_crypto::SignatureInfo;

use crate::ids::{KeyGeneration, MessageId, Timestamp};
use crate::message::ClientHeader;

/// Wire version of a boxed message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize_repr, Deserialize_repr,
)]
#[repr(u8)]
pub enum BoxedVersion {
    /// Legacy, unversioned messages. Same header format as V1.
    VNone = 0,
    #[default]
    V1 = 1,
    /// Reserved.
    V2 = 2,
}

impl std::fmt::Display for BoxedVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VNone => f.write_str("vnone"),
            Self::V1 => f.write_str("v1"),
            Self::V2 => f.write_str("v2"),
        }
    }
}

/// Ciphertext with its format version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EncryptedData {
    pub v: u8,
    #[serde(with = "hex")]
    pub e: Vec<u8>,
}

impl EncryptedData {
    pub fn new(v: u8, e: Vec<u8>) -> Self {
        Self { v, e }
    }

    pub fn is_empty(&self) -> bool {
        self.e.is_empty()
    }
}

/// Server-assigned metadata. Unauthenticated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerHeader {
    pub message_id: MessageId,
    #[serde(default)]
    pub superseded_by: MessageId,
    pub ctime: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBoxed {
    pub version: BoxedVersion,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_header: Option<ServerHeader>,

    /// Routing copy. Checked against the signed header on unbox.
    pub client_header: ClientHeader,

    pub header_ciphertext: EncryptedData,

    pub body_ciphertext: EncryptedData,

    pub header_signature: SignatureInfo,

    pub key_generation: KeyGeneration,
}

impl MessageBoxed {
    pub fn message_id(&self) -> MessageId {
        self.server_header
            .as_ref()
            .map(|h| h.message_id)
            .unwrap_or_default()
    }

    /// True when the server has stripped the body.
    pub fn is_deleted(&self) -> bool {
        self.body_ciphertext.is_empty()
    }
}
