//! Plaintext message types (before boxing / after unboxing).

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::conversation::ConversationIdTriple;
use crate::ids::{DeviceId, Hash, MessageId, OutboxId, Timestamp, Uid};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize_repr, Deserialize_repr,
)]
#[repr(u8)]
pub enum MessageType {
    #[default]
    None = 0,
    Text = 1,
    Attachment = 2,
    Edit = 3,
    Delete = 4,
    Metadata = 5,
    TlfName = 6,
    Headline = 7,
}

/// Claim about the header hash of an earlier message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePreviousPointer {
    pub id: MessageId,
    pub hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxInfo {
    /// Last message id the sender had seen when composing.
    pub prev: MessageId,
    pub compose_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleRoot {
    pub seqno: i64,
    pub hash: Hash,
}

/// Sender-authored header. The signed copy travels encrypted inside the
/// boxed message; an unauthenticated routing copy travels beside it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientHeader {
    pub conv: ConversationIdTriple,
    pub tlf_name: String,
    pub tlf_public: bool,
    pub message_type: MessageType,
    /// Message being edited or deleted; zero when none.
    pub supersedes: MessageId,
    pub deletes: Vec<MessageId>,
    pub prev: Vec<MessagePreviousPointer>,
    pub sender: Uid,
    pub sender_device: DeviceId,
    pub merkle_root: Option<MerkleRoot>,
    pub outbox_id: Option<OutboxId>,
    pub outbox_info: Option<OutboxInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageText {
    pub body: String,
}

/// Opaque attachment reference; the object itself is encrypted and stored
/// elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttachment {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub storage_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEdit {
    pub message_id: MessageId,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDelete {
    pub message_ids: Vec<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageConversationMetadata {
    pub conversation_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeadline {
    pub headline: String,
}

/// Message content. `Empty` stands for an absent or server-deleted body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    #[default]
    Empty,
    Text(MessageText),
    Attachment(MessageAttachment),
    Edit(MessageEdit),
    Delete(MessageDelete),
    Metadata(MessageConversationMetadata),
    Headline(MessageHeadline),
}

impl MessageBody {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text(MessageText { body: body.into() })
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Empty => MessageType::None,
            Self::Text(_) => MessageType::Text,
            Self::Attachment(_) => MessageType::Attachment,
            Self::Edit(_) => MessageType::Edit,
            Self::Delete(_) => MessageType::Delete,
            Self::Metadata(_) => MessageType::Metadata,
            Self::Headline(_) => MessageType::Headline,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePlaintext {
    pub client_header: ClientHeader,
    pub message_body: MessageBody,
}
