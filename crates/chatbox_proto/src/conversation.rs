//! Conversation identity.
//!
//! A conversation is named by its triple (folder, topic type, topic id).
//! The server-facing `ConversationId` is derived from the triple:
//!
//!   ConversationId = SHA-256(label || len(tlfid) || tlfid || topic_type
//!                            || len(topic_id) || topic_id)[..30] || suffix
//!
//! Every variable-length field is length-prefixed, so two triples that
//! differ in any field never hash the same input. The 2-byte suffix is
//! chosen by the caller (server shard) and is carried by the id itself.

use chatbox_crypto::{HashFunction, Sha256Hash};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::ids::{TlfId, TopicId};

const CONV_ID_LABEL: &[u8] = b"chatbox-conversation-id-v1\x00";
const CONV_ID_LEN: usize = 32;
const SUFFIX_LEN: usize = 2;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize_repr, Deserialize_repr,
)]
#[repr(u8)]
pub enum TopicType {
    #[default]
    None = 0,
    Chat = 1,
    Dev = 2,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ConversationIdTriple {
    pub tlfid: TlfId,
    pub topic_type: TopicType,
    pub topic_id: TopicId,
}

impl ConversationIdTriple {
    fn digest(&self) -> Vec<u8> {
        let mut input = Vec::with_capacity(
            CONV_ID_LABEL.len() + 9 + self.tlfid.as_bytes().len() + self.topic_id.as_bytes().len(),
        );
        input.extend_from_slice(CONV_ID_LABEL);
        push_len_prefixed(&mut input, self.tlfid.as_bytes());
        input.push(self.topic_type as u8);
        push_len_prefixed(&mut input, self.topic_id.as_bytes());
        Sha256Hash.digest(&input)
    }

    pub fn to_conversation_id(&self, suffix: [u8; SUFFIX_LEN]) -> ConversationId {
        let mut id = self.digest();
        id.truncate(CONV_ID_LEN - SUFFIX_LEN);
        id.extend_from_slice(&suffix);
        ConversationId(id)
    }

    /// True when `conv_id` is this triple's id under the suffix it carries.
    pub fn derivable(&self, conv_id: &ConversationId) -> bool {
        match conv_id.suffix() {
            Some(suffix) => self.to_conversation_id(suffix) == *conv_id,
            None => false,
        }
    }
}

fn push_len_prefixed(out: &mut Vec<u8>, field: &[u8]) {
    out.extend_from_slice(&(field.len() as u32).to_be_bytes());
    out.extend_from_slice(field);
}

/// Derived conversation id, hex-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(#[serde(with = "hex")] pub Vec<u8>);

impl ConversationId {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn suffix(&self) -> Option<[u8; SUFFIX_LEN]> {
        if self.0.len() != CONV_ID_LEN {
            return None;
        }
        Some([self.0[CONV_ID_LEN - 2], self.0[CONV_ID_LEN - 1]])
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}
