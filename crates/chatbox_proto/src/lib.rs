//! chatbox_proto: Wire types, headers, and serialisation for boxed chat messages
//!
//! All signed encodings are canonical JSON (struct field order) and
//! versioned so older messages keep verifying after the header grows.
//!
//! # Modules
//! - `ids`         : Message ids, key generations, timestamps, hex byte ids
//! - `conversation`: Conversation triples and conversation-id derivation
//! - `message`     : Plaintext headers and message bodies
//! - `envelope`    : The boxed message (what the server stores and relays)
//! - `codec`       : Versioned header/body encoding

pub mod codec;
pub mod conversation;
pub mod envelope;
pub mod ids;
pub mod message;

pub use codec::{CodecError, DecodedHeader};
pub use conversation::{ConversationId, ConversationIdTriple, TopicType};
pub use envelope::{BoxedVersion, EncryptedData, MessageBoxed, ServerHeader};
pub use ids::{DeviceId, Hash, KeyGeneration, MessageId, OutboxId, Timestamp, TlfId, TopicId, Uid};
pub use message::{
    ClientHeader, MerkleRoot, MessageAttachment, MessageBody, MessageConversationMetadata,
    MessageDelete, MessageEdit, MessageHeadline, MessagePlaintext, MessagePreviousPointer,
    MessageText, MessageType, OutboxInfo,
};
