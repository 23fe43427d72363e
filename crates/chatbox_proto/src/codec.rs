//! Versioned header and body codec.
//!
//! The header encoding is the byte sequence that gets hashed and signed, so
//! it must be deterministic: serde_json emits struct fields in declaration
//! order with no whitespace, and `HeaderPlaintextV1` fixes that order.
//!
//! Legacy (`VNone`) and `V1` share one layout. Fields added after the
//! legacy format (`supersedes`, `deletes`, `merkle_root`) are omitted when
//! empty on encode and default on decode, so old signed headers still
//! parse and their original bytes still hash to the signed value.
//!
//! `V2` is reserved and rejected in both directions.

use serde::{Deserialize, Serialize};

use crate::conversation::ConversationIdTriple;
use crate::envelope::BoxedVersion;
use crate::ids::{DeviceId, Hash, KeyGeneration, MessageId, OutboxId, Uid};
use crate::message::{
    ClientHeader, MerkleRoot, MessageBody, MessagePreviousPointer, MessageType, OutboxInfo,
};

/// Upper bound on an encoded header. Anything larger is refused before
/// JSON parsing.
pub const MAX_HEADER_LEN: usize = 64 * 1024;

/// The signed header, as laid out on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct HeaderPlaintextV1 {
    conv: ConversationIdTriple,
    tlf_name: String,
    tlf_public: bool,
    message_type: MessageType,
    prev: Vec<MessagePreviousPointer>,
    sender: Uid,
    sender_device: DeviceId,
    body_hash: Hash,
    key_generation: KeyGeneration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outbox_info: Option<OutboxInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outbox_id: Option<OutboxId>,
    #[serde(default, skip_serializing_if = "MessageId::is_zero")]
    supersedes: MessageId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    deletes: Vec<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    merkle_root: Option<MerkleRoot>,
}

/// A decoded signed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHeader {
    pub client_header: ClientHeader,
    pub body_hash: Hash,
    pub key_generation: KeyGeneration,
}

fn check_version(version: BoxedVersion) -> Result<(), CodecError> {
    match version {
        BoxedVersion::VNone | BoxedVersion::V1 => Ok(()),
        BoxedVersion::V2 => Err(CodecError::UnsupportedVersion(version)),
    }
}

/// Canonical header bytes. Equal inputs always give identical output.
pub fn encode_header(
    header: &ClientHeader,
    body_hash: &Hash,
    key_generation: KeyGeneration,
    version: BoxedVersion,
) -> Result<Vec<u8>, CodecError> {
    check_version(version)?;
    let wire = HeaderPlaintextV1 {
        conv: header.conv.clone(),
        tlf_name: header.tlf_name.clone(),
        tlf_public: header.tlf_public,
        message_type: header.message_type,
        prev: header.prev.clone(),
        sender: header.sender.clone(),
        sender_device: header.sender_device.clone(),
        body_hash: body_hash.clone(),
        key_generation,
        outbox_info: header.outbox_info.clone(),
        outbox_id: header.outbox_id.clone(),
        supersedes: header.supersedes,
        deletes: header.deletes.clone(),
        merkle_root: header.merkle_root.clone(),
    };
    let bytes = serde_json::to_vec(&wire)?;
    if bytes.len() > MAX_HEADER_LEN {
        return Err(CodecError::MalformedHeader(format!(
            "encoded header is {} bytes, limit is {MAX_HEADER_LEN}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

pub fn decode_header(bytes: &[u8], version: BoxedVersion) -> Result<DecodedHeader, CodecError> {
    check_version(version)?;
    if bytes.len() > MAX_HEADER_LEN {
        return Err(CodecError::MalformedHeader(format!(
            "header is {} bytes, limit is {MAX_HEADER_LEN}",
            bytes.len()
        )));
    }
    let wire: HeaderPlaintextV1 = serde_json::from_slice(bytes)
        .map_err(|e| CodecError::MalformedHeader(e.to_string()))?;
    Ok(DecodedHeader {
        client_header: ClientHeader {
            conv: wire.conv,
            tlf_name: wire.tlf_name,
            tlf_public: wire.tlf_public,
            message_type: wire.message_type,
            supersedes: wire.supersedes,
            deletes: wire.deletes,
            prev: wire.prev,
            sender: wire.sender,
            sender_device: wire.sender_device,
            merkle_root: wire.merkle_root,
            outbox_id: wire.outbox_id,
            outbox_info: wire.outbox_info,
        },
        body_hash: wire.body_hash,
        key_generation: wire.key_generation,
    })
}

pub fn encode_body(body: &MessageBody, version: BoxedVersion) -> Result<Vec<u8>, CodecError> {
    check_version(version)?;
    Ok(serde_json::to_vec(body)?)
}

pub fn decode_body(bytes: &[u8], version: BoxedVersion) -> Result<MessageBody, CodecError> {
    check_version(version)?;
    serde_json::from_slice(bytes).map_err(|e| CodecError::MalformedBody(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed header: {0}")]
    MalformedHeader(String),
    #[error("Malformed body: {0}")]
    MalformedBody(String),
    #[error("Unsupported boxed version: {0}")]
    UnsupportedVersion(BoxedVersion),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::TopicType;
    use crate::ids::{TlfId, TopicId};
    use crate::message::MessageDelete;

    fn header() -> ClientHeader {
        ClientHeader {
            conv: ConversationIdTriple {
                tlfid: TlfId::new(vec![1; 16]),
                topic_type: TopicType::Chat,
                topic_id: TopicId::new(vec![2; 16]),
            },
            tlf_name: "alice,bob".into(),
            tlf_public: false,
            message_type: MessageType::Text,
            prev: vec![MessagePreviousPointer {
                id: MessageId(1),
                hash: Hash::new(vec![0xaa; 32]),
            }],
            sender: Uid::new(vec![3; 16]),
            sender_device: DeviceId::new(vec![4; 16]),
            ..Default::default()
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let h = header();
        let bh = Hash::new(vec![9; 32]);
        let a = encode_header(&h, &bh, KeyGeneration(1), BoxedVersion::V1).unwrap();
        let b = encode_header(&h.clone(), &bh, KeyGeneration(1), BoxedVersion::V1).unwrap();
        assert_eq!(a, b);
        // Legacy and V1 share a layout.
        let legacy = encode_header(&h, &bh, KeyGeneration(1), BoxedVersion::VNone).unwrap();
        assert_eq!(a, legacy);
    }

    #[test]
    fn header_decodes_to_inputs() {
        let mut h = header();
        h.message_type = MessageType::Edit;
        h.supersedes = MessageId(3);
        h.deletes = vec![MessageId(5)];
        let bh = Hash::new(vec![9; 32]);
        let bytes = encode_header(&h, &bh, KeyGeneration(7), BoxedVersion::V1).unwrap();
        let decoded = decode_header(&bytes, BoxedVersion::V1).unwrap();
        assert_eq!(decoded.client_header, h);
        assert_eq!(decoded.body_hash, bh);
        assert_eq!(decoded.key_generation, KeyGeneration(7));
    }

    #[test]
    fn empty_later_fields_are_omitted() {
        let bytes = encode_header(
            &header(),
            &Hash::new(vec![9; 32]),
            KeyGeneration(1),
            BoxedVersion::V1,
        )
        .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("supersedes"));
        assert!(!text.contains("deletes"));
        assert!(!text.contains("merkle_root"));
        assert!(text.starts_with(r#"{"conv":{"tlfid":""#));
    }

    #[test]
    fn legacy_header_defaults_missing_fields() {
        let legacy = br#"{"conv":{"tlfid":"01","topic_type":1,"topic_id":"02"},"tlf_name":"a,b","tlf_public":false,"message_type":1,"prev":[],"sender":"03","sender_device":"04","body_hash":"0909","key_generation":1}"#;
        let decoded = decode_header(legacy, BoxedVersion::VNone).unwrap();
        assert!(decoded.client_header.supersedes.is_zero());
        assert!(decoded.client_header.deletes.is_empty());
        assert!(decoded.client_header.merkle_root.is_none());
        assert_eq!(decoded.body_hash, Hash::new(vec![9, 9]));
    }

    #[test]
    fn v2_is_rejected() {
        let bh = Hash::new(vec![9; 32]);
        let err = encode_header(&header(), &bh, KeyGeneration(1), BoxedVersion::V2).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedVersion(BoxedVersion::V2)));
        assert!(matches!(
            decode_header(b"{}", BoxedVersion::V2),
            Err(CodecError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            encode_body(&MessageBody::text("hi"), BoxedVersion::V2),
            Err(CodecError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            decode_header(b"not json", BoxedVersion::V1),
            Err(CodecError::MalformedHeader(_))
        ));
        assert!(matches!(
            decode_body(b"{\"type\":\"nope\"}", BoxedVersion::V1),
            Err(CodecError::MalformedBody(_))
        ));
        let huge = vec![b' '; MAX_HEADER_LEN + 1];
        assert!(matches!(
            decode_header(&huge, BoxedVersion::V1),
            Err(CodecError::MalformedHeader(_))
        ));
    }

    #[test]
    fn body_round_trip() {
        let body = MessageBody::Delete(MessageDelete {
            message_ids: vec![MessageId(2)],
        });
        let bytes = encode_body(&body, BoxedVersion::V1).unwrap();
        assert_eq!(decode_body(&bytes, BoxedVersion::V1).unwrap(), body);
    }
}
