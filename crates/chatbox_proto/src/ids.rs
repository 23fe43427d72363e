//! Identifier newtypes.
//!
//! Byte identifiers (users, devices, folders, topics, hashes) are
//! hex-encoded on the wire. Message ids are server-assigned sequence
//! numbers within a conversation; 0 means "none".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! byte_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        pub struct $name(#[serde(with = "hex")] pub Vec<u8>);

        impl $name {
            pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
                Self(bytes.into())
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn to_hex(&self) -> String {
                hex::encode(&self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                hex::decode(s).map(Self)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }
        }
    };
}

byte_id!(
    /// User identity.
    Uid
);
byte_id!(
    /// Sending device.
    DeviceId
);
byte_id!(
    /// Identity folder (the set of users a conversation belongs to).
    TlfId
);
byte_id!(TopicId);
byte_id!(
    /// Client-local dedup token for a message still in the outbox.
    OutboxId
);
byte_id!(
    /// Output of the configured hash function (header hash, body hash).
    Hash
);

/// Server-assigned sequence number within one conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generation of a conversation's symmetric key. Monotonically increasing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct KeyGeneration(pub u32);

impl std::fmt::Display for KeyGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }

    /// `None` when the value is outside chrono's representable range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }

    pub fn plus_millis(self, ms: i64) -> Self {
        Self(self.0.saturating_add(ms))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_ids_serialize_as_hex() {
        let uid = Uid::new(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(serde_json::to_string(&uid).unwrap(), "\"deadbeef\"");
        let back: Uid = serde_json::from_str("\"deadbeef\"").unwrap();
        assert_eq!(back, uid);
        assert_eq!(uid.to_string(), "deadbeef");
    }

    #[test]
    fn bad_hex_is_rejected() {
        assert!(serde_json::from_str::<Hash>("\"zz\"").is_err());
        assert!(Hash::from_hex("abc").is_err());
    }

    #[test]
    fn numeric_ids_are_transparent() {
        assert_eq!(serde_json::to_string(&MessageId(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&KeyGeneration(3)).unwrap(), "3");
        assert_eq!(
            serde_json::to_string(&Timestamp(1487708373568)).unwrap(),
            "1487708373568"
        );
        assert!(MessageId::default().is_zero());
    }

    #[test]
    fn timestamp_datetime_conversion() {
        let ts = Timestamp(1487708373568);
        let dt = ts.to_datetime().unwrap();
        assert_eq!(Timestamp::from(dt), ts);
        assert!(ts < ts.plus_millis(1));
    }
}
