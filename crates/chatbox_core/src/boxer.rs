//! The message boxer.
//!
//! Boxing:
//!   body_ct     = AEAD(key, encode_body(body))
//!   body_hash   = H(body_ct)
//!   header      = encode_header(client_header, body_hash, key_generation)
//!   header_hash = H(header)
//!   signature   = Sign(prefix || 0x00 || header_hash)
//!   header_ct   = AEAD(key, header)
//!
//! Unboxing runs the checks in a fixed order and stops at the first
//! failure: version and server header, header decryption and decoding,
//! key generation, body decryption and body hash, signature, body type
//! against the signed message type, sender key validity at the server's
//! ctime, then outer-vs-signed header agreement.
//! `unbox_message` adds key resolution, conversation binding, and the
//! hash-chain and replay records.
//!
//! External lookups race the caller's `CancellationToken`. Cache records
//! are written only after every lookup has finished, so a cancelled call
//! never leaves a partial record behind.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use chatbox_crypto::aead;
use chatbox_crypto::signing;
use chatbox_crypto::{
    constant_time_eq, Ed25519Signer, HashFunction, HeaderSigner, SignaturePrefix, SigningKeyPair,
    VerifyKey,
};
use chatbox_proto::codec::{self, DecodedHeader};
use chatbox_proto::{
    BoxedVersion, ClientHeader, ConversationId, EncryptedData, Hash, MessageBody, MessageBoxed,
    MessagePlaintext, MessageType, ServerHeader, Timestamp, Uid,
};

use crate::cache::HashChainCache;
use crate::config::{BoxerConfig, ConfigError};
use crate::error::{BoxingError, LookupError, UnboxingError};
use crate::keys::{
    CryptKey, KeyFinder, SenderInfoResolver, SenderKeyStatus, SenderValidator, StaticSenderInfo,
};
use crate::unboxed::{UnboxedError, UnboxedMessage, UnboxedMessageValid};

/// Format tag stamped on `EncryptedData` produced by the boxer.
pub const ENCRYPTED_DATA_VERSION: u8 = 1;

pub struct BoxerBuilder {
    config: BoxerConfig,
    hash: Option<Arc<dyn HashFunction>>,
    signer: Option<Arc<dyn HeaderSigner>>,
    sender_validator: Arc<dyn SenderValidator>,
    sender_info: Option<Arc<dyn SenderInfoResolver>>,
    cache: Option<Arc<HashChainCache>>,
}

impl BoxerBuilder {
    pub fn new(sender_validator: Arc<dyn SenderValidator>) -> Self {
        Self {
            config: BoxerConfig::default(),
            hash: None,
            signer: None,
            sender_validator,
            sender_info: None,
            cache: None,
        }
    }

    pub fn config(mut self, config: BoxerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the configured hash function.
    pub fn hash_function(mut self, hash: Arc<dyn HashFunction>) -> Self {
        self.hash = Some(hash);
        self
    }

    pub fn signer(mut self, signer: Arc<dyn HeaderSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn sender_info(mut self, resolver: Arc<dyn SenderInfoResolver>) -> Self {
        self.sender_info = Some(resolver);
        self
    }

    /// Share a cache between boxers. Each boxer gets its own otherwise.
    pub fn cache(mut self, cache: Arc<HashChainCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<Boxer, ConfigError> {
        let Self {
            config,
            hash,
            signer,
            sender_validator,
            sender_info,
            cache,
        } = self;
        config.validate()?;
        Ok(Boxer {
            hash: hash.unwrap_or_else(|| config.hash.function()),
            signer: signer.unwrap_or_else(|| Arc::new(Ed25519Signer)),
            prefix: config.prefix()?,
            version: config.boxed_version,
            sender_validator,
            sender_info: sender_info.unwrap_or_else(|| Arc::new(StaticSenderInfo::default())),
            cache: cache.unwrap_or_default(),
        })
    }
}

pub struct Boxer {
    hash: Arc<dyn HashFunction>,
    signer: Arc<dyn HeaderSigner>,
    prefix: SignaturePrefix,
    version: BoxedVersion,
    sender_validator: Arc<dyn SenderValidator>,
    sender_info: Arc<dyn SenderInfoResolver>,
    cache: Arc<HashChainCache>,
}

impl std::fmt::Debug for Boxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Boxer")
            .field("hash", &self.hash.name())
            .field("prefix", &self.prefix.as_str())
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl Boxer {
    pub fn builder(sender_validator: Arc<dyn SenderValidator>) -> BoxerBuilder {
        BoxerBuilder::new(sender_validator)
    }

    pub fn cache(&self) -> &Arc<HashChainCache> {
        &self.cache
    }

    pub fn version(&self) -> BoxedVersion {
        self.version
    }

    // ── Boxing ───────────────────────────────────────────────────────────────

    /// Encrypt and sign `msg` under `key`. The server header is left unset.
    ///
    /// The caller guarantees `signing_kp` belongs to `msg.client_header.sender`.
    pub fn box_plaintext(
        &self,
        msg: &MessagePlaintext,
        key: &CryptKey,
        signing_kp: &SigningKeyPair,
        version: BoxedVersion,
    ) -> Result<MessageBoxed, BoxingError> {
        if version == BoxedVersion::V2 {
            return Err(BoxingError::UnsupportedVersion(version));
        }
        let header_type = msg.client_header.message_type;
        if !body_matches_type(&msg.message_body, header_type) {
            return Err(BoxingError::BodyTypeMismatch {
                header: header_type,
                body: msg.message_body.message_type(),
            });
        }
        self.seal(msg, key, signing_kp, version)
    }

    fn seal(
        &self,
        msg: &MessagePlaintext,
        key: &CryptKey,
        signing_kp: &SigningKeyPair,
        version: BoxedVersion,
    ) -> Result<MessageBoxed, BoxingError> {
        let body = Zeroizing::new(codec::encode_body(&msg.message_body, version)?);
        let body_ciphertext = aead::seal_body(&key.key, &body)?;
        let body_hash = Hash::new(self.hash.digest(&body_ciphertext));

        let header = Zeroizing::new(codec::encode_header(
            &msg.client_header,
            &body_hash,
            key.key_generation,
            version,
        )?);
        let header_hash = self.hash.digest(&header);
        let header_signature = self.signer.sign(signing_kp, &header_hash, &self.prefix)?;
        let header_ciphertext = aead::seal_header(&key.key, &header)?;

        debug!(
            tlf = %msg.client_header.tlf_name,
            message_type = ?msg.client_header.message_type,
            %version,
            key_generation = %key.key_generation,
            "boxed message"
        );

        Ok(MessageBoxed {
            version,
            server_header: None,
            client_header: msg.client_header.clone(),
            header_ciphertext: EncryptedData::new(ENCRYPTED_DATA_VERSION, header_ciphertext),
            body_ciphertext: EncryptedData::new(ENCRYPTED_DATA_VERSION, body_ciphertext),
            header_signature,
            key_generation: key.key_generation,
        })
    }

    /// Box with the newest key generation the finder knows for the folder,
    /// at the configured version.
    pub async fn box_message(
        &self,
        cancel: &CancellationToken,
        msg: &MessagePlaintext,
        signing_kp: &SigningKeyPair,
        finder: &dyn KeyFinder,
    ) -> Result<MessageBoxed, BoxingError> {
        let header = &msg.client_header;
        let keys = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BoxingError::Cancelled),
            res = finder.find(&header.tlf_name, header.tlf_public) => res?,
        };
        let Some(key) = keys.iter().max_by_key(|k| k.key_generation) else {
            finder.forget(&header.tlf_name, header.tlf_public);
            return Err(BoxingError::NoKeyFound {
                tlf_name: header.tlf_name.clone(),
            });
        };
        self.box_plaintext(msg, key, signing_kp, self.version)
    }

    // ── Unboxing ─────────────────────────────────────────────────────────────

    /// Decrypt and verify one message with a known key. No chain or replay
    /// records are consulted or written.
    pub async fn unbox(
        &self,
        cancel: &CancellationToken,
        boxed: &MessageBoxed,
        key: &CryptKey,
    ) -> Result<UnboxedMessageValid, UnboxingError> {
        let result = self.unbox_verified(cancel, boxed, key).await;
        if let Err(err) = &result {
            log_failure(None, boxed, err);
        }
        result
    }

    /// Conversation-scoped unbox. Permanent failures come back as
    /// `Ok(UnboxedMessage::Error(..))`; transient ones as `Err`.
    pub async fn unbox_message(
        &self,
        cancel: &CancellationToken,
        boxed: &MessageBoxed,
        conv_id: &ConversationId,
        finder: &dyn KeyFinder,
    ) -> Result<UnboxedMessage, UnboxingError> {
        match self.unbox_in_conversation(cancel, boxed, conv_id, finder).await {
            Ok(valid) => Ok(UnboxedMessage::Valid(valid)),
            Err(err) => {
                log_failure(Some(conv_id), boxed, &err);
                if !err.is_permanent() {
                    return Err(err);
                }
                Ok(UnboxedMessage::Error(UnboxedError {
                    kind: err.kind(),
                    message: err.to_string(),
                    message_id: boxed.message_id(),
                    message_type: boxed.client_header.message_type,
                    version: boxed.version,
                }))
            }
        }
    }

    /// Unbox in order. Stops at the first transient failure.
    pub async fn unbox_messages(
        &self,
        cancel: &CancellationToken,
        boxed: &[MessageBoxed],
        conv_id: &ConversationId,
        finder: &dyn KeyFinder,
    ) -> Result<Vec<UnboxedMessage>, UnboxingError> {
        let mut unboxed = Vec::with_capacity(boxed.len());
        for message in boxed {
            unboxed.push(self.unbox_message(cancel, message, conv_id, finder).await?);
        }
        Ok(unboxed)
    }

    /// Raw sender-key answer for `verify_key` at `ctime`.
    pub async fn valid_sender_key(
        &self,
        cancel: &CancellationToken,
        uid: &Uid,
        verify_key: &VerifyKey,
        ctime: Timestamp,
    ) -> Result<SenderKeyStatus, UnboxingError> {
        lookup(cancel, self.sender_validator.validate(uid, verify_key, ctime)).await
    }

    async fn unbox_in_conversation(
        &self,
        cancel: &CancellationToken,
        boxed: &MessageBoxed,
        conv_id: &ConversationId,
        finder: &dyn KeyFinder,
    ) -> Result<UnboxedMessageValid, UnboxingError> {
        precheck(boxed)?;

        let outer = &boxed.client_header;
        let keys = lookup(cancel, finder.find(&outer.tlf_name, outer.tlf_public)).await?;
        let Some(key) = keys
            .iter()
            .find(|k| k.key_generation == boxed.key_generation)
        else {
            finder.forget(&outer.tlf_name, outer.tlf_public);
            return Err(UnboxingError::NoKeyFound {
                tlf_name: outer.tlf_name.clone(),
                key_generation: boxed.key_generation,
            });
        };

        let valid = self.unbox_verified(cancel, boxed, key).await?;

        if !valid.client_header.conv.derivable(conv_id) {
            return Err(UnboxingError::ConversationIdMismatch);
        }
        if cancel.is_cancelled() {
            return Err(UnboxingError::Cancelled);
        }

        self.cache.check_and_record_message(
            conv_id,
            valid.message_id(),
            &valid.header_hash,
            &valid.body_hash,
            &valid.client_header.prev,
        )?;

        debug!(conv = %conv_id, msg_id = %valid.message_id(), "unboxed message");
        Ok(valid)
    }

    async fn unbox_verified(
        &self,
        cancel: &CancellationToken,
        boxed: &MessageBoxed,
        key: &CryptKey,
    ) -> Result<UnboxedMessageValid, UnboxingError> {
        let server_header = precheck(boxed)?;

        let header_bytes = aead::open_header(&key.key, &boxed.header_ciphertext.e)
            .map_err(|_| UnboxingError::Decryption("header"))?;
        let DecodedHeader {
            client_header,
            body_hash,
            key_generation,
        } = codec::decode_header(&header_bytes, boxed.version)?;
        if key_generation != boxed.key_generation {
            return Err(UnboxingError::KeyGenerationMismatch {
                outer: boxed.key_generation,
                inner: key_generation,
            });
        }

        // Empty ciphertext: deleted by the server. Nothing to hash.
        let message_body = if boxed.body_ciphertext.is_empty() {
            MessageBody::Empty
        } else {
            let body = aead::open_body(&key.key, &boxed.body_ciphertext.e)
                .map_err(|_| UnboxingError::Decryption("body"))?;
            let computed = self.hash.digest(&boxed.body_ciphertext.e);
            if !constant_time_eq(&computed, body_hash.as_bytes()) {
                return Err(UnboxingError::BodyHashInvalid);
            }
            codec::decode_body(&body, boxed.version)?
        };

        let header_hash = Hash::new(self.hash.digest(&header_bytes));
        signing::verify(&boxed.header_signature, header_hash.as_bytes(), &self.prefix)
            .map_err(|e| UnboxingError::BadSignature(e.to_string()))?;

        if !body_matches_type(&message_body, client_header.message_type) {
            return Err(UnboxingError::BodyTypeMismatch {
                header: client_header.message_type,
                body: message_body.message_type(),
            });
        }

        let verify_key = &boxed.header_signature.k;
        let revoked_at = self
            .check_sender_key(cancel, &client_header.sender, verify_key, server_header.ctime)
            .await?;

        check_outer_header(boxed, &client_header)?;

        let info = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UnboxingError::Cancelled),
            info = self.sender_info.resolve(&client_header.sender, &client_header.sender_device) => info,
        };

        let verification_key = match boxed.version {
            BoxedVersion::VNone => None,
            _ => Some(verify_key.clone()),
        };

        Ok(UnboxedMessageValid {
            client_header,
            server_header: server_header.clone(),
            message_body,
            sender_username: info.username,
            sender_device_name: info.device_name,
            sender_device_type: info.device_type,
            header_hash,
            body_hash,
            header_signature: Some(boxed.header_signature.clone()),
            verification_key,
            sender_device_revoked_at: revoked_at,
        })
    }

    /// Returns the revocation time when the key was valid at `ctime` but
    /// has been revoked since.
    async fn check_sender_key(
        &self,
        cancel: &CancellationToken,
        uid: &Uid,
        verify_key: &VerifyKey,
        ctime: Timestamp,
    ) -> Result<Option<Timestamp>, UnboxingError> {
        let status = self.valid_sender_key(cancel, uid, verify_key, ctime).await?;
        if !status.found {
            return Err(UnboxingError::NoKey(format!(
                "key {} not found for sender {uid}",
                verify_key.fingerprint()
            )));
        }
        if !status.valid_at_time {
            return Err(UnboxingError::NoKey(format!(
                "key {} not valid for sender {uid} at ctime {}",
                verify_key.fingerprint(),
                ctime.0
            )));
        }
        Ok(status.revoked_at)
    }
}

/// An empty body carries no variant and fits any type.
fn body_matches_type(body: &MessageBody, message_type: MessageType) -> bool {
    body.is_empty() || body.message_type() == message_type
}

fn precheck(boxed: &MessageBoxed) -> Result<&ServerHeader, UnboxingError> {
    if boxed.version == BoxedVersion::V2 {
        return Err(UnboxingError::UnsupportedVersion(boxed.version));
    }
    boxed
        .server_header
        .as_ref()
        .ok_or(UnboxingError::MissingServerHeader)
}

/// The outer header is an unauthenticated copy. Every field it shares with
/// the signed header must agree.
fn check_outer_header(boxed: &MessageBoxed, signed: &ClientHeader) -> Result<(), UnboxingError> {
    let outer = &boxed.client_header;
    if outer.sender != signed.sender || outer.sender_device != signed.sender_device {
        return Err(UnboxingError::SenderMismatch);
    }
    if outer.conv != signed.conv {
        return Err(UnboxingError::HeaderMismatch("conv"));
    }
    if outer.tlf_name != signed.tlf_name {
        return Err(UnboxingError::HeaderMismatch("tlf_name"));
    }
    if outer.tlf_public != signed.tlf_public {
        return Err(UnboxingError::HeaderMismatch("tlf_public"));
    }
    if outer.message_type != signed.message_type {
        return Err(UnboxingError::HeaderMismatch("message_type"));
    }
    Ok(())
}

async fn lookup<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, LookupError>>,
) -> Result<T, UnboxingError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(UnboxingError::Cancelled),
        res = fut => res.map_err(UnboxingError::from),
    }
}

fn log_failure(conv_id: Option<&ConversationId>, boxed: &MessageBoxed, err: &UnboxingError) {
    let conv = conv_id.map(ToString::to_string).unwrap_or_default();
    if err.is_permanent() {
        warn!(
            %conv,
            msg_id = %boxed.message_id(),
            kind = ?err.kind(),
            error = %err,
            "message failed to unbox"
        );
    } else {
        debug!(
            %conv,
            msg_id = %boxed.message_id(),
            kind = ?err.kind(),
            error = %err,
            "unbox deferred"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyHistoryValidator;
    use chatbox_proto::{ConversationIdTriple, DeviceId, KeyGeneration, MessageId};

    fn setup() -> (Boxer, Arc<KeyHistoryValidator>, SigningKeyPair, Uid) {
        let validator = Arc::new(KeyHistoryValidator::new());
        let boxer = Boxer::builder(validator.clone()).build().unwrap();
        let kp = SigningKeyPair::generate();
        let uid = Uid::new(vec![0x11; 16]);
        validator.register_key(&uid, kp.verify_key(), Timestamp(0));
        (boxer, validator, kp, uid)
    }

    fn text_msg(uid: &Uid, text: &str) -> MessagePlaintext {
        MessagePlaintext {
            client_header: ClientHeader {
                tlf_name: "alice,bob".into(),
                message_type: MessageType::Text,
                sender: uid.clone(),
                sender_device: DeviceId::new(vec![0x22; 16]),
                ..Default::default()
            },
            message_body: MessageBody::text(text),
        }
    }

    fn with_server_header(mut boxed: MessageBoxed, id: u64) -> MessageBoxed {
        boxed.server_header = Some(ServerHeader {
            message_id: MessageId(id),
            superseded_by: MessageId(0),
            ctime: Timestamp::now(),
        });
        boxed
    }

    #[tokio::test]
    async fn box_then_unbox() {
        let (boxer, _, kp, uid) = setup();
        let key = CryptKey::generate(KeyGeneration(1));
        let boxed = boxer
            .box_plaintext(&text_msg(&uid, "hi"), &key, &kp, BoxedVersion::V1)
            .unwrap();
        assert!(boxed.server_header.is_none());
        assert_eq!(boxed.header_ciphertext.v, ENCRYPTED_DATA_VERSION);

        let boxed = with_server_header(boxed, 1);
        let unboxed = boxer
            .unbox(&CancellationToken::new(), &boxed, &key)
            .await
            .unwrap();
        assert_eq!(unboxed.message_body, MessageBody::text("hi"));
        assert_eq!(unboxed.client_header.sender, uid);
        assert_eq!(unboxed.verification_key.as_ref(), Some(kp.verify_key()));
        assert!(unboxed.sender_device_revoked_at.is_none());
    }

    #[tokio::test]
    async fn missing_server_header_is_permanent() {
        let (boxer, _, kp, uid) = setup();
        let key = CryptKey::generate(KeyGeneration(1));
        let boxed = boxer
            .box_plaintext(&text_msg(&uid, "hi"), &key, &kp, BoxedVersion::V1)
            .unwrap();
        let err = boxer
            .unbox(&CancellationToken::new(), &boxed, &key)
            .await
            .unwrap_err();
        assert_eq!(err, UnboxingError::MissingServerHeader);
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn outer_routing_fields_are_checked() {
        let (boxer, _, kp, uid) = setup();
        let key = CryptKey::generate(KeyGeneration(1));
        let boxed = boxer
            .box_plaintext(&text_msg(&uid, "hi"), &key, &kp, BoxedVersion::V1)
            .unwrap();

        let mut renamed = with_server_header(boxed.clone(), 1);
        renamed.client_header.tlf_name = "mallory".into();
        let err = boxer
            .unbox(&CancellationToken::new(), &renamed, &key)
            .await
            .unwrap_err();
        assert_eq!(err, UnboxingError::HeaderMismatch("tlf_name"));

        let mut moved = with_server_header(boxed, 1);
        moved.client_header.conv = ConversationIdTriple {
            topic_id: chatbox_proto::TopicId::new(vec![9]),
            ..Default::default()
        };
        let err = boxer
            .unbox(&CancellationToken::new(), &moved, &key)
            .await
            .unwrap_err();
        assert_eq!(err, UnboxingError::HeaderMismatch("conv"));
    }

    #[tokio::test]
    async fn key_generation_is_bound_to_signed_header() {
        let (boxer, _, kp, uid) = setup();
        let key = CryptKey::generate(KeyGeneration(1));
        let mut boxed = with_server_header(
            boxer
                .box_plaintext(&text_msg(&uid, "hi"), &key, &kp, BoxedVersion::V1)
                .unwrap(),
            1,
        );
        boxed.key_generation = KeyGeneration(2);
        let err = boxer
            .unbox(&CancellationToken::new(), &boxed, &key)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            UnboxingError::KeyGenerationMismatch {
                outer: KeyGeneration(2),
                inner: KeyGeneration(1),
            }
        );
    }

    #[tokio::test]
    async fn wrong_key_fails_decryption() {
        let (boxer, _, kp, uid) = setup();
        let key = CryptKey::generate(KeyGeneration(1));
        let boxed = with_server_header(
            boxer
                .box_plaintext(&text_msg(&uid, "hi"), &key, &kp, BoxedVersion::V1)
                .unwrap(),
            1,
        );
        let other = CryptKey::generate(KeyGeneration(1));
        let err = boxer
            .unbox(&CancellationToken::new(), &boxed, &other)
            .await
            .unwrap_err();
        assert_eq!(err, UnboxingError::Decryption("header"));
    }

    #[tokio::test]
    async fn body_type_is_checked_against_signed_header() {
        let (boxer, _, kp, uid) = setup();
        let key = CryptKey::generate(KeyGeneration(1));
        let mut msg = text_msg(&uid, "unused");
        msg.message_body = MessageBody::Delete(chatbox_proto::MessageDelete {
            message_ids: vec![MessageId(7)],
        });
        let boxed = with_server_header(boxer.seal(&msg, &key, &kp, BoxedVersion::V1).unwrap(), 1);
        let err = boxer
            .unbox(&CancellationToken::new(), &boxed, &key)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            UnboxingError::BodyTypeMismatch {
                header: MessageType::Text,
                body: MessageType::Delete,
            }
        );
        assert!(err.is_permanent());

        // A deleted body has no variant left to disagree with.
        let mut stripped = boxed;
        stripped.body_ciphertext.e.clear();
        let unboxed = boxer
            .unbox(&CancellationToken::new(), &stripped, &key)
            .await
            .unwrap();
        assert!(unboxed.is_deleted());
    }

    #[test]
    fn builder_rejects_bad_config() {
        let validator = Arc::new(KeyHistoryValidator::new());
        let config = BoxerConfig {
            boxed_version: BoxedVersion::V2,
            ..Default::default()
        };
        assert!(Boxer::builder(validator).config(config).build().is_err());
    }
}
