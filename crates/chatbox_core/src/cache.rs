//! Per-conversation hash-chain and replay records.
//!
//! Every message references earlier messages by `(id, header_hash)`. The
//! first header hash observed for a message id, whether from the message
//! itself or from a later message's prev pointer, becomes ground truth for
//! the life of the cache:
//!
//!   header_hashes[id] = first hash seen for id        (never rewritten)
//!   body_hashes[hash] = first message id carrying it  (never rewritten)
//!
//! A later observation that disagrees is rejected; the cached value is not
//! touched. This detects a server that shows different histories to
//! different readers, and a body re-sent under a new message id.
//!
//! Conversations are independent partitions. Check-then-insert for one
//! conversation happens under that conversation's lock only.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use chatbox_crypto::constant_time_eq;
use chatbox_proto::{ConversationId, Hash, MessageId, MessagePreviousPointer};

#[derive(Debug, Default)]
struct ConversationChain {
    header_hashes: HashMap<MessageId, Hash>,
    body_hashes: HashMap<Hash, MessageId>,
}

impl ConversationChain {
    fn check_and_record_header_hash(
        &mut self,
        message_id: MessageId,
        hash: &Hash,
    ) -> Result<(), ChainError> {
        match self.header_hashes.get(&message_id) {
            Some(cached) if constant_time_eq(cached.as_bytes(), hash.as_bytes()) => Ok(()),
            Some(cached) => Err(ChainError::Conflict {
                message_id,
                cached: cached.clone(),
                claimed: hash.clone(),
            }),
            None => {
                self.header_hashes.insert(message_id, hash.clone());
                Ok(())
            }
        }
    }

    fn record_message(
        &mut self,
        message_id: MessageId,
        header_hash: &Hash,
        body_hash: &Hash,
        prev: &[MessagePreviousPointer],
    ) -> Result<(), ChainError> {
        self.check_and_record_body_hash(body_hash, message_id)?;
        self.check_and_record_header_hash(message_id, header_hash)?;
        for pointer in prev {
            self.check_and_record_header_hash(pointer.id, &pointer.hash)?;
        }
        Ok(())
    }

    fn check_and_record_body_hash(
        &mut self,
        body_hash: &Hash,
        message_id: MessageId,
    ) -> Result<(), ChainError> {
        match self.body_hashes.get(body_hash) {
            Some(&first_seen) if first_seen == message_id => Ok(()),
            Some(&first_seen) => Err(ChainError::Replay {
                body_hash: body_hash.clone(),
                first_seen,
                message_id,
            }),
            None => {
                self.body_hashes.insert(body_hash.clone(), message_id);
                Ok(())
            }
        }
    }
}

/// Process-wide store of chain and replay records, keyed by conversation.
#[derive(Debug, Default)]
pub struct HashChainCache {
    conversations: RwLock<HashMap<ConversationId, Arc<Mutex<ConversationChain>>>>,
}

impl HashChainCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, conv_id: &ConversationId) -> Arc<Mutex<ConversationChain>> {
        if let Some(chain) = self.conversations.read().get(conv_id) {
            return Arc::clone(chain);
        }
        Arc::clone(self.conversations.write().entry(conv_id.clone()).or_default())
    }

    /// Bind `body_hash` to `message_id`, or confirm an existing binding.
    pub fn check_and_record_body_hash(
        &self,
        conv_id: &ConversationId,
        body_hash: &Hash,
        message_id: MessageId,
    ) -> Result<(), ChainError> {
        let chain = self.partition(conv_id);
        let result = chain.lock().check_and_record_body_hash(body_hash, message_id);
        log_rejection(conv_id, &result);
        result
    }

    /// Record `hash` as the header hash of `message_id`, or confirm it
    /// matches the one already recorded.
    pub fn check_and_record_header_hash(
        &self,
        conv_id: &ConversationId,
        message_id: MessageId,
        hash: &Hash,
    ) -> Result<(), ChainError> {
        let chain = self.partition(conv_id);
        let result = chain.lock().check_and_record_header_hash(message_id, hash);
        log_rejection(conv_id, &result);
        result
    }

    /// Run every record for one verified message under a single lock:
    /// body hash, the message's own header hash, then each prev pointer.
    ///
    /// Stops at the first conflict. Records written before the conflict
    /// stay in place.
    pub fn check_and_record_message(
        &self,
        conv_id: &ConversationId,
        message_id: MessageId,
        header_hash: &Hash,
        body_hash: &Hash,
        prev: &[MessagePreviousPointer],
    ) -> Result<(), ChainError> {
        let chain = self.partition(conv_id);
        let result = chain
            .lock()
            .record_message(message_id, header_hash, body_hash, prev);
        log_rejection(conv_id, &result);
        result
    }

    pub fn header_hash(&self, conv_id: &ConversationId, message_id: MessageId) -> Option<Hash> {
        let chain = self.conversations.read().get(conv_id).cloned()?;
        let hash = chain.lock().header_hashes.get(&message_id).cloned();
        hash
    }

    pub fn body_hash_owner(&self, conv_id: &ConversationId, body_hash: &Hash) -> Option<MessageId> {
        let chain = self.conversations.read().get(conv_id).cloned()?;
        let owner = chain.lock().body_hashes.get(body_hash).copied();
        owner
    }

    /// Drop every record for a conversation (session teardown, eviction).
    pub fn forget_conversation(&self, conv_id: &ConversationId) -> bool {
        self.conversations.write().remove(conv_id).is_some()
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.read().len()
    }
}

fn log_rejection(conv_id: &ConversationId, result: &Result<(), ChainError>) {
    if let Err(err) = result {
        info!(conv = %conv_id, error = %err, "hash chain check rejected message");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("header hash conflict for message {message_id}: cached {cached}, claimed {claimed}")]
    Conflict {
        message_id: MessageId,
        cached: Hash,
        claimed: Hash,
    },
    #[error("body hash {body_hash} replayed: first seen at message {first_seen}, now at {message_id}")]
    Replay {
        body_hash: Hash,
        first_seen: MessageId,
        message_id: MessageId,
    },
}
