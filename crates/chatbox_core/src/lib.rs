//! chatbox_core: Boxing, unboxing, and history integrity for chat messages
//!
//! # Modules
//! - `boxer`  : `Boxer`: box, unbox, conversation-scoped unbox
//! - `cache`  : `HashChainCache`: per-conversation chain and replay records
//! - `keys`   : KeyFinder / SenderValidator / SenderInfoResolver capabilities
//! - `config` : `BoxerConfig`
//! - `error`  : boxing and unboxing error taxonomy
//! - `unboxed`: unboxing outcomes

pub mod boxer;
pub mod cache;
pub mod config;
pub mod error;
pub mod keys;
pub mod unboxed;

pub use boxer::{Boxer, BoxerBuilder};
pub use cache::{ChainError, HashChainCache};
pub use config::{BoxerConfig, ConfigError, HashAlgorithm};
pub use error::{BoxingError, LookupError, UnboxingError, UnboxingErrorKind};
pub use keys::{
    CachingKeyFinder, CryptKey, KeyFinder, KeyHistoryValidator, SenderInfo, SenderInfoResolver,
    SenderKeyStatus, SenderValidator, StaticKeyFinder, StaticSenderInfo,
};
pub use unboxed::{UnboxedError, UnboxedMessage, UnboxedMessageValid};
