//! External capabilities the boxer consults, with in-memory implementations.
//!
//! The boxer never owns key material or identity history. Callers pass a
//! `KeyFinder` per call and install a `SenderValidator` and
//! `SenderInfoResolver` at construction.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use zeroize::ZeroizeOnDrop;

use chatbox_crypto::VerifyKey;
use chatbox_proto::{DeviceId, KeyGeneration, Timestamp, Uid};

use crate::error::LookupError;

/// One generation of a conversation's symmetric key.
#[derive(Clone, ZeroizeOnDrop)]
pub struct CryptKey {
    #[zeroize(skip)]
    pub key_generation: KeyGeneration,
    pub key: [u8; 32],
}

impl CryptKey {
    pub fn new(key_generation: KeyGeneration, key: [u8; 32]) -> Self {
        Self { key_generation, key }
    }

    pub fn generate(key_generation: KeyGeneration) -> Self {
        use rand::RngCore;
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self { key_generation, key }
    }
}

impl std::fmt::Debug for CryptKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptKey")
            .field("key_generation", &self.key_generation)
            .finish_non_exhaustive()
    }
}

/// Resolves the symmetric keys of a folder.
#[async_trait]
pub trait KeyFinder: Send + Sync {
    async fn find(&self, tlf_name: &str, tlf_public: bool) -> Result<Vec<CryptKey>, LookupError>;

    /// Called when a folder's keys did not include a needed generation, so
    /// the next `find` goes back to the source.
    fn forget(&self, _tlf_name: &str, _tlf_public: bool) {}
}

/// Answer to "was this key ever a signing key of this user, and was it
/// valid at the given time?"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SenderKeyStatus {
    pub found: bool,
    pub valid_at_time: bool,
    /// Set when the key has been revoked, regardless of `at`.
    pub revoked_at: Option<Timestamp>,
}

#[async_trait]
pub trait SenderValidator: Send + Sync {
    async fn validate(
        &self,
        uid: &Uid,
        verify_key: &VerifyKey,
        at: Timestamp,
    ) -> Result<SenderKeyStatus, LookupError>;
}

/// Display metadata for a sender. Not security relevant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SenderInfo {
    pub username: String,
    pub device_name: String,
    pub device_type: String,
}

#[async_trait]
pub trait SenderInfoResolver: Send + Sync {
    async fn resolve(&self, uid: &Uid, device: &DeviceId) -> SenderInfo;
}

// ── In-memory implementations ────────────────────────────────────────────────

/// Returns the same key set for every folder.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyFinder {
    keys: Vec<CryptKey>,
}

impl StaticKeyFinder {
    pub fn new(keys: Vec<CryptKey>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl KeyFinder for StaticKeyFinder {
    async fn find(&self, _tlf_name: &str, _tlf_public: bool) -> Result<Vec<CryptKey>, LookupError> {
        Ok(self.keys.clone())
    }
}

/// Memoizes another finder's answers per `(tlf_name, tlf_public)`.
/// Failed lookups are not cached, and `forget` drops a folder's entry.
#[derive(Debug)]
pub struct CachingKeyFinder<F> {
    inner: F,
    cache: Mutex<HashMap<(String, bool), Vec<CryptKey>>>,
}

impl<F: KeyFinder> CachingKeyFinder<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_folders(&self) -> usize {
        self.cache.lock().len()
    }
}

#[async_trait]
impl<F: KeyFinder> KeyFinder for CachingKeyFinder<F> {
    async fn find(&self, tlf_name: &str, tlf_public: bool) -> Result<Vec<CryptKey>, LookupError> {
        let slot = (tlf_name.to_string(), tlf_public);
        let cached = self.cache.lock().get(&slot).cloned();
        if let Some(keys) = cached {
            return Ok(keys);
        }
        let keys = self.inner.find(tlf_name, tlf_public).await?;
        self.cache.lock().insert(slot, keys.clone());
        Ok(keys)
    }

    fn forget(&self, tlf_name: &str, tlf_public: bool) {
        self.cache.lock().remove(&(tlf_name.to_string(), tlf_public));
        self.inner.forget(tlf_name, tlf_public);
    }
}

#[derive(Debug, Clone)]
struct KeyRecord {
    verify_key: VerifyKey,
    valid_from: Timestamp,
    revoked_at: Option<Timestamp>,
}

impl KeyRecord {
    fn valid_at(&self, at: Timestamp) -> bool {
        self.valid_from <= at && self.revoked_at.map_or(true, |revoked| at < revoked)
    }
}

/// Per-user signing key history.
#[derive(Debug, Default)]
pub struct KeyHistoryValidator {
    users: RwLock<HashMap<Uid, Vec<KeyRecord>>>,
}

impl KeyHistoryValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_key(&self, uid: &Uid, verify_key: &VerifyKey, valid_from: Timestamp) {
        self.users.write().entry(uid.clone()).or_default().push(KeyRecord {
            verify_key: verify_key.clone(),
            valid_from,
            revoked_at: None,
        });
    }

    /// Returns false when the key was never registered for `uid`.
    pub fn revoke_key(&self, uid: &Uid, verify_key: &VerifyKey, at: Timestamp) -> bool {
        let mut users = self.users.write();
        let Some(record) = users
            .get_mut(uid)
            .and_then(|keys| keys.iter_mut().find(|r| r.verify_key == *verify_key))
        else {
            return false;
        };
        record.revoked_at = Some(at);
        true
    }
}

#[async_trait]
impl SenderValidator for KeyHistoryValidator {
    async fn validate(
        &self,
        uid: &Uid,
        verify_key: &VerifyKey,
        at: Timestamp,
    ) -> Result<SenderKeyStatus, LookupError> {
        let users = self.users.read();
        let record = users
            .get(uid)
            .and_then(|keys| keys.iter().find(|r| r.verify_key == *verify_key));
        Ok(match record {
            None => SenderKeyStatus::default(),
            Some(record) => SenderKeyStatus {
                found: true,
                valid_at_time: record.valid_at(at),
                revoked_at: record.revoked_at,
            },
        })
    }
}

/// Same display metadata for every sender.
#[derive(Debug, Clone, Default)]
pub struct StaticSenderInfo {
    info: SenderInfo,
}

impl StaticSenderInfo {
    pub fn new(info: SenderInfo) -> Self {
        Self { info }
    }
}

#[async_trait]
impl SenderInfoResolver for StaticSenderInfo {
    async fn resolve(&self, _uid: &Uid, _device: &DeviceId) -> SenderInfo {
        self.info.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFinder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl KeyFinder for CountingFinder {
        async fn find(&self, _tlf_name: &str, _tlf_public: bool) -> Result<Vec<CryptKey>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LookupError::Unavailable("offline".into()));
            }
            Ok(vec![CryptKey::new(KeyGeneration(1), [7; 32])])
        }
    }

    #[tokio::test]
    async fn caching_finder_memoizes_per_folder() {
        let finder = CachingKeyFinder::new(CountingFinder {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        finder.find("alice,bob", false).await.unwrap();
        finder.find("alice,bob", false).await.unwrap();
        finder.find("alice,bob", true).await.unwrap();
        assert_eq!(finder.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(finder.cached_folders(), 2);
    }

    #[tokio::test]
    async fn caching_finder_does_not_cache_failures() {
        let finder = CachingKeyFinder::new(CountingFinder {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        assert!(finder.find("alice", false).await.is_err());
        assert!(finder.find("alice", false).await.is_err());
        assert_eq!(finder.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(finder.cached_folders(), 0);
    }

    #[tokio::test]
    async fn forgotten_folder_is_fetched_again() {
        let finder = CachingKeyFinder::new(CountingFinder {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        finder.find("alice,bob", false).await.unwrap();
        finder.find("alice,bob", true).await.unwrap();
        finder.forget("alice,bob", false);
        assert_eq!(finder.cached_folders(), 1);

        finder.find("alice,bob", false).await.unwrap();
        assert_eq!(finder.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn key_history_windows() {
        let v = KeyHistoryValidator::new();
        let uid = Uid::new(vec![1; 16]);
        let vk = VerifyKey(vec![2; 32]);
        v.register_key(&uid, &vk, Timestamp(100));

        let before = v.validate(&uid, &vk, Timestamp(50)).await.unwrap();
        assert!(before.found && !before.valid_at_time);

        let during = v.validate(&uid, &vk, Timestamp(150)).await.unwrap();
        assert!(during.found && during.valid_at_time);
        assert_eq!(during.revoked_at, None);

        assert!(v.revoke_key(&uid, &vk, Timestamp(200)));
        let still_valid = v.validate(&uid, &vk, Timestamp(150)).await.unwrap();
        assert!(still_valid.valid_at_time);
        assert_eq!(still_valid.revoked_at, Some(Timestamp(200)));

        let after = v.validate(&uid, &vk, Timestamp(200)).await.unwrap();
        assert!(after.found && !after.valid_at_time);

        let unknown = v.validate(&uid, &VerifyKey(vec![3; 32]), Timestamp(150)).await.unwrap();
        assert_eq!(unknown, SenderKeyStatus::default());
        assert!(!v.revoke_key(&Uid::new(vec![9]), &vk, Timestamp(1)));
    }

    #[test]
    fn crypt_key_debug_hides_key() {
        let key = CryptKey::new(KeyGeneration(4), [0xab; 32]);
        let shown = format!("{key:?}");
        assert!(shown.contains("key_generation"));
        assert!(!shown.contains("171"));
    }
}
