//! Expiring, schema-versioned cache over the shared key-value store.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, CachePolicy, Validity};
use super::result::{Lookup, MissReason};
use crate::clock::Clock;
use crate::storage::KeyValueStore;

/// Prefix of every storage key owned by the cache.
pub const CACHE_PREFIX: &str = "cache:";

/// Last known-good results of remote reads.
///
/// Validity is checked on every read and invalid entries are deleted on the
/// spot, so correctness never depends on a background sweep having run.
/// Storage failures are logged and swallowed: the cache is an optimization,
/// never a source of truth.
#[derive(Clone)]
pub struct CacheStore {
  storage: Arc<dyn KeyValueStore>,
  clock: Arc<dyn Clock>,
  policy: CachePolicy,
}

impl CacheStore {
  pub fn new(storage: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
    Self {
      storage,
      clock,
      policy: CachePolicy::default(),
    }
  }

  pub fn with_policy(mut self, policy: CachePolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn policy(&self) -> &CachePolicy {
    &self.policy
  }

  fn storage_key(key: &str) -> String {
    format!("{}{}", CACHE_PREFIX, key)
  }

  /// Store `data` under `key`, expiring after `ttl` (or the default TTL).
  pub async fn put<T: Serialize + ?Sized>(&self, key: &str, data: &T, ttl: Option<Duration>) {
    let entry = CacheEntry::new(data, self.clock.now_ms(), ttl, &self.policy);
    let json = match serde_json::to_string(&entry) {
      Ok(json) => json,
      Err(e) => {
        warn!(key, error = %e, "Failed to serialize cache entry");
        return;
      }
    };

    if let Err(e) = self.storage.set_string(&Self::storage_key(key), &json).await {
      warn!(key, error = %e, "Failed to cache data");
    }
  }

  /// Look up `key`, reporting why nothing was returned on a miss.
  pub async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Lookup<T> {
    let entry = match self.load_valid(key).await {
      Ok(entry) => entry,
      Err(reason) => return Lookup::Miss(reason),
    };

    let cached_at =
      DateTime::<Utc>::from_timestamp_millis(entry.timestamp).unwrap_or_else(Utc::now);
    match serde_json::from_value::<T>(entry.data) {
      Ok(data) => Lookup::Hit { data, cached_at },
      Err(e) => {
        debug!(key, error = %e, "Cached payload does not match requested type");
        Lookup::Miss(MissReason::TypeMismatch)
      }
    }
  }

  /// The cached value for `key`, or `None` if absent or no longer valid.
  pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    self.lookup(key).await.into_option()
  }

  /// Whether a valid entry exists, without decoding its payload.
  pub async fn has(&self, key: &str) -> bool {
    self.load_valid(key).await.is_ok()
  }

  /// Read the envelope and enforce validity, deleting entries that fail it.
  async fn load_valid(&self, key: &str) -> Result<CacheEntry<Value>, MissReason> {
    let storage_key = Self::storage_key(key);
    let raw = match self.storage.get_string(&storage_key).await {
      Ok(Some(raw)) => raw,
      Ok(None) => return Err(MissReason::Absent),
      Err(e) => {
        warn!(key, error = %e, "Failed to read cached data");
        return Err(MissReason::Unavailable);
      }
    };

    let entry: CacheEntry<Value> = match serde_json::from_str(&raw) {
      Ok(entry) => entry,
      Err(e) => {
        debug!(key, error = %e, "Dropping unreadable cache entry");
        self.delete_stale(&storage_key, &raw).await;
        return Err(MissReason::Corrupt);
      }
    };

    match entry.validity(self.clock.now_ms(), &self.policy) {
      Validity::Valid => Ok(entry),
      Validity::Expired => {
        debug!(key, "Cache entry expired");
        self.delete_stale(&storage_key, &raw).await;
        Err(MissReason::Expired)
      }
      Validity::SchemaMismatch => {
        debug!(
          key,
          found = %entry.schema_version,
          expected = %self.policy.schema_version,
          "Cache entry written by another schema version"
        );
        self.delete_stale(&storage_key, &raw).await;
        Err(MissReason::SchemaMismatch)
      }
    }
  }

  /// Delete an entry that failed validation, unless a writer replaced it since it was read.
  async fn delete_stale(&self, storage_key: &str, seen: &str) {
    match self.storage.remove_if_equals(storage_key, seen).await {
      Ok(true) => {}
      Ok(false) => debug!(key = storage_key, "Cache entry rewritten during read, keeping it"),
      Err(e) => warn!(key = storage_key, error = %e, "Failed to remove cached data"),
    }
  }

  async fn delete(&self, storage_key: &str) {
    if let Err(e) = self.storage.remove_key(storage_key).await {
      warn!(key = storage_key, error = %e, "Failed to remove cached data");
    }
  }

  /// Explicitly invalidate one entry.
  pub async fn remove(&self, key: &str) {
    self.delete(&Self::storage_key(key)).await;
  }

  /// Remove every entry whose key starts with `<scope>:`.
  pub async fn invalidate_scope(&self, scope: &str) {
    let prefix = format!("{}{}:", CACHE_PREFIX, scope);
    self.remove_prefixed(&prefix).await;
  }

  /// Remove every entry owned by the cache. Other keys are left alone.
  pub async fn clear_all(&self) {
    self.remove_prefixed(CACHE_PREFIX).await;
  }

  async fn remove_prefixed(&self, prefix: &str) {
    let keys = match self.storage.keys_with_prefix(prefix).await {
      Ok(keys) => keys,
      Err(e) => {
        warn!(prefix, error = %e, "Failed to list cache keys");
        return;
      }
    };

    if let Err(e) = self.storage.remove_keys(&keys).await {
      warn!(prefix, error = %e, "Failed to clear cache");
    }
  }

  /// Best-effort total size of the serialized entries, for diagnostics.
  pub async fn size_bytes(&self) -> u64 {
    let keys = match self.storage.keys_with_prefix(CACHE_PREFIX).await {
      Ok(keys) => keys,
      Err(e) => {
        warn!(error = %e, "Failed to calculate cache size");
        return 0;
      }
    };

    let mut total = 0u64;
    for key in keys {
      if let Ok(Some(value)) = self.storage.get_string(&key).await {
        total += value.len() as u64;
      }
    }
    total
  }

  /// Sweep every owned key and delete the invalid ones. Returns how many were removed.
  pub async fn evict_expired(&self) -> usize {
    let keys = match self.storage.keys_with_prefix(CACHE_PREFIX).await {
      Ok(keys) => keys,
      Err(e) => {
        warn!(error = %e, "Failed to list cache keys for cleanup");
        return 0;
      }
    };

    let mut removed = 0;
    for storage_key in keys {
      let key = &storage_key[CACHE_PREFIX.len()..];
      if let Err(MissReason::Expired | MissReason::SchemaMismatch | MissReason::Corrupt) =
        self.load_valid(key).await
      {
        removed += 1;
      }
    }

    if removed > 0 {
      info!(removed, "Cleaned up expired cache entries");
    }
    removed
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::error::StorageError;
  use crate::storage::testing::UnavailableStore;
  use crate::storage::MemoryStore;
  use async_trait::async_trait;
  use serde::Deserialize;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Grade {
    subject: String,
    score: u32,
  }

  fn grade() -> Grade {
    Grade {
      subject: "maths".to_string(),
      score: 91,
    }
  }

  fn setup() -> (CacheStore, Arc<MemoryStore>, Arc<ManualClock>) {
    let storage = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let cache = CacheStore::new(storage.clone(), clock.clone());
    (cache, storage, clock)
  }

  #[tokio::test]
  async fn test_get_returns_value_before_ttl() {
    let (cache, _storage, clock) = setup();

    cache.put("grades:7", &grade(), Some(Duration::from_secs(60))).await;
    clock.advance(Duration::from_secs(59));

    assert_eq!(cache.get::<Grade>("grades:7").await, Some(grade()));
    assert!(cache.has("grades:7").await);
  }

  #[tokio::test]
  async fn test_expired_entry_is_physically_removed() {
    let (cache, storage, clock) = setup();

    cache.put("grades:7", &grade(), Some(Duration::from_secs(60))).await;
    clock.advance(Duration::from_secs(61));

    assert_eq!(
      cache.lookup::<Grade>("grades:7").await.miss_reason(),
      Some(MissReason::Expired)
    );
    assert!(!cache.has("grades:7").await);
    assert!(storage.list_keys().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_schema_change_invalidates_entry() {
    let (cache, storage, clock) = setup();
    cache.put("profile", &grade(), Some(Duration::from_secs(3600))).await;

    let upgraded = CacheStore::new(storage.clone(), clock).with_policy(CachePolicy {
      schema_version: "2.0.0".to_string(),
      ..CachePolicy::default()
    });

    assert_eq!(upgraded.get::<Grade>("profile").await, None);
    assert!(storage.list_keys().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_clear_all_leaves_unrelated_keys() {
    let (cache, storage, _clock) = setup();
    storage.set_string("authToken", "secret").await.unwrap();
    storage.set_string("offline_sync_queue", "[]").await.unwrap();

    cache.put("a", &1, None).await;
    cache.put("b", &2, None).await;
    cache.clear_all().await;

    assert!(!cache.has("a").await);
    assert!(!cache.has("b").await);
    let mut keys = storage.list_keys().await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["authToken".to_string(), "offline_sync_queue".to_string()]);
  }

  #[tokio::test]
  async fn test_corrupt_entry_is_a_miss_and_removed() {
    let (cache, storage, _clock) = setup();
    storage.set_string("cache:broken", "{not json").await.unwrap();

    assert_eq!(
      cache.lookup::<Grade>("broken").await.miss_reason(),
      Some(MissReason::Corrupt)
    );
    assert_eq!(storage.get_string("cache:broken").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_type_mismatch_keeps_entry() {
    let (cache, _storage, _clock) = setup();
    cache.put("count", &"not a grade", None).await;

    assert_eq!(
      cache.lookup::<Grade>("count").await.miss_reason(),
      Some(MissReason::TypeMismatch)
    );
    assert_eq!(cache.get::<String>("count").await.as_deref(), Some("not a grade"));
  }

  #[tokio::test]
  async fn test_default_ttl_applies_without_explicit_ttl() {
    let (cache, _storage, clock) = setup();
    let cache = cache.with_policy(CachePolicy {
      default_ttl: Duration::from_secs(10),
      ..CachePolicy::default()
    });

    cache.put("k", &1, None).await;
    clock.advance(Duration::from_secs(10));
    assert_eq!(cache.get::<i32>("k").await, Some(1));

    clock.advance(Duration::from_millis(1));
    assert_eq!(cache.get::<i32>("k").await, None);
  }

  #[tokio::test]
  async fn test_invalidate_scope() {
    let (cache, _storage, _clock) = setup();
    cache.put("attendance:1", &1, None).await;
    cache.put("attendance:2", &2, None).await;
    cache.put("grades:1", &3, None).await;

    cache.invalidate_scope("attendance").await;

    assert!(!cache.has("attendance:1").await);
    assert!(!cache.has("attendance:2").await);
    assert!(cache.has("grades:1").await);
  }

  #[tokio::test]
  async fn test_evict_expired_counts_removed_entries() {
    let (cache, storage, clock) = setup();
    storage.set_string("session", "keep").await.unwrap();
    cache.put("short", &1, Some(Duration::from_secs(1))).await;
    cache.put("long", &2, Some(Duration::from_secs(100))).await;

    clock.advance(Duration::from_secs(2));

    assert_eq!(cache.evict_expired().await, 1);
    let keys = storage.list_keys().await.unwrap();
    assert_eq!(keys, vec!["cache:long".to_string(), "session".to_string()]);
  }

  #[tokio::test]
  async fn test_size_bytes_sums_owned_entries() {
    let (cache, storage, _clock) = setup();
    assert_eq!(cache.size_bytes().await, 0);

    storage.set_string("unrelated", "0123456789").await.unwrap();
    cache.put("k", &grade(), None).await;

    let stored = storage.get_string("cache:k").await.unwrap().unwrap();
    assert_eq!(cache.size_bytes().await, stored.len() as u64);
  }

  /// Swaps in a new value for one key right after it has been read.
  struct RewriteAfterRead {
    inner: MemoryStore,
    rewrite: std::sync::Mutex<Option<(String, String)>>,
  }

  #[async_trait]
  impl KeyValueStore for RewriteAfterRead {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StorageError> {
      let value = self.inner.get_string(key).await?;
      let pending = self.rewrite.lock().unwrap().take();
      if let Some((rewrite_key, fresh)) = pending {
        self.inner.set_string(&rewrite_key, &fresh).await?;
      }
      Ok(value)
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<(), StorageError> {
      self.inner.set_string(key, value).await
    }

    async fn remove_key(&self, key: &str) -> Result<(), StorageError> {
      self.inner.remove_key(key).await
    }

    async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
      self.inner.list_keys().await
    }

    async fn remove_if_equals(&self, key: &str, expected: &str) -> Result<bool, StorageError> {
      self.inner.remove_if_equals(key, expected).await
    }
  }

  #[tokio::test]
  async fn test_expiry_does_not_delete_concurrent_rewrite() {
    let storage = Arc::new(RewriteAfterRead {
      inner: MemoryStore::new(),
      rewrite: std::sync::Mutex::new(None),
    });
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let cache = CacheStore::new(storage.clone(), clock.clone());

    cache.put("grades:7", &grade(), Some(Duration::from_secs(60))).await;
    let stale = storage.inner.get_string("cache:grades:7").await.unwrap().unwrap();
    clock.advance(Duration::from_secs(61));

    let fresh_grade = Grade {
      subject: "maths".to_string(),
      score: 95,
    };
    cache.put("grades:7", &fresh_grade, None).await;
    let fresh = storage.inner.get_string("cache:grades:7").await.unwrap().unwrap();
    storage.inner.set_string("cache:grades:7", &stale).await.unwrap();
    *storage.rewrite.lock().unwrap() = Some(("cache:grades:7".to_string(), fresh));

    assert_eq!(
      cache.lookup::<Grade>("grades:7").await.miss_reason(),
      Some(MissReason::Expired)
    );
    assert_eq!(cache.get::<Grade>("grades:7").await, Some(fresh_grade));
  }

  #[tokio::test]
  async fn test_storage_failures_are_swallowed() {
    let cache = CacheStore::new(Arc::new(UnavailableStore), Arc::new(ManualClock::new(0)));

    cache.put("k", &1, None).await;
    assert_eq!(
      cache.lookup::<i32>("k").await.miss_reason(),
      Some(MissReason::Unavailable)
    );
    assert!(!cache.has("k").await);
    cache.remove("k").await;
    cache.clear_all().await;
    assert_eq!(cache.size_bytes().await, 0);
    assert_eq!(cache.evict_expired().await, 0);
  }
}
