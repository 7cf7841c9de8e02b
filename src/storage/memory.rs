//! In-process storage that forgets everything on exit.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::traits::KeyValueStore;
use crate::error::StorageError;

/// Ephemeral storage backed by a sorted map.
///
/// Used when persistence is disabled and as the default backend in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
    self.entries.lock().map_err(|_| StorageError::Poisoned)
  }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
  async fn get_string(&self, key: &str) -> Result<Option<String>, StorageError> {
    Ok(self.lock()?.get(key).cloned())
  }

  async fn set_string(&self, key: &str, value: &str) -> Result<(), StorageError> {
    self.lock()?.insert(key.to_string(), value.to_string());
    Ok(())
  }

  async fn remove_key(&self, key: &str) -> Result<(), StorageError> {
    self.lock()?.remove(key);
    Ok(())
  }

  async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
    Ok(self.lock()?.keys().cloned().collect())
  }

  async fn remove_if_equals(&self, key: &str, expected: &str) -> Result<bool, StorageError> {
    let mut entries = self.lock()?;
    if entries.get(key).is_some_and(|current| current == expected) {
      entries.remove(key);
      Ok(true)
    } else {
      Ok(false)
    }
  }

  async fn remove_keys(&self, keys: &[String]) -> Result<(), StorageError> {
    let mut entries = self.lock()?;
    for key in keys {
      entries.remove(key);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_set_get_remove() {
    let store = MemoryStore::new();
    assert_eq!(store.get_string("a").await.unwrap(), None);

    store.set_string("a", "1").await.unwrap();
    store.set_string("a", "2").await.unwrap();
    assert_eq!(store.get_string("a").await.unwrap().as_deref(), Some("2"));

    store.remove_key("a").await.unwrap();
    store.remove_key("a").await.unwrap();
    assert_eq!(store.get_string("a").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_remove_if_equals_only_matches_current_value() {
    let store = MemoryStore::new();
    store.set_string("a", "new").await.unwrap();

    assert!(!store.remove_if_equals("a", "old").await.unwrap());
    assert_eq!(store.get_string("a").await.unwrap().as_deref(), Some("new"));

    assert!(store.remove_if_equals("a", "new").await.unwrap());
    assert_eq!(store.get_string("a").await.unwrap(), None);
    assert!(!store.remove_if_equals("a", "new").await.unwrap());
  }

  #[tokio::test]
  async fn test_keys_with_prefix() {
    let store = MemoryStore::new();
    store.set_string("cache:x", "1").await.unwrap();
    store.set_string("cache:y", "2").await.unwrap();
    store.set_string("session", "t").await.unwrap();

    let keys = store.keys_with_prefix("cache:").await.unwrap();
    assert_eq!(keys, vec!["cache:x".to_string(), "cache:y".to_string()]);

    store.remove_keys(&keys).await.unwrap();
    assert_eq!(store.list_keys().await.unwrap(), vec!["session".to_string()]);
  }
}
