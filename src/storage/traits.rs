//! Storage backend trait.

use async_trait::async_trait;

use crate::error::StorageError;

/// Asynchronous string key-value storage.
///
/// `set_string` must replace a value atomically: a concurrent reader sees
/// either the old or the new value, never a partial write.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
  /// Read a value, `None` if the key is absent.
  async fn get_string(&self, key: &str) -> Result<Option<String>, StorageError>;

  /// Insert or replace a value.
  async fn set_string(&self, key: &str, value: &str) -> Result<(), StorageError>;

  /// Delete a key. Deleting an absent key is not an error.
  async fn remove_key(&self, key: &str) -> Result<(), StorageError>;

  /// Every key currently stored.
  async fn list_keys(&self) -> Result<Vec<String>, StorageError>;

  /// Delete `key` only while it still holds `expected`. Returns whether it was removed.
  ///
  /// The default reads then deletes; backends that can compare and delete in
  /// one step should override it.
  async fn remove_if_equals(&self, key: &str, expected: &str) -> Result<bool, StorageError> {
    match self.get_string(key).await? {
      Some(current) if current == expected => {
        self.remove_key(key).await?;
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  /// Delete several keys. Backends with transactions should override this.
  async fn remove_keys(&self, keys: &[String]) -> Result<(), StorageError> {
    for key in keys {
      self.remove_key(key).await?;
    }
    Ok(())
  }

  /// Keys starting with `prefix`.
  async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
    let keys = self.list_keys().await?;
    Ok(keys.into_iter().filter(|k| k.starts_with(prefix)).collect())
  }
}
