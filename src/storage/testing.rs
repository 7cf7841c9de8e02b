//! Storage doubles shared by unit tests.

use async_trait::async_trait;

use super::traits::KeyValueStore;
use crate::error::StorageError;

/// A store whose every operation fails, like a missing or read-only disk.
pub(crate) struct UnavailableStore;

fn gone() -> StorageError {
  StorageError::Unavailable("disk gone".into())
}

#[async_trait]
impl KeyValueStore for UnavailableStore {
  async fn get_string(&self, _key: &str) -> Result<Option<String>, StorageError> {
    Err(gone())
  }

  async fn set_string(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
    Err(gone())
  }

  async fn remove_key(&self, _key: &str) -> Result<(), StorageError> {
    Err(gone())
  }

  async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
    Err(gone())
  }
}
