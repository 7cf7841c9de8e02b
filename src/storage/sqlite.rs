//! SQLite-backed key-value storage.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::traits::KeyValueStore;
use crate::error::StorageError;

/// Durable storage in a single SQLite table.
///
/// Statements run on the blocking thread pool so a slow disk never stalls
/// the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
  conn: Arc<Mutex<Connection>>,
}

/// Schema for the key-value table.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteStore {
  /// Open (or create) the store at the default location.
  pub fn open_default() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open(&path)
  }

  /// Open (or create) the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// A private in-memory database, mostly for tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run storage migrations: {}", e))?;

    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offsync").join("store.db"))
  }

  /// Run `f` against the connection on the blocking pool.
  async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
  where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
  {
    let conn = Arc::clone(&self.conn);
    tokio::task::spawn_blocking(move || {
      let mut conn = conn.lock().map_err(|_| StorageError::Poisoned)?;
      f(&mut conn)
    })
    .await?
  }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
  async fn get_string(&self, key: &str) -> Result<Option<String>, StorageError> {
    let key = key.to_string();
    self
      .with_conn(move |conn| {
        let value: Option<String> = conn
          .query_row(
            "SELECT value FROM kv_store WHERE key = ?",
            params![key],
            |row| row.get(0),
          )
          .optional()?;
        Ok(value)
      })
      .await
  }

  async fn set_string(&self, key: &str, value: &str) -> Result<(), StorageError> {
    let key = key.to_string();
    let value = value.to_string();
    self
      .with_conn(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
           VALUES (?, ?, datetime('now'))",
          params![key, value],
        )?;
        Ok(())
      })
      .await
  }

  async fn remove_key(&self, key: &str) -> Result<(), StorageError> {
    let key = key.to_string();
    self
      .with_conn(move |conn| {
        conn.execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
        Ok(())
      })
      .await
  }

  async fn remove_if_equals(&self, key: &str, expected: &str) -> Result<bool, StorageError> {
    let key = key.to_string();
    let expected = expected.to_string();
    self
      .with_conn(move |conn| {
        let removed = conn.execute(
          "DELETE FROM kv_store WHERE key = ? AND value = ?",
          params![key, expected],
        )?;
        Ok(removed > 0)
      })
      .await
  }

  async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
    self
      .with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
        let keys = stmt
          .query_map([], |row| row.get(0))?
          .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
      })
      .await
  }

  async fn remove_keys(&self, keys: &[String]) -> Result<(), StorageError> {
    if keys.is_empty() {
      return Ok(());
    }
    let keys = keys.to_vec();
    self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        for key in &keys {
          tx.execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
        }
        tx.commit()?;
        Ok(())
      })
      .await
  }

  async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
    // substr comparison sidesteps LIKE wildcard escaping
    let prefix = prefix.to_string();
    self
      .with_conn(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT key FROM kv_store WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let keys = stmt
          .query_map(params![prefix], |row| row.get(0))?
          .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
      })
      .await
  }
}
