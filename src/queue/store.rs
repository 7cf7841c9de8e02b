//! Durable FIFO of pending mutations.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::item::{ItemPatch, MutationKind, MutationQueueItem};
use crate::clock::Clock;
use crate::error::QueueError;
use crate::storage::KeyValueStore;

/// Storage key holding the whole queue as one JSON array.
pub const QUEUE_KEY: &str = "sync_queue:items";

/// Prefix under which unreadable queue snapshots are set aside.
pub const QUARANTINE_PREFIX: &str = "sync_queue:corrupt:";

/// Ordered, persisted list of writes awaiting replay.
///
/// The backing store has no transactions, so every read-modify-write of the
/// list goes through one async mutex. Clones share that mutex.
#[derive(Clone)]
pub struct MutationQueue {
  storage: Arc<dyn KeyValueStore>,
  clock: Arc<dyn Clock>,
  writer: Arc<Mutex<()>>,
}

impl MutationQueue {
  pub fn new(storage: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
    Self {
      storage,
      clock,
      writer: Arc::new(Mutex::new(())),
    }
  }

  /// Append a new item and return it.
  pub async fn enqueue(
    &self,
    kind: MutationKind,
    target: impl Into<String>,
    payload: Option<Value>,
  ) -> Result<MutationQueueItem, QueueError> {
    let now = self.clock.now_ms();
    let payload = if kind.carries_payload() {
      payload
    } else {
      if payload.is_some() {
        debug!("Dropping payload of queued delete");
      }
      None
    };

    let item = MutationQueueItem {
      id: generate_id(now),
      kind,
      target: target.into(),
      payload,
      enqueued_at: now,
      attempts: 0,
    };

    let _guard = self.writer.lock().await;
    let mut items = self.load().await?;
    items.push(item.clone());
    self.save(&items).await?;

    debug!(id = %item.id, kind = %item.kind, target = %item.target, "Queued mutation");
    Ok(item)
  }

  /// Snapshot of the queue in enqueue order.
  pub async fn list(&self) -> Result<Vec<MutationQueueItem>, QueueError> {
    let _guard = self.writer.lock().await;
    self.load().await
  }

  pub async fn len(&self) -> Result<usize, QueueError> {
    Ok(self.list().await?.len())
  }

  pub async fn is_empty(&self) -> Result<bool, QueueError> {
    Ok(self.len().await? == 0)
  }

  /// Delete the item with `id`; absent ids are ignored.
  pub async fn remove(&self, id: &str) -> Result<(), QueueError> {
    let _guard = self.writer.lock().await;
    let mut items = self.load().await?;
    let before = items.len();
    items.retain(|item| item.id != id);
    if items.len() != before {
      self.save(&items).await?;
    }
    Ok(())
  }

  /// Merge `patch` into the item with `id`; absent ids are ignored.
  pub async fn update(&self, id: &str, patch: ItemPatch) -> Result<(), QueueError> {
    let _guard = self.writer.lock().await;
    let mut items = self.load().await?;
    if let Some(item) = items.iter_mut().find(|item| item.id == id) {
      patch.apply(item);
      self.save(&items).await?;
    }
    Ok(())
  }

  /// Drop every pending item.
  pub async fn clear(&self) -> Result<(), QueueError> {
    let _guard = self.writer.lock().await;
    self.storage.remove_key(QUEUE_KEY).await?;
    Ok(())
  }

  /// Read the persisted list. Callers must hold the writer lock.
  async fn load(&self) -> Result<Vec<MutationQueueItem>, QueueError> {
    let Some(raw) = self.storage.get_string(QUEUE_KEY).await? else {
      return Ok(Vec::new());
    };

    match serde_json::from_str(&raw) {
      Ok(items) => Ok(items),
      Err(e) => {
        // Keep the unreadable text for diagnosis instead of overwriting it later
        let quarantine = format!("{}{}", QUARANTINE_PREFIX, self.clock.now_ms());
        error!(error = %e, quarantine = %quarantine, "Sync queue is unreadable, setting it aside");
        self.storage.set_string(&quarantine, &raw).await?;
        self.storage.remove_key(QUEUE_KEY).await?;
        Ok(Vec::new())
      }
    }
  }

  async fn save(&self, items: &[MutationQueueItem]) -> Result<(), QueueError> {
    if items.is_empty() {
      self.storage.remove_key(QUEUE_KEY).await?;
    } else {
      let json = serde_json::to_string(items)?;
      self.storage.set_string(QUEUE_KEY, &json).await?;
    }
    Ok(())
  }
}

/// `<epoch ms>_<9 random base36 chars>`.
fn generate_id(now_ms: i64) -> String {
  let suffix: String = rand::thread_rng()
    .sample_iter(&Alphanumeric)
    .take(9)
    .map(|b| char::from(b).to_ascii_lowercase())
    .collect();
  format!("{}_{}", now_ms, suffix)
}
