//! Offline-aware client that composes the cache, the queue and the remote service.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{CacheResult, CacheStore, EndpointKey, Lookup, QueryKey};
use crate::error::{ClientError, QueueError, RemoteError};
use crate::queue::{MutationKind, MutationQueueItem};
use crate::remote::{Method, RemoteService};
use crate::sync::{ConnectivityObserver, SyncManager};

/// What happened to a write.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
  /// Sent to the remote service; carries its response
  Sent(Value),
  /// Stored for replay by the sync manager
  Queued(MutationQueueItem),
}

/// Bounded exponential backoff for reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Retries after the first attempt
  pub max_retries: u32,
  /// Delay before the first retry; doubles for each one after
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(30),
    }
  }
}

impl RetryPolicy {
  /// Single attempt, no retries.
  pub fn none() -> Self {
    Self {
      max_retries: 0,
      ..Self::default()
    }
  }

  /// Delay before retry number `retry`, counting from zero.
  pub fn delay(&self, retry: u32) -> Duration {
    let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
    self
      .base_delay
      .checked_mul(factor)
      .map_or(self.max_delay, |delay| delay.min(self.max_delay))
  }

  /// Rejected credentials are never retried.
  fn allows(&self, retry: u32, err: &RemoteError) -> bool {
    retry < self.max_retries && !err.is_auth()
  }
}

/// Remote client with transparent caching and offline write queueing.
///
/// Reads always ask the remote service first. A successful read is written
/// through to the cache; a failed one falls back to the last known-good
/// copy. Writes go straight out while online and into the mutation queue
/// while offline; a write that went out drops the cached reads of its scope.
#[derive(Clone)]
pub struct OfflineClient {
  remote: Arc<dyn RemoteService>,
  cache: CacheStore,
  sync: Arc<SyncManager>,
  connectivity: Arc<dyn ConnectivityObserver>,
  retry: RetryPolicy,
}

impl OfflineClient {
  pub fn new(
    remote: Arc<dyn RemoteService>,
    cache: CacheStore,
    sync: Arc<SyncManager>,
    connectivity: Arc<dyn ConnectivityObserver>,
  ) -> Self {
    Self {
      remote,
      cache,
      sync,
      connectivity,
      retry: RetryPolicy::default(),
    }
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn cache(&self) -> &CacheStore {
    &self.cache
  }

  pub fn sync(&self) -> &SyncManager {
    &self.sync
  }

  pub fn is_online(&self) -> bool {
    self.connectivity.is_online()
  }

  /// Read `endpoint`, cached under a key derived from the endpoint itself.
  pub async fn fetch<T: DeserializeOwned>(
    &self,
    endpoint: &str,
    ttl: Option<Duration>,
  ) -> Result<CacheResult<T>, ClientError> {
    let key = EndpointKey::parse(endpoint);
    self.fetch_keyed(endpoint, &key, ttl).await
  }

  /// Read `endpoint`, cached under `key`.
  pub async fn fetch_keyed<T, K>(
    &self,
    endpoint: &str,
    key: &K,
    ttl: Option<Duration>,
  ) -> Result<CacheResult<T>, ClientError>
  where
    T: DeserializeOwned,
    K: QueryKey + ?Sized,
  {
    let cache_key = key.cache_hash();

    match self.read_remote::<T>(endpoint).await {
      Ok((data, raw)) => {
        self.cache.put(&cache_key, &raw, ttl).await;
        Ok(CacheResult::from_network(data))
      }
      Err(err) => match self.cache.lookup::<T>(&cache_key).await {
        Lookup::Hit { data, cached_at } => {
          debug!(key = %key.description(), error = %err, "Serving cached data");
          Ok(CacheResult::offline(data, cached_at))
        }
        Lookup::Miss(reason) => {
          debug!(key = %key.description(), ?reason, "No cached fallback");
          Err(err.into())
        }
      },
    }
  }

  /// GET and decode, retrying with backoff while the device is online.
  async fn read_remote<T: DeserializeOwned>(
    &self,
    endpoint: &str,
  ) -> Result<(T, Value), RemoteError> {
    let mut retry = 0;
    loop {
      let attempt = match self.remote.call(Method::Get, endpoint, None).await {
        Ok(value) => serde_json::from_value::<T>(value.clone())
          .map(|data| (data, value))
          .map_err(|e| RemoteError::Decode(e.to_string())),
        Err(e) => Err(e),
      };

      match attempt {
        Err(err) if self.retry.allows(retry, &err) && self.connectivity.is_online() => {
          let delay = self.retry.delay(retry);
          retry += 1;
          debug!(endpoint, retry, ?delay, error = %err, "Retrying read");
          tokio::time::sleep(delay).await;
        }
        result => return result,
      }
    }
  }

  /// Send a write now, or queue it when the device is offline.
  ///
  /// A write that fails because the network dropped mid-request is queued
  /// too; answers from the server (HTTP errors) are returned to the caller.
  pub async fn mutate<T: Serialize + ?Sized>(
    &self,
    kind: MutationKind,
    target: &str,
    payload: Option<&T>,
  ) -> Result<MutationOutcome, ClientError> {
    let body = payload
      .filter(|_| kind.carries_payload())
      .map(serde_json::to_value)
      .transpose()
      .map_err(QueueError::from)?;

    if !self.connectivity.is_online() {
      return self.enqueue(kind, target, body).await;
    }

    match self.remote.call(kind.method(), target, body.as_ref()).await {
      Ok(response) => {
        let key = EndpointKey::parse(target);
        self.cache.invalidate_scope(key.scope()).await;
        Ok(MutationOutcome::Sent(response))
      }
      Err(err) if err.is_connectivity() => {
        warn!(%kind, target, error = %err, "Write failed in transit, queueing for sync");
        self.enqueue(kind, target, body).await
      }
      Err(err) => Err(err.into()),
    }
  }

  async fn enqueue(
    &self,
    kind: MutationKind,
    target: &str,
    body: Option<Value>,
  ) -> Result<MutationOutcome, ClientError> {
    let item = self.sync.queue().enqueue(kind, target, body).await?;
    Ok(MutationOutcome::Queued(item))
  }

  /// Forget everything tied to the current user: cached reads and pending writes.
  pub async fn reset(&self) -> Result<(), ClientError> {
    self.cache.clear_all().await;
    self.sync.clear_pending_operations().await?;
    info!("Cleared cache and pending operations");
    Ok(())
  }
}
