//! Background replay of queued mutations.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::connectivity::ConnectivityObserver;
use super::status::SyncStatus;
use crate::error::{QueueError, RemoteError};
use crate::queue::{ItemPatch, MutationKind, MutationQueue, MutationQueueItem};
use crate::remote::RemoteService;

/// Timing and retry limits for the sync manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
  /// Period of the automatic drain timer
  pub interval: Duration,
  /// Failed attempts after which an item is discarded
  pub max_attempts: u32,
  /// Bound on each replayed remote call
  pub request_timeout: Duration,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      interval: Duration::from_secs(30),
      max_attempts: 3,
      request_timeout: Duration::from_secs(10),
    }
  }
}

/// What one call to [`SyncManager::sync_now`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
  /// Items dispatched to the remote service
  pub attempted: usize,
  /// Items sent and removed
  pub succeeded: usize,
  /// Items that failed and stay queued with a bumped attempt count
  pub retried: usize,
  /// Items that failed for the last time and were dropped
  pub discarded: usize,
  /// The call joined a pass that was already running instead of starting one
  pub coalesced: bool,
}

/// Drains the mutation queue against the remote service.
///
/// At most one drain pass runs at a time. A pass walks a snapshot of the
/// queue exactly once, in order; items enqueued meanwhile wait for the next
/// pass. Passes run on their own task, so stopping the timer or dropping a
/// `sync_now` future never cuts one short.
pub struct SyncManager {
  inner: Arc<Inner>,
}

struct Inner {
  queue: MutationQueue,
  remote: Arc<dyn RemoteService>,
  settings: SyncSettings,
  syncing: AtomicBool,
  /// Held for the duration of a pass
  drain: Mutex<()>,
  /// Passes finished so far
  completed: AtomicU64,
  timer: StdMutex<Option<JoinHandle<()>>>,
  watcher: StdMutex<Option<JoinHandle<()>>>,
}

impl SyncManager {
  pub fn new(queue: MutationQueue, remote: Arc<dyn RemoteService>, settings: SyncSettings) -> Self {
    Self {
      inner: Arc::new(Inner {
        queue,
        remote,
        settings,
        syncing: AtomicBool::new(false),
        drain: Mutex::new(()),
        completed: AtomicU64::new(0),
        timer: StdMutex::new(None),
        watcher: StdMutex::new(None),
      }),
    }
  }

  pub fn queue(&self) -> &MutationQueue {
    &self.inner.queue
  }

  pub fn settings(&self) -> &SyncSettings {
    &self.inner.settings
  }

  /// Start the recurring drain timer, replacing any running one.
  pub fn start_auto_sync(&self) {
    self.inner.start_timer();
  }

  /// Stop the recurring drain timer. A pass already running completes.
  pub fn stop_auto_sync(&self) {
    self.inner.stop_timer();
  }

  pub fn is_auto_syncing(&self) -> bool {
    self.inner.timer_running()
  }

  /// Run one drain pass now, or wait for the one in flight.
  ///
  /// A call that waits is satisfied by any pass that finishes after it was
  /// made; if none does, it runs its own. Never fails: per-item failures are
  /// accounted for in the report.
  pub async fn sync_now(&self) -> SyncReport {
    self.inner.spawn_pass().await
  }

  /// Queue a mutation for the next pass.
  pub async fn queue_operation<T: Serialize + ?Sized>(
    &self,
    kind: MutationKind,
    target: &str,
    payload: Option<&T>,
  ) -> Result<MutationQueueItem, QueueError> {
    let payload = payload.map(serde_json::to_value).transpose()?;
    self.inner.queue.enqueue(kind, target, payload).await
  }

  /// Fresh snapshot of pending work. Never triggers a pass.
  ///
  /// A storage failure reports zero pending rather than an error.
  pub async fn get_sync_status(&self) -> SyncStatus {
    let is_syncing = self.inner.syncing.load(Ordering::SeqCst);
    match self.inner.queue.list().await {
      Ok(items) => SyncStatus::from_items(&items, is_syncing),
      Err(e) => {
        warn!(error = %e, "Failed to read sync queue for status");
        SyncStatus {
          is_syncing,
          ..SyncStatus::default()
        }
      }
    }
  }

  /// Drop every pending mutation, e.g. on logout.
  pub async fn clear_pending_operations(&self) -> Result<(), QueueError> {
    self.inner.queue.clear().await
  }

  /// Start the timer while `observer` reports online and stop it while offline.
  ///
  /// Coming back online also triggers an immediate pass. Replaces any
  /// previous subscription.
  pub fn follow_connectivity(&self, observer: &dyn ConnectivityObserver) {
    let mut rx = observer.subscribe();
    let inner = Arc::clone(&self.inner);

    let handle = tokio::spawn(async move {
      let mut online = *rx.borrow_and_update();
      inner.apply_connectivity(online, false);

      while rx.changed().await.is_ok() {
        let now_online = *rx.borrow_and_update();
        if now_online != online {
          inner.apply_connectivity(now_online, now_online);
          online = now_online;
        }
      }
      debug!("Connectivity source closed");
    });

    if let Some(previous) = lock_slot(&self.inner.watcher).replace(handle) {
      previous.abort();
    }
  }

  /// Stop following connectivity changes. The timer is left as is.
  pub fn unfollow_connectivity(&self) {
    if let Some(handle) = lock_slot(&self.inner.watcher).take() {
      handle.abort();
    }
  }
}

impl Drop for SyncManager {
  fn drop(&mut self) {
    self.unfollow_connectivity();
    self.inner.stop_timer();
  }
}

fn lock_slot(
  slot: &StdMutex<Option<JoinHandle<()>>>,
) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
  // The slot only holds a handle; a panic elsewhere cannot leave it half-written
  slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Inner {
  fn start_timer(self: &Arc<Self>) {
    let inner = Arc::clone(self);
    let period = self.settings.interval;

    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      // Skip the first tick (immediate)
      ticker.tick().await;

      loop {
        ticker.tick().await;
        inner.spawn_pass().await;
      }
    });

    if let Some(previous) = lock_slot(&self.timer).replace(handle) {
      previous.abort();
    }
    debug!(interval = ?period, "Auto sync started");
  }

  fn stop_timer(&self) {
    if let Some(handle) = lock_slot(&self.timer).take() {
      handle.abort();
      debug!("Auto sync stopped");
    }
  }

  fn timer_running(&self) -> bool {
    lock_slot(&self.timer)
      .as_ref()
      .is_some_and(|handle| !handle.is_finished())
  }

  fn apply_connectivity(self: &Arc<Self>, online: bool, regained: bool) {
    if online {
      self.start_timer();
      if regained {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
          inner.spawn_pass().await;
        });
      }
    } else {
      self.stop_timer();
    }
  }

  /// Run a pass on its own task and wait for it.
  async fn spawn_pass(self: &Arc<Self>) -> SyncReport {
    let inner = Arc::clone(self);
    match tokio::spawn(async move { inner.drain().await }).await {
      Ok(report) => report,
      Err(e) => {
        error!(error = %e, "Sync pass panicked");
        SyncReport::default()
      }
    }
  }

  async fn drain(&self) -> SyncReport {
    let seen = self.completed.load(Ordering::SeqCst);
    let _pass = match self.drain.try_lock() {
      Ok(guard) => guard,
      Err(_) => {
        let guard = self.drain.lock().await;
        // A pass finished after we arrived; its completion is ours
        if self.completed.load(Ordering::SeqCst) != seen {
          return SyncReport {
            coalesced: true,
            ..SyncReport::default()
          };
        }
        // The lock was only held by another waiter; run our own pass
        guard
      }
    };

    let report = {
      self.syncing.store(true, Ordering::SeqCst);
      let _reset = SyncingFlag(&self.syncing);
      self.walk_queue().await
    };
    self.completed.fetch_add(1, Ordering::SeqCst);
    report
  }

  async fn walk_queue(&self) -> SyncReport {
    let mut report = SyncReport::default();

    let items = match self.queue.list().await {
      Ok(items) => items,
      Err(e) => {
        warn!(error = %e, "Failed to read sync queue");
        return report;
      }
    };

    if items.is_empty() {
      return report;
    }

    info!(pending = items.len(), "Syncing pending operations");

    for item in items {
      report.attempted += 1;
      match self.dispatch(&item).await {
        Ok(()) => {
          report.succeeded += 1;
          if let Err(e) = self.queue.remove(&item.id).await {
            warn!(id = %item.id, error = %e, "Failed to remove synced item");
          }
        }
        Err(err) => self.record_failure(&item, &err, &mut report).await,
      }
    }

    info!(
      succeeded = report.succeeded,
      retried = report.retried,
      discarded = report.discarded,
      "Sync completed"
    );
    report
  }

  async fn dispatch(&self, item: &MutationQueueItem) -> Result<(), RemoteError> {
    let timeout = self.settings.request_timeout;
    let call = self
      .remote
      .call(item.kind.method(), &item.target, item.payload.as_ref());

    match tokio::time::timeout(timeout, call).await {
      Ok(result) => result.map(|_| ()),
      Err(_) => Err(RemoteError::Timeout(timeout)),
    }
  }

  async fn record_failure(
    &self,
    item: &MutationQueueItem,
    err: &RemoteError,
    report: &mut SyncReport,
  ) {
    let attempts = item.attempts + 1;

    if attempts >= self.settings.max_attempts {
      report.discarded += 1;
      warn!(
        id = %item.id,
        kind = %item.kind,
        target = %item.target,
        attempts,
        permanent = err.is_permanent(),
        error = %err,
        "Discarding mutation after final failed attempt"
      );
      if let Err(e) = self.queue.remove(&item.id).await {
        warn!(id = %item.id, error = %e, "Failed to remove discarded item");
      }
    } else {
      report.retried += 1;
      debug!(id = %item.id, attempts, error = %err, "Failed to sync item");
      if let Err(e) = self.queue.update(&item.id, ItemPatch::attempts(attempts)).await {
        warn!(id = %item.id, error = %e, "Failed to record sync attempt");
      }
    }
  }
}

/// Clears the in-flight flag however the pass ends.
struct SyncingFlag<'a>(&'a AtomicBool);

impl Drop for SyncingFlag<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}
