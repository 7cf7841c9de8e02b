//! Sync status snapshot and the offline indicator derived from it.

use serde::Serialize;
use std::fmt;

use crate::queue::MutationQueueItem;

/// Point-in-time view of pending work, computed fresh on every request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
  /// Current queue length
  pub pending_operations: usize,
  /// Whether a drain pass is in flight
  pub is_syncing: bool,
  /// Latest `enqueued_at` among queued items
  pub last_attempt_at: Option<i64>,
}

impl SyncStatus {
  pub fn from_items(items: &[MutationQueueItem], is_syncing: bool) -> Self {
    Self {
      pending_operations: items.len(),
      is_syncing,
      last_attempt_at: items.iter().map(|item| item.enqueued_at).max(),
    }
  }

  /// What a lightweight status banner should show.
  pub fn indicator(&self, is_online: bool) -> Indicator {
    let pending = self.pending_operations;
    match (is_online, pending) {
      (true, 0) => Indicator::Hidden,
      (false, 0) => Indicator::Offline,
      (false, n) => Indicator::OfflinePending(n),
      (true, _) if self.is_syncing => Indicator::Syncing,
      (true, n) => Indicator::Pending(n),
    }
  }
}

/// Banner state for the "offline / N pending" indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
  /// Online with nothing pending
  Hidden,
  Offline,
  OfflinePending(usize),
  Syncing,
  Pending(usize),
}

impl fmt::Display for Indicator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Indicator::Hidden => Ok(()),
      Indicator::Offline => write!(f, "You are offline"),
      Indicator::OfflinePending(n) => write!(f, "Offline • {} pending", n),
      Indicator::Syncing => write!(f, "Syncing..."),
      Indicator::Pending(n) => write!(f, "{} pending sync", n),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::queue::MutationKind;

  fn item(enqueued_at: i64) -> MutationQueueItem {
    MutationQueueItem {
      id: enqueued_at.to_string(),
      kind: MutationKind::Create,
      target: "/a".into(),
      payload: None,
      enqueued_at,
      attempts: 0,
    }
  }

  #[test]
  fn test_snapshot_from_items() {
    let status = SyncStatus::from_items(&[item(5), item(9), item(7)], true);
    assert_eq!(status.pending_operations, 3);
    assert!(status.is_syncing);
    assert_eq!(status.last_attempt_at, Some(9));

    assert_eq!(SyncStatus::from_items(&[], false), SyncStatus::default());
  }

  #[test]
  fn test_indicator_states() {
    let idle = SyncStatus::default();
    assert_eq!(idle.indicator(true), Indicator::Hidden);
    assert_eq!(idle.indicator(false), Indicator::Offline);

    let pending = SyncStatus {
      pending_operations: 3,
      ..SyncStatus::default()
    };
    assert_eq!(pending.indicator(false), Indicator::OfflinePending(3));
    assert_eq!(pending.indicator(true), Indicator::Pending(3));

    let syncing = SyncStatus {
      is_syncing: true,
      ..pending
    };
    assert_eq!(syncing.indicator(true), Indicator::Syncing);
  }

  #[test]
  fn test_indicator_labels() {
    assert_eq!(Indicator::OfflinePending(3).to_string(), "Offline • 3 pending");
    assert_eq!(Indicator::Pending(1).to_string(), "1 pending sync");
    assert_eq!(Indicator::Hidden.to_string(), "");
  }
}
