//! Time source used for cache expiry and queue timestamps.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Supplies the current time as milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
  fn now_ms(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_ms(&self) -> i64 {
    Utc::now().timestamp_millis()
  }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
  now: AtomicI64,
}

impl ManualClock {
  pub fn new(start_ms: i64) -> Self {
    Self {
      now: AtomicI64::new(start_ms),
    }
  }

  pub fn advance(&self, by: Duration) {
    self.now.fetch_add(duration_ms(by), Ordering::SeqCst);
  }

  pub fn set(&self, ms: i64) {
    self.now.store(ms, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now_ms(&self) -> i64 {
    self.now.load(Ordering::SeqCst)
  }
}

/// Convert a duration to whole milliseconds, saturating at `i64::MAX`.
pub fn duration_ms(d: Duration) -> i64 {
  i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
