//! Persisted cache envelope and validity rules.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::clock::duration_ms;

/// Cache format version stamped on every entry written by this build.
pub const CURRENT_SCHEMA_VERSION: &str = "1.0.0";

/// Lifetime of an entry written without an explicit TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A cached payload and the metadata needed to decide whether it is still usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub data: T,
  /// Epoch ms when the entry was written
  pub timestamp: i64,
  /// Absolute expiry in epoch ms; `None` falls back to the default TTL
  pub expires_at: Option<i64>,
  pub schema_version: String,
}

/// Expiry and versioning rules applied to every read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
  pub default_ttl: Duration,
  pub schema_version: String,
}

impl Default for CachePolicy {
  fn default() -> Self {
    Self {
      default_ttl: DEFAULT_TTL,
      schema_version: CURRENT_SCHEMA_VERSION.to_string(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
  Valid,
  Expired,
  SchemaMismatch,
}

impl<T> CacheEntry<T> {
  /// Build an entry stamped with the policy's schema version.
  pub fn new(data: T, now_ms: i64, ttl: Option<Duration>, policy: &CachePolicy) -> Self {
    let ttl = ttl.unwrap_or(policy.default_ttl);
    Self {
      data,
      timestamp: now_ms,
      expires_at: Some(now_ms.saturating_add(duration_ms(ttl))),
      schema_version: policy.schema_version.clone(),
    }
  }

  /// Effective expiry in epoch ms.
  pub fn expiry_ms(&self, policy: &CachePolicy) -> i64 {
    self
      .expires_at
      .unwrap_or_else(|| self.timestamp.saturating_add(duration_ms(policy.default_ttl)))
  }

  /// An entry is valid while its schema matches and `now <= expiry`.
  pub fn validity(&self, now_ms: i64, policy: &CachePolicy) -> Validity {
    if self.schema_version != policy.schema_version {
      Validity::SchemaMismatch
    } else if now_ms > self.expiry_ms(policy) {
      Validity::Expired
    } else {
      Validity::Valid
    }
  }
}
