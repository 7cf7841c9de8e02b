//! Results returned by cache lookups and cache-backed reads.

use chrono::{DateTime, Utc};

/// Outcome of a single cache lookup.
///
/// A miss is an expected result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
  Hit {
    data: T,
    /// When the entry was written
    cached_at: DateTime<Utc>,
  },
  Miss(MissReason),
}

impl<T> Lookup<T> {
  pub fn is_hit(&self) -> bool {
    matches!(self, Lookup::Hit { .. })
  }

  pub fn into_option(self) -> Option<T> {
    match self {
      Lookup::Hit { data, .. } => Some(data),
      Lookup::Miss(_) => None,
    }
  }

  pub fn miss_reason(&self) -> Option<MissReason> {
    match self {
      Lookup::Hit { .. } => None,
      Lookup::Miss(reason) => Some(*reason),
    }
  }
}

/// Why a lookup produced no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
  /// Nothing stored under the key
  Absent,
  /// Entry outlived its expiry; it has been deleted
  Expired,
  /// Entry was written by another cache format version; it has been deleted
  SchemaMismatch,
  /// Stored text is not a cache entry; it has been deleted
  Corrupt,
  /// Entry is valid but its payload does not decode as the requested type
  TypeMismatch,
  /// Storage could not be read
  Unavailable,
}

/// Result from a cache-backed read, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  pub fn is_offline(&self) -> bool {
    self.source == CacheSource::Offline
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Network unavailable, serving the last known-good cached copy
  Offline,
}
