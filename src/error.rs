//! Error types shared across the storage, queue, remote and client layers.

use std::time::Duration;

/// Failures of the persisted key-value backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
  /// SQLite returned an error.
  #[error("storage backend error: {0}")]
  Backend(#[from] rusqlite::Error),

  /// A previous holder of the connection lock panicked.
  #[error("storage lock poisoned")]
  Poisoned,

  /// The blocking task running the statement did not complete.
  #[error("storage task failed: {0}")]
  Task(#[from] tokio::task::JoinError),

  /// Backend refused the operation for another reason.
  #[error("storage unavailable: {0}")]
  Unavailable(String),
}

/// Failures that prevent a queue change from being durably recorded.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
  #[error(transparent)]
  Storage(#[from] StorageError),

  #[error("failed to encode sync queue: {0}")]
  Encode(#[from] serde_json::Error),
}

/// Failures reported by a remote data service.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
  /// The request never produced a response (DNS, refused connection, reset).
  #[error("network error: {0}")]
  Transport(String),

  /// No response within the configured request timeout.
  #[error("request timed out after {0:?}")]
  Timeout(Duration),

  /// The service answered with a non-success status.
  #[error("HTTP {status}: {message}")]
  Status { status: u16, message: String },

  /// The response body could not be decoded into the expected shape.
  #[error("failed to decode response: {0}")]
  Decode(String),

  /// The endpoint cannot be turned into a request against the configured API.
  #[error("invalid endpoint: {0}")]
  InvalidEndpoint(String),
}

impl RemoteError {
  /// Whether retrying the same request can never succeed.
  ///
  /// Client errors are permanent, except request timeout (408) and rate
  /// limiting (429) which depend on server load.
  pub fn is_permanent(&self) -> bool {
    match self {
      Self::Status { status, .. } => (400..500).contains(status) && *status != 408 && *status != 429,
      Self::Decode(_) | Self::InvalidEndpoint(_) => true,
      Self::Transport(_) | Self::Timeout(_) => false,
    }
  }

  /// Whether the service refused the caller's credentials (401 or 403).
  pub fn is_auth(&self) -> bool {
    matches!(self, Self::Status { status: 401 | 403, .. })
  }

  /// Whether the failure looks like lost connectivity rather than a server answer.
  pub fn is_connectivity(&self) -> bool {
    matches!(self, Self::Transport(_) | Self::Timeout(_))
  }
}

/// Failures surfaced by [`crate::client::OfflineClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
  #[error(transparent)]
  Remote(#[from] RemoteError),

  #[error("unable to save offline, try again: {0}")]
  Queue(#[from] QueueError),
}
