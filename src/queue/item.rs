//! Pending write operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::remote::Method;

/// Kind of write performed against a remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
  Create,
  Update,
  Delete,
}

impl MutationKind {
  /// Remote verb used to replay this kind of mutation.
  pub fn method(self) -> Method {
    match self {
      MutationKind::Create => Method::Post,
      MutationKind::Update => Method::Put,
      MutationKind::Delete => Method::Delete,
    }
  }

  pub fn carries_payload(self) -> bool {
    !matches!(self, MutationKind::Delete)
  }
}

impl fmt::Display for MutationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      MutationKind::Create => "create",
      MutationKind::Update => "update",
      MutationKind::Delete => "delete",
    })
  }
}

impl FromStr for MutationKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "create" => Ok(MutationKind::Create),
      "update" => Ok(MutationKind::Update),
      "delete" => Ok(MutationKind::Delete),
      other => Err(format!("unknown mutation kind '{}'", other)),
    }
  }
}

/// A write that could not be sent immediately, waiting in the sync queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationQueueItem {
  pub id: String,
  pub kind: MutationKind,
  /// Endpoint the mutation applies to
  pub target: String,
  /// Body for create/update; always `None` for delete
  pub payload: Option<Value>,
  /// Epoch ms when the item was queued
  pub enqueued_at: i64,
  /// Failed send attempts so far
  pub attempts: u32,
}

/// Fields of a queued item that may change after enqueue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
  pub attempts: Option<u32>,
  pub payload: Option<Value>,
}

impl ItemPatch {
  pub fn attempts(attempts: u32) -> Self {
    Self {
      attempts: Some(attempts),
      payload: None,
    }
  }

  pub(crate) fn apply(self, item: &mut MutationQueueItem) {
    if let Some(attempts) = self.attempts {
      item.attempts = attempts;
    }
    if let Some(payload) = self.payload {
      if item.kind.carries_payload() {
        item.payload = Some(payload);
      }
    }
  }
}
