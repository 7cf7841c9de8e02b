//! Remote data service abstraction.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::RemoteError;

/// HTTP-like verb of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Asynchronous fetch/mutate calls keyed by endpoint.
///
/// The wire format is the implementor's business; bodies and responses are
/// JSON values at this seam.
#[async_trait]
pub trait RemoteService: Send + Sync {
  async fn call(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<&Value>,
  ) -> Result<Value, RemoteError>;
}

#[async_trait]
impl<R: RemoteService + ?Sized> RemoteService for Arc<R> {
  async fn call(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<&Value>,
  ) -> Result<Value, RemoteError> {
    (**self).call(method, endpoint, body).await
  }
}
