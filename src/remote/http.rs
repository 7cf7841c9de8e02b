//! Remote data service over HTTP/JSON.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::traits::{Method, RemoteService};
use crate::error::RemoteError;

/// JSON API client rooted at a base URL.
#[derive(Clone)]
pub struct HttpRemote {
  client: reqwest::Client,
  base: Url,
  token: Option<String>,
  timeout: Duration,
}

impl HttpRemote {
  /// Create a client for `base_url`; every request is bounded by `timeout`.
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
    let mut base =
      Url::parse(base_url).map_err(|e| eyre!("Invalid API URL '{}': {}", base_url, e))?;

    // Endpoints are joined relative to the base path, which must end in '/'
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      token: None,
      timeout,
    })
  }

  /// Send `Authorization: Bearer <token>` with every request.
  pub fn with_token(mut self, token: impl Into<String>) -> Self {
    self.token = Some(token.into());
    self
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  /// Resolve `endpoint` against the base URL.
  ///
  /// Absolute URLs are accepted only on the API's own origin, so the bearer
  /// token never leaves it.
  fn url(&self, endpoint: &str) -> Result<Url, RemoteError> {
    if let Ok(absolute) = Url::parse(endpoint) {
      if absolute.origin() != self.base.origin() {
        return Err(RemoteError::InvalidEndpoint(format!(
          "'{}' is outside {}",
          endpoint,
          self.base.origin().ascii_serialization()
        )));
      }
      return Ok(absolute);
    }
    self
      .base
      .join(endpoint.trim_start_matches('/'))
      .map_err(|e| RemoteError::InvalidEndpoint(format!("'{}': {}", endpoint, e)))
  }

  fn classify(&self, err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
      RemoteError::Timeout(self.timeout)
    } else {
      RemoteError::Transport(err.to_string())
    }
  }
}

fn to_reqwest(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Delete => reqwest::Method::DELETE,
  }
}

#[async_trait]
impl RemoteService for HttpRemote {
  async fn call(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<&Value>,
  ) -> Result<Value, RemoteError> {
    let url = self.url(endpoint)?;
    debug!(%method, %url, "Remote call");

    let mut request = self.client.request(to_reqwest(method), url);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }
    if let Some(body) = body {
      request = request.json(body);
    }

    let response = request.send().await.map_err(|e| self.classify(e))?;

    let status = response.status();
    if !status.is_success() {
      return Err(RemoteError::Status {
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or("unknown status").to_string(),
      });
    }

    let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
    if bytes.is_empty() {
      return Ok(Value::Null);
    }

    match serde_json::from_slice(&bytes) {
      Ok(value) => Ok(value),
      // A write the server accepted has been applied, whatever it answered with
      Err(e) if method != Method::Get => {
        debug!(%method, error = %e, "Write acknowledged with a non-JSON body");
        Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
      }
      Err(e) => Err(RemoteError::Decode(e.to_string())),
    }
  }
}
