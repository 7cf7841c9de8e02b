//! Stable cache keys derived from remote endpoints.

use sha2::{Digest, Sha256};
use url::{form_urlencoded, Url};

/// Something that can name a cache entry.
pub trait QueryKey {
  /// Key under which the result is cached.
  fn cache_hash(&self) -> String;

  /// Human-readable form for logs.
  fn description(&self) -> String;
}

impl QueryKey for str {
  fn cache_hash(&self) -> String {
    self.to_string()
  }

  fn description(&self) -> String {
    self.to_string()
  }
}

impl QueryKey for String {
  fn cache_hash(&self) -> String {
    self.clone()
  }

  fn description(&self) -> String {
    self.clone()
  }
}

/// A normalized endpoint, e.g. `/attendance/42?month=2024-03`.
///
/// Equivalent spellings (trailing slash, doubled slashes, reordered query
/// parameters) map to the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointKey {
  segments: Vec<String>,
  query: Vec<(String, String)>,
}

impl EndpointKey {
  pub fn parse(endpoint: &str) -> Self {
    let trimmed = endpoint.trim();
    let (path, query) = match Url::parse(trimmed) {
      Ok(url) => (url.path().to_string(), url.query().unwrap_or_default().to_string()),
      Err(_) => {
        let (path, query) = trimmed.split_once('?').unwrap_or((trimmed, ""));
        (path.to_string(), query.to_string())
      }
    };

    let segments = path
      .split('/')
      .filter(|s| !s.is_empty())
      .map(String::from)
      .collect();

    let mut query: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
      .map(|(k, v)| (k.into_owned(), v.into_owned()))
      .collect();
    query.sort();

    Self { segments, query }
  }

  /// First path segment, used to group related entries for invalidation.
  pub fn scope(&self) -> &str {
    self.segments.first().map(String::as_str).unwrap_or("root")
  }

  fn normalized(&self) -> String {
    let mut out = format!("/{}", self.segments.join("/"));
    if !self.query.is_empty() {
      let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(self.query.iter())
        .finish();
      out.push('?');
      out.push_str(&query);
    }
    out
  }
}

impl QueryKey for EndpointKey {
  fn cache_hash(&self) -> String {
    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(self.normalized().as_bytes());
    let result = hasher.finalize();
    format!("{}:{}", self.scope(), hex::encode(result))
  }

  fn description(&self) -> String {
    self.normalized()
  }
}
