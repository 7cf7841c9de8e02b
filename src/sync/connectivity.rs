//! Online/offline signal with change notifications.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use url::Url;

/// Current connectivity plus a way to hear about changes.
///
/// Dropping the receiver returned by [`subscribe`](Self::subscribe)
/// unsubscribes.
pub trait ConnectivityObserver: Send + Sync {
  fn is_online(&self) -> bool;

  fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Connectivity state held in a watch channel.
///
/// Whoever knows about the network (a platform callback, [`NetworkProbe`],
/// a test) calls [`set_online`](Self::set_online); subscribers only wake on
/// actual transitions.
#[derive(Clone)]
pub struct Connectivity {
  tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
  pub fn new(initially_online: bool) -> Self {
    let (tx, _rx) = watch::channel(initially_online);
    Self { tx: Arc::new(tx) }
  }

  pub fn set_online(&self, online: bool) {
    let changed = self.tx.send_if_modified(|current| {
      if *current == online {
        false
      } else {
        *current = online;
        true
      }
    });
    if changed {
      info!(online, "Connectivity changed");
    }
  }
}

impl ConnectivityObserver for Connectivity {
  fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

/// Periodic reachability check against the API host.
///
/// Any HTTP response counts as reachable; only transport failures and
/// timeouts count as offline.
#[derive(Clone)]
pub struct NetworkProbe {
  client: reqwest::Client,
  url: Url,
  interval: Duration,
}

impl NetworkProbe {
  pub fn new(url: &str, interval: Duration, timeout: Duration) -> Result<Self> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid probe URL '{}': {}", url, e))?;
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      url,
      interval,
    })
  }

  /// One reachability check.
  pub async fn check(&self) -> bool {
    match self.client.head(self.url.clone()).send().await {
      Ok(_) => true,
      Err(e) => {
        debug!(url = %self.url, error = %e, "Probe failed");
        false
      }
    }
  }

  /// Check on every interval and publish the result into `connectivity`.
  pub fn spawn(self, connectivity: Connectivity) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(self.interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let online = self.check().await;
        connectivity.set_online(online);
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::method;
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[tokio::test]
  async fn test_subscribers_see_transitions_only() {
    let connectivity = Connectivity::new(true);
    let mut rx = connectivity.subscribe();

    connectivity.set_online(true);
    assert!(!rx.has_changed().unwrap());

    connectivity.set_online(false);
    assert!(rx.has_changed().unwrap());
    assert!(!*rx.borrow_and_update());
    assert!(!connectivity.is_online());
  }

  #[tokio::test]
  async fn test_probe_treats_any_response_as_reachable() {
    let mock_server = MockServer::start().await;
    Mock::given(method("HEAD"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&mock_server)
      .await;

    let probe = NetworkProbe::new(
      &mock_server.uri(),
      Duration::from_secs(1),
      Duration::from_secs(2),
    )
    .unwrap();
    assert!(probe.check().await);
  }

  #[tokio::test]
  async fn test_probe_unreachable_host() {
    let probe = NetworkProbe::new(
      "http://127.0.0.1:9",
      Duration::from_secs(1),
      Duration::from_secs(2),
    )
    .unwrap();
    assert!(!probe.check().await);
  }

  #[tokio::test]
  async fn test_spawned_probe_publishes_state() {
    let mock_server = MockServer::start().await;
    Mock::given(method("HEAD"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&mock_server)
      .await;

    let connectivity = Connectivity::new(false);
    let mut rx = connectivity.subscribe();
    let probe = NetworkProbe::new(
      &mock_server.uri(),
      Duration::from_millis(50),
      Duration::from_secs(2),
    )
    .unwrap();
    let handle = probe.spawn(connectivity.clone());

    tokio::time::timeout(Duration::from_secs(5), rx.changed())
      .await
      .expect("probe should report reachability")
      .unwrap();
    assert!(connectivity.is_online());

    handle.abort();
  }
}
