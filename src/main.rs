mod cli;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use cli::{Args, Command};
use offsync::cache::{CacheSource, CacheStore};
use offsync::clock::{Clock, SystemClock};
use offsync::config::Config;
use offsync::queue::MutationQueue;
use offsync::remote::{HttpRemote, RemoteService};
use offsync::storage::{KeyValueStore, SqliteStore};
use offsync::sync::{Connectivity, NetworkProbe, SyncManager};
use offsync::OfflineClient;

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = offsync::logging::init(&config.logging)?;

  let store_path = args.store.as_deref().or(config.storage.path.as_deref());
  let storage: Arc<dyn KeyValueStore> = match store_path {
    Some(path) => Arc::new(SqliteStore::open(path)?),
    None => Arc::new(SqliteStore::open_default()?),
  };
  let clock: Arc<dyn Clock> = Arc::new(SystemClock);

  let mut http = HttpRemote::new(&config.api.url, config.api_timeout())?;
  if let Some(token) = Config::get_api_token() {
    http = http.with_token(token);
  }
  let remote: Arc<dyn RemoteService> = Arc::new(http);

  let probe = NetworkProbe::new(
    config.probe_url(),
    config.probe_interval(),
    config.api_timeout(),
  )?;
  // Commands that never read connectivity skip the check
  let initially_online = if args.command.needs_network() {
    probe.check().await
  } else {
    true
  };
  let connectivity = Connectivity::new(initially_online);

  let cache = CacheStore::new(storage.clone(), clock.clone()).with_policy(config.cache_policy());
  let queue = MutationQueue::new(storage, clock);
  let sync = Arc::new(SyncManager::new(queue, remote.clone(), config.sync_settings()));
  let client = OfflineClient::new(remote, cache, sync.clone(), Arc::new(connectivity.clone()))
    .with_retry(config.retry_policy());

  match args.command {
    Command::Status { json } => {
      let status = sync.get_sync_status().await;
      if json {
        let value = serde_json::json!({
          "online": client.is_online(),
          "status": status,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
      } else {
        let indicator = status.indicator(client.is_online());
        println!("online:   {}", client.is_online());
        println!("pending:  {}", status.pending_operations);
        if let Some(at) = status.last_attempt_at {
          println!("latest:   {}", format_ms(at));
        }
        if !indicator.to_string().is_empty() {
          println!("{}", indicator);
        }
      }
    }
    Command::Pending => {
      let items = sync.queue().list().await?;
      if items.is_empty() {
        println!("Nothing pending");
      }
      for item in items {
        println!(
          "{}  {:<6}  {}  attempts={}  queued={}",
          item.id,
          item.kind,
          item.target,
          item.attempts,
          format_ms(item.enqueued_at)
        );
      }
    }
    Command::Queue {
      kind,
      target,
      data,
    } => {
      let payload: Option<Value> = data
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| eyre!("Payload is not valid JSON: {}", e))?;
      let item = sync.queue_operation(kind, &target, payload.as_ref()).await?;
      println!("Queued {} {} as {}", item.kind, item.target, item.id);
    }
    Command::Sync => {
      let report = sync.sync_now().await;
      println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Command::Fetch { endpoint, ttl_secs } => {
      let result = client
        .fetch::<Value>(&endpoint, ttl_secs.map(Duration::from_secs))
        .await?;
      if result.source == CacheSource::Offline {
        let cached_at = result
          .cached_at
          .map(|at| at.to_rfc3339())
          .unwrap_or_default();
        eprintln!("Showing cached data from {}", cached_at);
      }
      println!("{}", serde_json::to_string_pretty(&result.data)?);
    }
    Command::Evict => {
      let removed = client.cache().evict_expired().await;
      println!("Removed {} cache entries", removed);
    }
    Command::Clear { cache, queue } => match (cache, queue) {
      (true, false) => {
        client.cache().clear_all().await;
        println!("Cleared cache");
      }
      (false, true) => {
        sync.clear_pending_operations().await?;
        println!("Cleared pending operations");
      }
      _ => {
        client.reset().await?;
        println!("Cleared cache and pending operations");
      }
    },
    Command::Watch => {
      let probe_task = probe.spawn(connectivity.clone());
      sync.follow_connectivity(&connectivity);
      info!(online = client.is_online(), "Watching for pending writes");

      tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;

      sync.unfollow_connectivity();
      sync.stop_auto_sync();
      probe_task.abort();
      let status = sync.get_sync_status().await;
      info!(pending = status.pending_operations, "Stopped");
    }
  }

  Ok(())
}

fn format_ms(ms: i64) -> String {
  chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms)
    .map(|at| at.to_rfc3339())
    .unwrap_or_else(|| ms.to_string())
}
