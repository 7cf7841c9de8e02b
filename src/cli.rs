use clap::{Parser, Subcommand};
use offsync::queue::MutationKind;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "offsync")]
#[command(about = "Offline cache and write-queue sync for the portal API")]
#[command(version)]
pub struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offsync/config.yaml)
  #[arg(short, long)]
  pub config: Option<PathBuf>,

  /// SQLite store to use instead of the configured one
  #[arg(long)]
  pub store: Option<PathBuf>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Show connectivity and pending sync work
  Status {
    /// Print the snapshot as JSON
    #[arg(long)]
    json: bool,
  },
  /// List queued writes in replay order
  Pending,
  /// Queue a write for the next sync pass
  Queue {
    /// create, update or delete
    kind: MutationKind,
    /// Endpoint the write targets, e.g. /notifications/42/read
    target: String,
    /// JSON body; ignored for delete
    #[arg(long)]
    data: Option<String>,
  },
  /// Replay queued writes now
  Sync,
  /// Read an endpoint, falling back to the cache when the API is unreachable
  Fetch {
    endpoint: String,
    /// Cache lifetime for a fresh response
    #[arg(long)]
    ttl_secs: Option<u64>,
  },
  /// Delete expired or outdated cache entries
  Evict,
  /// Drop cached responses and queued writes (both unless one is picked)
  Clear {
    #[arg(long)]
    cache: bool,
    #[arg(long)]
    queue: bool,
  },
  /// Keep syncing in the foreground, following connectivity, until Ctrl-C
  Watch,
}

impl Command {
  /// Whether the command reports or depends on API reachability.
  pub fn needs_network(&self) -> bool {
    matches!(
      self,
      Command::Status { .. } | Command::Fetch { .. } | Command::Watch
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_queue_command() {
    let args = Args::parse_from([
      "offsync",
      "queue",
      "update",
      "/notifications/1/read",
      "--data",
      r#"{"isRead":true}"#,
    ]);
    match args.command {
      Command::Queue {
        kind,
        target,
        data,
      } => {
        assert_eq!(kind, MutationKind::Update);
        assert_eq!(target, "/notifications/1/read");
        assert_eq!(data.as_deref(), Some(r#"{"isRead":true}"#));
      }
      other => panic!("unexpected command {:?}", other),
    }
  }

  #[test]
  fn test_unknown_kind_rejected() {
    assert!(Args::try_parse_from(["offsync", "queue", "patch", "/a"]).is_err());
  }

  #[test]
  fn test_clear_single_target() {
    let args = Args::parse_from(["offsync", "clear", "--queue"]);
    assert!(matches!(
      args.command,
      Command::Clear {
        cache: false,
        queue: true
      }
    ));
  }

  #[test]
  fn test_global_flags() {
    let args = Args::parse_from(["offsync", "-c", "/tmp/c.yaml", "status", "--json"]);
    assert_eq!(args.config, Some(PathBuf::from("/tmp/c.yaml")));
    assert!(matches!(args.command, Command::Status { json: true }));
  }

  #[test]
  fn test_local_commands_skip_reachability_check() {
    let needs = |argv: &[&str]| Args::parse_from(argv).command.needs_network();

    assert!(!needs(&["offsync", "pending"]));
    assert!(!needs(&["offsync", "queue", "create", "/a"]));
    assert!(!needs(&["offsync", "clear"]));
    assert!(!needs(&["offsync", "evict"]));
    assert!(needs(&["offsync", "status"]));
    assert!(needs(&["offsync", "fetch", "/children"]));
    assert!(needs(&["offsync", "watch"]));
  }
}
