//! Background synchronization of queued mutations.
//!
//! The [`SyncManager`] drains the mutation queue:
//! - on a fixed timer while the device is online
//! - on demand via [`SyncManager::sync_now`]
//! - as soon as connectivity is regained
//!
//! Each item gets a bounded number of attempts; the only user-visible
//! output is the [`SyncStatus`] snapshot.

mod connectivity;
mod manager;
mod status;

pub use connectivity::{Connectivity, ConnectivityObserver, NetworkProbe};
pub use manager::{SyncManager, SyncReport, SyncSettings};
pub use status::{Indicator, SyncStatus};
