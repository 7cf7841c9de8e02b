//! Offline-first data layer: a persistent response cache, a durable queue of
//! pending writes, and a sync manager that replays those writes once the
//! network is back.

pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod queue;
pub mod remote;
pub mod storage;
pub mod sync;

pub use client::{MutationOutcome, OfflineClient, RetryPolicy};
