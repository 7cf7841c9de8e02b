//! Durable queue of writes performed while disconnected.
//!
//! Items are replayed in enqueue order by [`crate::sync::SyncManager`], which
//! is the only component that drains the queue.

mod item;
mod store;

pub use item::{ItemPatch, MutationKind, MutationQueueItem};
pub use store::{MutationQueue, QUARANTINE_PREFIX, QUEUE_KEY};
