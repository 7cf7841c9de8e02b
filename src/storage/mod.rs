//! Persisted string key-value storage shared by the cache and the sync queue.
//!
//! Each component owns a fixed key prefix and must never touch keys outside
//! it, so unrelated data (session tokens, preferences) can live in the same
//! store.

mod memory;
mod sqlite;
mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::KeyValueStore;
