//! Persisted cache of remote read results with expiry and schema versioning.
//!
//! This module provides the "last known good" side of offline support:
//! - Entries carry a write timestamp, an absolute expiry and a schema version
//! - Validity is re-checked on every read; invalid entries are deleted lazily
//! - Keys are namespaced under a fixed prefix in the shared key-value store
//! - Misses are ordinary results ([`Lookup::Miss`]), never errors

mod entry;
mod keys;
mod result;
mod store;

pub use entry::{CacheEntry, CachePolicy, Validity, CURRENT_SCHEMA_VERSION, DEFAULT_TTL};
pub use keys::{EndpointKey, QueryKey};
pub use result::{CacheResult, CacheSource, Lookup, MissReason};
pub use store::{CacheStore, CACHE_PREFIX};
