//! Response cache storage.
//!
//! The pipeline only sees [`ResponseStore`]; [`BoundedCache`] is the
//! in-memory implementation used by the server.

mod bounded;
mod shard;

use std::sync::Arc;

use crate::error::StoreError;
use crate::model::{CacheEntry, CacheKey};

pub use bounded::{BoundedCache, BoundedCacheConfig, EvictionCause, EvictionListener};

/// A concurrent, bounded key-value store for cached responses.
///
/// Implementations provide their own synchronization; callers never hold a
/// lock across calls.
pub trait ResponseStore: Send + Sync {
    /// Look up a live entry. Expired entries are reported as absent.
    fn get(&self, key: &CacheKey) -> Result<Option<Arc<CacheEntry>>, StoreError>;

    /// Store an entry, replacing any previous one for the same key. Entries
    /// already expired are dropped without error. Once this returns `Ok`, a
    /// subsequent `get` for the key observes the entry.
    fn set(&self, entry: CacheEntry) -> Result<(), StoreError>;

    /// Round-trip a probe entry to verify the store is writable and readable.
    fn health_check(&self) -> Result<(), StoreError>;
}
