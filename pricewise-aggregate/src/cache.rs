//! In-memory TTL cache for aggregation responses.
//!
//! Backed by a [`moka`] concurrent cache, which bounds capacity and evicts
//! expired entries in the background. Every entry also records its
//! creation instant and [`TtlCache::get`] checks it on read, so an entry
//! at or past its TTL is reported as a miss even if the backend has not
//! evicted it yet. Reads never remove entries; eviction is left to the
//! backend so a concurrent `put` cannot be undone by a stale read.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    created_at: Instant,
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Approximate number of stored entries, expired ones included until evicted.
    pub entries: u64,
    /// Maximum number of entries.
    pub capacity: u64,
    /// Entry lifetime.
    pub ttl: Duration,
}

/// Read-through response cache with a fixed, uniform TTL.
///
/// Concurrent operations on different keys do not block each other;
/// concurrent `put`s on one key are last-write-wins. A zero TTL disables
/// the cache: every `get` misses and `put` is a no-op.
pub struct TtlCache<K, V> {
    inner: Option<Cache<K, Arc<Entry<V>>>>,
    ttl: Duration,
    capacity: u64,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache holding at most `capacity` entries for `ttl` each.
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        let inner = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build()
        });
        Self {
            inner,
            ttl,
            capacity,
        }
    }

    /// Whether caching is enabled.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Look up a live entry.
    ///
    /// Returns `None` for absent entries and for entries whose age has
    /// reached the TTL.
    pub async fn get(&self, key: &K) -> Option<V> {
        let cache = self.inner.as_ref()?;
        let entry = cache.get(key).await?;
        (entry.created_at.elapsed() < self.ttl).then(|| entry.value.clone())
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub async fn put(&self, key: K, value: V) {
        if let Some(cache) = &self.inner {
            let entry = Entry {
                value,
                created_at: Instant::now(),
            };
            cache.insert(key, Arc::new(entry)).await;
        }
    }

    /// Remove the entry for `key`, if any.
    pub async fn invalidate(&self, key: &K) {
        if let Some(cache) = &self.inner {
            cache.invalidate(key).await;
        }
    }

    /// Remove every entry.
    pub async fn clear(&self) {
        if let Some(cache) = &self.inner {
            cache.invalidate_all();
            cache.run_pending_tasks().await;
        }
    }

    /// Current occupancy and limits.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.inner.as_ref().map_or(0, |c| c.entry_count()),
            capacity: self.capacity,
            ttl: self.ttl,
        }
    }
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("enabled", &self.inner.is_some())
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .finish()
    }
}
