//! In-process TTL cache.
//!
//! Each [`TtlCache`] is an independent namespace with its own default TTL and
//! its own hit/miss/eviction bookkeeping. The backend keeps two of them: one
//! for resolved principals and one for named query results.
//!
//! ## Expiry
//!
//! Expiry is lazy: an entry is valid while `now - inserted_at < ttl`. A `get`
//! that finds an expired entry reports a miss and removes the entry. There is
//! no background sweep.
//!
//! ## Keys
//!
//! Keys are opaque strings. Callers build them with [`cache_key`] so that a
//! substring passed to [`TtlCache::invalidate_matching`] can target a logical
//! group (for example every `users:role:` entry).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

/// Joins a namespace prefix and an identifier into a cache key.
///
/// ```
/// use permitdesk_core::cache_key;
///
/// assert_eq!(cache_key("users:role", "admin"), "users:role:admin");
/// ```
pub fn cache_key(namespace: &str, id: &str) -> String {
    format!("{namespace}:{id}")
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of entries currently stored (expired-but-unread included).
    pub size: usize,
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries removed because they expired.
    pub evictions: u64,
    /// Default TTL of this namespace in seconds.
    pub ttl_secs: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct CacheEntry<V> {
    value: Arc<V>,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

/// Thread-safe key/value cache with per-entry expiry.
///
/// Values are stored behind `Arc` so hits are a reference-count bump. The map
/// is sharded (`DashMap`); a shard lock is held only for the map operation
/// itself.
pub struct TtlCache<V> {
    name: &'static str,
    entries: DashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V> TtlCache<V> {
    /// Creates an empty cache namespace.
    ///
    /// `name` only shows up in logs.
    pub fn new(name: &'static str, default_ttl: Duration) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Looks up `key`.
    ///
    /// Returns `None` when the key is absent or its entry has expired. An
    /// expired entry is removed before returning.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(Arc::clone(&entry.value));
            }
            drop(entry);
            // A concurrent put may have replaced the stale entry meanwhile.
            if self
                .entries
                .remove_if(key, |_, entry| entry.is_expired(now))
                .is_some()
            {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(cache = self.name, key, "Expired cache entry evicted");
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores `value` under `key` with the namespace default TTL.
    ///
    /// Returns the shared value so callers can hand it out without cloning.
    pub fn put(&self, key: impl Into<String>, value: V) -> Arc<V> {
        self.put_with_ttl(key, value, self.default_ttl)
    }

    /// Stores `value` under `key` with an explicit TTL.
    pub fn put_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) -> Arc<V> {
        let value = Arc::new(value);
        let entry = CacheEntry {
            value: Arc::clone(&value),
            inserted_at: Instant::now(),
            ttl,
        };
        self.entries.insert(key.into(), entry);
        value
    }

    /// Removes a single key. Returns `true` if an entry was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            tracing::debug!(cache = self.name, key, "Cache entry invalidated");
        }
        removed
    }

    /// Removes every key containing `pattern`. Returns the number removed.
    pub fn invalidate_matching(&self, pattern: &str) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            if key.contains(pattern) {
                removed += 1;
                false
            } else {
                true
            }
        });
        tracing::debug!(cache = self.name, pattern, removed, "Cache entries invalidated by pattern");
        removed
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
        tracing::info!(cache = self.name, "Cache cleared");
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            ttl_secs: self.default_ttl.as_secs(),
        }
    }
}
