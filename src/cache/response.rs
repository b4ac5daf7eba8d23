//! Bounded FIFO response cache with per-entry TTL.
//!
//! [`ResponseCache`] stores successful responses keyed by request
//! identity (endpoint id plus canonical parameters, see [`cache_key`]).
//!
//! # Expiry
//!
//! Each entry carries the TTL of the endpoint that produced it. An entry
//! older than its TTL is never returned by [`ResponseCache::get_fresh`].
//! It is not dropped either: it stays readable through
//! [`ResponseCache::get_any`] so the gateway can serve it, marked stale,
//! when a refresh fails. Expired entries leave the cache through FIFO
//! eviction, overwrite, or [`ResponseCache::clear`].
//!
//! # Eviction
//!
//! Capacity is a hard bound. Inserting a new key into a full cache evicts
//! exactly one entry: the one inserted earliest among those present.
//! Reads do not reorder entries (FIFO, not LRU). Overwriting a key counts
//! as a fresh insertion and moves it to the back.
//!
//! Timestamps come from [`tokio::time::Instant`] so paused-clock tests can
//! age entries with `tokio::time::advance`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;
use tokio::time::Instant;

use crate::types::Params;

/// Default maximum number of cached responses.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Configuration for the response cache.
///
/// ```rust
/// # use astrolabe::CacheConfig;
/// let config = CacheConfig::new().max_entries(500);
/// assert_eq!(config.max_entries, 500);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 100.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }
}

/// One cached response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub data: Arc<Value>,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    /// Whether the entry may be served as fresh at `now`.
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) <= self.ttl
    }

    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    /// Keys in insertion order, oldest first.
    pub keys: Vec<String>,
}

/// In-memory response cache. See module docs for expiry and eviction rules.
pub struct ResponseCache {
    entries: Mutex<IndexMap<String, CacheEntry>>,
    capacity: usize,
}

impl ResponseCache {
    /// Create a new response cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(IndexMap::with_capacity(config.max_entries)),
            capacity: config.max_entries,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up an entry that is still within its TTL.
    pub fn get_fresh(&self, key: &str) -> Option<Arc<Value>> {
        self.get_fresh_at(key, Instant::now())
    }

    pub fn get_fresh_at(&self, key: &str, now: Instant) -> Option<Arc<Value>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|entry| entry.is_fresh_at(now))
            .map(|entry| Arc::clone(&entry.data))
    }

    /// Look up an entry regardless of age.
    ///
    /// Only the stale-fallback path should use this.
    pub fn get_any(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    /// Insert (or overwrite) an entry created now.
    pub fn insert(&self, key: String, data: Arc<Value>, ttl: Duration) {
        self.insert_at(key, data, ttl, Instant::now());
    }

    pub fn insert_at(&self, key: String, data: Arc<Value>, ttl: Duration, now: Instant) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.shift_remove(&key);
        if entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }
        let entry = CacheEntry {
            key: key.clone(),
            data,
            created_at: now,
            ttl,
        };
        entries.insert(key, entry);
    }

    /// Whether `key` is present (fresh or not).
    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(key)
    }

    /// Evict all entries.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    /// Number of entries currently in the cache.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        CacheStats {
            size: entries.len(),
            capacity: self.capacity,
            keys: entries.keys().cloned().collect(),
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

/// Compute the cache key for a request.
///
/// `endpoint_id:` followed by the canonical parameter serialisation
/// (names sorted, values stringified), so equal requests map to equal
/// keys regardless of parameter order.
pub fn cache_key(endpoint_id: &str, params: &Params) -> String {
    format!("{endpoint_id}:{}", params.canonical())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_deterministic() {
        let p1 = Params::new().with("api_key", "DEMO_KEY").with("date", "2024-01-01");
        let p2 = Params::new().with("date", "2024-01-01").with("api_key", "DEMO_KEY");
        assert_eq!(cache_key("apod", &p1), cache_key("apod", &p2));
    }

    #[test]
    fn cache_key_differs_on_endpoint() {
        let p = Params::new().with("date", "2024-01-01");
        assert_ne!(cache_key("apod", &p), cache_key("epic", &p));
    }

    #[test]
    fn cache_key_differs_on_params() {
        let p1 = Params::new().with("date", "2024-01-01");
        let p2 = Params::new().with("date", "2024-01-02");
        assert_ne!(cache_key("apod", &p1), cache_key("apod", &p2));
    }

    #[test]
    fn cache_key_stringifies_values() {
        let p1 = Params::new().with("page", 2i64);
        let p2 = Params::new().with("page", "2");
        assert_eq!(cache_key("nasa-images", &p1), cache_key("nasa-images", &p2));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let cache = ResponseCache::new(&CacheConfig::new().max_entries(0));
        cache.insert("k".into(), Arc::new(Value::Null), Duration::from_secs(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn fresh_boundary_is_inclusive() {
        let now = Instant::now();
        let entry = CacheEntry {
            key: "k".into(),
            data: Arc::new(Value::Null),
            created_at: now,
            ttl: Duration::from_millis(1000),
        };
        assert!(entry.is_fresh_at(now + Duration::from_millis(1000)));
        assert!(!entry.is_fresh_at(now + Duration::from_millis(1001)));
    }
}
