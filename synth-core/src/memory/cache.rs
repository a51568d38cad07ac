//! Bounded LRU query cache.
//!
//! `query_hash -> (results, created_at, hit_count)`, TTL 24h, capacity 100,
//! eviction combining expiry and LRU recency. Concurrent-safe: a single
//! `parking_lot::Mutex` around the `lru::LruCache`, matching the teacher's
//! lock-per-cache pattern in `retrieval::cache`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;

/// A cached retrieval result: the ranked lesson ids `get_relevant` produced
/// for a given query, plus bookkeeping for TTL and hit-rate metrics.
#[derive(Debug, Clone)]
pub struct CachedResult {
    pub lesson_ids: Vec<uuid::Uuid>,
    pub created_at: DateTime<Utc>,
    pub hit_count: u64,
}

/// Cumulative cache metrics, exposed for the monitoring snapshot.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheMetrics {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner {
    cache: LruCache<u64, CachedResult>,
    metrics: CacheMetrics,
}

/// Bounded, TTL-enforced LRU cache over retrieval queries.
pub struct QueryCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: chrono::Duration,
}

impl QueryCache {
    #[must_use]
    pub fn new(capacity: usize, ttl_hours: i64) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner { cache: LruCache::new(cap), metrics: CacheMetrics { capacity, ..Default::default() } }),
            capacity,
            ttl: chrono::Duration::hours(ttl_hours),
        }
    }

    /// Hash a normalized query string into the cache key.
    #[must_use]
    pub fn hash_query(query: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        query.trim().to_lowercase().hash(&mut hasher);
        hasher.finish()
    }

    /// Look up a prior result for `query`, honoring TTL. Expired entries are
    /// evicted on access rather than proactively swept.
    pub fn get(&self, query: &str) -> Option<Vec<uuid::Uuid>> {
        let key = Self::hash_query(query);
        let mut guard = self.inner.lock();
        let now = Utc::now();

        let expired = guard
            .cache
            .peek(&key)
            .is_some_and(|entry| now.signed_duration_since(entry.created_at) > self.ttl);

        if expired {
            guard.cache.pop(&key);
            guard.metrics.expirations += 1;
            guard.metrics.misses += 1;
            guard.metrics.size = guard.cache.len();
            return None;
        }

        if let Some(entry) = guard.cache.get_mut(&key) {
            entry.hit_count += 1;
            guard.metrics.hits += 1;
            let ids = entry.lesson_ids.clone();
            return Some(ids);
        }

        guard.metrics.misses += 1;
        None
    }

    /// Insert or replace the cached result for `query`.
    pub fn put(&self, query: &str, lesson_ids: Vec<uuid::Uuid>) {
        let key = Self::hash_query(query);
        let mut guard = self.inner.lock();
        let was_full = guard.cache.len() >= self.capacity && !guard.cache.contains(&key);
        guard
            .cache
            .put(key, CachedResult { lesson_ids, created_at: Utc::now(), hit_count: 0 });
        if was_full {
            guard.metrics.evictions += 1;
        }
        guard.metrics.size = guard.cache.len();
    }

    #[must_use]
    pub fn metrics(&self) -> CacheMetrics {
        self.inner.lock().metrics.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalize an arbitrary query context (query text plus optional structured
/// fields) into the string the cache hashes on. Kept separate from `Value`
/// rendering so callers can fold in error/tool context (as
/// `Orchestrator::get_refine_context` does) without coupling the cache to
/// the data model.
#[must_use]
pub fn normalize_query(query: &str, extra: &[&str]) -> String {
    let mut parts = vec![query.trim().to_lowercase()];
    parts.extend(extra.iter().map(|s| s.trim().to_lowercase()));
    parts.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache = QueryCache::new(100, 24);
        let id = uuid::Uuid::new_v4();
        cache.put("how do I reverse a string", vec![id]);
        assert_eq!(cache.get("how do I reverse a string"), Some(vec![id]));
    }

    #[test]
    fn never_exceeds_capacity() {
        let cache = QueryCache::new(3, 24);
        for i in 0..10 {
            cache.put(&format!("query {i}"), vec![]);
        }
        assert!(cache.len() <= 3);
    }

    #[test]
    fn expired_entries_are_evicted_on_access() {
        let cache = QueryCache::new(10, 0); // TTL 0h: everything is immediately stale
        cache.put("q", vec![uuid::Uuid::new_v4()]);
        assert_eq!(cache.get("q"), None);
        assert_eq!(cache.metrics().expirations, 1);
    }

    #[test]
    fn hash_is_case_and_whitespace_insensitive() {
        assert_eq!(QueryCache::hash_query(" Foo "), QueryCache::hash_query("foo"));
    }
}
