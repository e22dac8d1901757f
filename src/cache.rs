//! Per-view layout cache.

use std::num::NonZeroUsize;

use lru::LruCache;
use serde::Serialize;
use tracing::trace;

use crate::layout::LayoutResult;

/// Entries kept by a view's cache unless configured otherwise.
pub const DEFAULT_CACHE_CAPACITY: usize = 10;

/// Everything a layout depends on: graph content, algorithm and the full
/// resolved option set including any active view filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fingerprint: u64,
    pub algorithm: String,
    pub params: String,
}

impl CacheKey {
    pub fn new(fingerprint: u64, algorithm: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            fingerprint,
            algorithm: algorithm.into(),
            params: params.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

/// Bounded LRU of computed layouts. A miss is `None`, never an error.
#[derive(Debug)]
pub struct LayoutCache {
    entries: LruCache<CacheKey, LayoutResult>,
    hits: u64,
    misses: u64,
}

impl LayoutCache {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Looks up `key`, marking it most recently used on a hit.
    pub fn get(&mut self, key: &CacheKey) -> Option<&LayoutResult> {
        match self.entries.get(key) {
            Some(result) => {
                self.hits += 1;
                trace!(algorithm = %key.algorithm, "layout cache hit");
                Some(result)
            }
            None => {
                self.misses += 1;
                trace!(algorithm = %key.algorithm, "layout cache miss");
                None
            }
        }
    }

    /// Stores `result`, evicting the least recently used entry when full.
    pub fn put(&mut self, key: CacheKey, result: LayoutResult) {
        if let Some((evicted, _)) = self.entries.push(key, result)
            && !self.entries.contains(&evicted)
        {
            trace!(algorithm = %evicted.algorithm, "layout cache eviction");
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            len: self.entries.len(),
            capacity: self.capacity(),
        }
    }
}

impl Default for LayoutCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn result(tag: &str) -> LayoutResult {
        LayoutResult::new(tag, BTreeMap::new(), Vec::new(), Vec::new())
    }

    fn key(n: u64) -> CacheKey {
        CacheKey::new(n, "matrix", "cell_gap=80")
    }

    #[test]
    fn eleventh_insert_evicts_least_recent() {
        let mut cache = LayoutCache::default();
        for n in 0..10 {
            cache.put(key(n), result("r"));
        }
        assert_eq!(cache.len(), 10);
        cache.put(key(10), result("r"));
        assert_eq!(cache.len(), 10);
        assert!(cache.get(&key(0)).is_none());
        assert!(cache.get(&key(10)).is_some());
    }

    #[test]
    fn reads_refresh_recency() {
        let mut cache = LayoutCache::new(2);
        cache.put(key(1), result("one"));
        cache.put(key(2), result("two"));
        assert!(cache.get(&key(1)).is_some());
        cache.put(key(3), result("three"));
        assert!(cache.contains(&key(1)));
        assert!(!cache.contains(&key(2)));
    }

    #[test]
    fn keys_differ_by_every_component() {
        let mut cache = LayoutCache::default();
        cache.put(CacheKey::new(1, "force", "seed=42"), result("a"));
        assert!(cache.get(&CacheKey::new(2, "force", "seed=42")).is_none());
        assert!(cache.get(&CacheKey::new(1, "stress", "seed=42")).is_none());
        assert!(cache.get(&CacheKey::new(1, "force", "seed=7")).is_none());
        assert!(cache.get(&CacheKey::new(1, "force", "seed=42")).is_some());
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let mut cache = LayoutCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(key(1), result("r"));
        let _ = cache.get(&key(1));
        let _ = cache.get(&key(2));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.len), (1, 1, 1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
