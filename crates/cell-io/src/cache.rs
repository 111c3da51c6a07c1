//! LRU cache for decoded cell contents.
//!
//! Bulk readers keep recently read cells here so consecutive locations in
//! the same cell cost one file read.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use serde::Serialize;

use crate::source::RawCell;

/// Default number of cells kept in memory.
pub const DEFAULT_CACHE_CELLS: usize = 4;

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Cells held by number, least recently used evicted first.
pub struct CellCache {
    cache: LruCache<u32, Arc<RawCell>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CellCache {
    /// Create a cache holding at most `capacity` cells (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub fn get(&mut self, cell: u32) -> Option<Arc<RawCell>> {
        if let Some(raw) = self.cache.get(&cell) {
            self.hits += 1;
            Some(Arc::clone(raw))
        } else {
            self.misses += 1;
            None
        }
    }

    pub fn contains(&self, cell: u32) -> bool {
        self.cache.contains(&cell)
    }

    /// Insert a cell, evicting the least recently used one when full.
    pub fn insert(&mut self, raw: RawCell) -> Arc<RawCell> {
        let cell = raw.cell;
        let raw = Arc::new(raw);
        if let Some((evicted, _)) = self.cache.push(cell, Arc::clone(&raw)) {
            if evicted != cell {
                self.evictions += 1;
            }
        }
        raw
    }

    /// Drop one cell. Returns whether it was cached.
    pub fn remove(&mut self, cell: u32) -> bool {
        self.cache.pop(&cell).is_some()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.cache.len(),
            evictions: self.evictions,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for CellCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CELLS)
    }
}

impl std::fmt::Debug for CellCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellCache")
            .field("capacity", &self.capacity())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::CellLayout;

    fn raw(cell: u32) -> RawCell {
        RawCell {
            cell,
            layout: CellLayout::OrthoMulti,
            location_ids: vec![1],
            time: vec![0.0],
            time_units: "days since 2000-01-01".to_string(),
            row_size: None,
            variables: Default::default(),
        }
    }

    #[test]
    fn test_cache_insert_and_get() {
        let mut cache = CellCache::new(2);
        assert!(cache.get(7).is_none());
        cache.insert(raw(7));
        assert_eq!(cache.get(7).unwrap().cell, 7);
    }

    #[test]
    fn test_cache_lru_eviction() {
        let mut cache = CellCache::new(2);
        cache.insert(raw(1));
        cache.insert(raw(2));
        cache.get(1);
        cache.insert(raw(3));

        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_reinsert_is_not_eviction() {
        let mut cache = CellCache::new(2);
        cache.insert(raw(1));
        cache.insert(raw(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_cache_stats() {
        let mut cache = CellCache::new(4);
        cache.insert(raw(1));
        cache.get(1);
        cache.get(2);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_survive_clear() {
        let mut cache = CellCache::new(2);
        cache.insert(raw(1));
        cache.get(1);
        cache.clear();
        cache.get(1);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 0));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = CellCache::new(0);
        cache.insert(raw(1));
        assert_eq!(cache.capacity(), 1);
        assert!(cache.contains(1));
    }
}
