//! In-memory LRU store for rendered tiles.
//!
//! ## Memory-Based Eviction
//!
//! The store evicts by memory rather than entry count. When an insert would
//! exceed the configured limit, ~5% of capacity (by memory) is evicted in one
//! batch in LRU order.
//!
//! ## Header/Payload Split
//!
//! Each entry keeps its header separately from its payload, so a header
//! lookup neither copies nor touches the pixel data.

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::TileStore;

/// In-memory LRU tile store.
///
/// A single mutex guards the LRU list because every lookup reorders it;
/// statistics are atomics so they can be read without taking the lock.
pub struct MemoryTileStore {
    cache: Mutex<LruCache<Vec<u8>, StoredTile>>,
    max_bytes: u64,
    stats: MemoryTileStoreStats,
}

struct StoredTile {
    header: Bytes,
    payload: Bytes,
}

impl StoredTile {
    fn size(&self) -> u64 {
        (self.header.len() + self.payload.len()) as u64
    }
}

/// Statistics for the memory tile store.
#[derive(Debug, Default)]
pub struct MemoryTileStoreStats {
    /// Full fetches that found an entry
    pub hits: AtomicU64,
    /// Header-only lookups that found an entry
    pub header_hits: AtomicU64,
    /// Lookups of either kind that found nothing
    pub misses: AtomicU64,
    /// Total entries evicted
    pub evictions: AtomicU64,
    /// Current size in bytes (headers + payloads)
    pub size_bytes: AtomicU64,
    /// Current number of entries
    pub entry_count: AtomicU64,
    /// Number of batch eviction runs
    pub eviction_runs: AtomicU64,
}

impl MemoryTileStoreStats {
    /// Hit rate over full fetches and header lookups, as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) + self.header_hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    fn snapshot(&self) -> MemoryTileStoreStats {
        let load = |v: &AtomicU64| AtomicU64::new(v.load(Ordering::Relaxed));
        MemoryTileStoreStats {
            hits: load(&self.hits),
            header_hits: load(&self.header_hits),
            misses: load(&self.misses),
            evictions: load(&self.evictions),
            size_bytes: load(&self.size_bytes),
            entry_count: load(&self.entry_count),
            eviction_runs: load(&self.eviction_runs),
        }
    }

    fn reset(&self) {
        for v in [
            &self.hits,
            &self.header_hits,
            &self.misses,
            &self.evictions,
            &self.size_bytes,
            &self.entry_count,
            &self.eviction_runs,
        ] {
            v.store(0, Ordering::Relaxed);
        }
    }
}

impl MemoryTileStore {
    /// Create a store bounded to `max_size_mb` megabytes.
    pub fn new(max_size_mb: usize) -> Self {
        Self::with_max_bytes(max_size_mb as u64 * 1024 * 1024)
    }

    /// Create a store bounded to an exact byte budget.
    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self {
            cache: Mutex::new(LruCache::unbounded()),
            max_bytes,
            stats: MemoryTileStoreStats::default(),
        }
    }

    /// Get current statistics.
    pub fn stats(&self) -> MemoryTileStoreStats {
        self.stats.snapshot()
    }

    pub fn len(&self) -> usize {
        self.stats.entry_count.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn size_bytes(&self) -> u64 {
        self.stats.size_bytes.load(Ordering::Relaxed)
    }

    /// Current utilization ratio (0.0 - 1.0).
    pub fn utilization(&self) -> f64 {
        if self.max_bytes == 0 {
            0.0
        } else {
            self.size_bytes() as f64 / self.max_bytes as f64
        }
    }

    /// Clear all entries and reset statistics.
    pub fn clear(&self) {
        self.cache.lock().clear();
        self.stats.reset();
    }

    /// Evict a fraction (0.0 to 1.0) of entries in LRU order.
    /// Returns the number of entries evicted.
    pub fn evict_percentage(&self, percentage: f64) -> usize {
        let mut cache = self.cache.lock();
        let target = (cache.len() as f64 * percentage.clamp(0.0, 1.0)) as usize;
        let mut bytes_freed = 0u64;
        let mut evicted = 0usize;

        while evicted < target {
            let Some((_, tile)) = cache.pop_lru() else {
                break;
            };
            bytes_freed += tile.size();
            evicted += 1;
        }

        self.record_eviction(evicted, bytes_freed);
        evicted
    }

    /// Evict ~5% of capacity from an already-locked cache.
    fn evict_batch_locked(&self, cache: &mut LruCache<Vec<u8>, StoredTile>) {
        let target_free = (self.max_bytes / 20).max(1);
        let mut bytes_freed = 0u64;
        let mut evicted = 0usize;

        while bytes_freed < target_free {
            let Some((_, tile)) = cache.pop_lru() else {
                break;
            };
            bytes_freed += tile.size();
            evicted += 1;
        }

        self.record_eviction(evicted, bytes_freed);
        info!(
            entries_evicted = evicted,
            bytes_freed = bytes_freed,
            cache_size_bytes = self.size_bytes(),
            max_bytes = self.max_bytes,
            "Tile store batch eviction completed"
        );
    }

    fn record_eviction(&self, evicted: usize, bytes_freed: u64) {
        self.stats.size_bytes.fetch_sub(bytes_freed, Ordering::Relaxed);
        self.stats
            .entry_count
            .fetch_sub(evicted as u64, Ordering::Relaxed);
        self.stats
            .evictions
            .fetch_add(evicted as u64, Ordering::Relaxed);
        self.stats.eviction_runs.fetch_add(1, Ordering::Relaxed);
    }
}

impl TileStore for MemoryTileStore {
    fn header(&self, key: &[u8]) -> Option<Bytes> {
        // peek: a header probe should not promote the entry
        let cache = self.cache.lock();
        match cache.peek(key) {
            Some(tile) => {
                self.stats.header_hits.fetch_add(1, Ordering::Relaxed);
                Some(tile.header.clone())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn fetch(&self, key: &[u8]) -> Option<(Bytes, Bytes)> {
        let mut cache = self.cache.lock();
        match cache.get(key) {
            Some(tile) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some((tile.header.clone(), tile.payload.clone()))
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn store(&self, key: &[u8], header: Bytes, payload: Bytes) {
        let tile = StoredTile { header, payload };
        let size = tile.size();
        if size > self.max_bytes {
            return;
        }

        let mut cache = self.cache.lock();

        if let Some(existing) = cache.pop(key) {
            self.stats
                .size_bytes
                .fetch_sub(existing.size(), Ordering::Relaxed);
            self.stats.entry_count.fetch_sub(1, Ordering::Relaxed);
        }

        while self.size_bytes() + size > self.max_bytes && !cache.is_empty() {
            self.evict_batch_locked(&mut cache);
        }

        cache.put(key.to_vec(), tile);
        self.stats.size_bytes.fetch_add(size, Ordering::Relaxed);
        self.stats.entry_count.fetch_add(1, Ordering::Relaxed);
    }
}
