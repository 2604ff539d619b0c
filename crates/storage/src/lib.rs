//! Tile storage for the waterfall scheduler.
//!
//! Provides:
//! - The cache capability ([`TileStore`]) with a header/payload split
//! - Deterministic cache keys and the [`TileCacheAdapter`] the workers use
//! - An in-memory LRU store bounded by memory

pub mod cache;
pub mod store;
pub mod tile_memory_cache;

pub use cache::{CacheKey, CachedDescriptor, TileCacheAdapter};
pub use store::TileStore;
pub use tile_memory_cache::{MemoryTileStore, MemoryTileStoreStats};
