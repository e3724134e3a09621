//! Bounded, memory-accounted caching.
//!
//! [`KvCache`] is a generic LRU keyed cache whose capacity is a byte budget
//! rather than an entry count. Each value type reports its own footprint
//! through [`MemorySize`]. The same cache backs per-tile image storage in
//! [`TilesCache`](crate::tile::TilesCache) and slice memoization in
//! [`CacheSource`](crate::data::CacheSource).

mod kv_cache;

pub use kv_cache::{KvCache, MemorySize, DEFAULT_CACHE_CAPACITY};
