//! Generic LRU cache with size-based eviction.
//!
//! The cache tracks the total reported size of its values in bytes and
//! evicts least-recently-used entries when the budget is exceeded.
//!
//! The cache itself is not synchronized; owners wrap it in a lock.

use std::hash::Hash;
use std::sync::Arc;

use lru::LruCache;

/// Default cache capacity: 256MB
pub const DEFAULT_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

/// Per-type size accounting for cached values.
pub trait MemorySize {
    /// Approximate heap footprint of the value in bytes.
    fn memory_size(&self) -> usize;
}

impl<T: MemorySize + ?Sized> MemorySize for Arc<T> {
    fn memory_size(&self) -> usize {
        (**self).memory_size()
    }
}

impl MemorySize for image::RgbaImage {
    fn memory_size(&self) -> usize {
        self.as_raw().len()
    }
}

// =============================================================================
// KvCache
// =============================================================================

/// LRU cache with a byte budget.
///
/// # Example
///
/// ```
/// use tilestack::cache::{KvCache, MemorySize};
///
/// struct Blob(Vec<u8>);
///
/// impl MemorySize for Blob {
///     fn memory_size(&self) -> usize {
///         self.0.len()
///     }
/// }
///
/// let mut cache = KvCache::with_capacity(1000);
/// cache.set("a", Blob(vec![0; 600]));
/// cache.set("b", Blob(vec![0; 600]));
///
/// // "a" was evicted to stay within budget
/// assert!(cache.get(&"a").is_none());
/// assert!(cache.get(&"b").is_some());
/// ```
pub struct KvCache<K: Hash + Eq, V: MemorySize> {
    /// The underlying LRU cache
    entries: LruCache<K, V>,

    /// Maximum total size in bytes
    max_size: usize,

    /// Current total size in bytes
    current_size: usize,

    /// Number of entries evicted to honor the budget
    evictions: u64,
}

impl<K: Hash + Eq, V: MemorySize> KvCache<K, V> {
    /// Create a cache with the default capacity (256MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `max_size` bytes of values.
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            max_size,
            current_size: 0,
            evictions: 0,
        }
    }

    /// Get a value, marking it as recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Get a value without updating LRU order.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.peek(key)
    }

    /// Mutate a value in place and re-account its size.
    ///
    /// Returns `None` if the key is absent.
    pub fn update<R>(&mut self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let value = self.entries.get_mut(key)?;
        let before = value.memory_size();
        let result = f(value);
        let after = value.memory_size();
        self.current_size = self.current_size.saturating_sub(before) + after;
        self.evict_to_budget();
        Some(result)
    }

    /// Mark an entry as recently used. Returns whether it exists.
    pub fn touch(&mut self, key: &K) -> bool {
        self.entries.promote(key);
        self.entries.contains(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Store a value.
    ///
    /// If the cache is over capacity after insertion, least-recently-used
    /// entries are evicted until the cache is within capacity.
    pub fn set(&mut self, key: K, value: V) {
        let size = value.memory_size();

        if let Some(old) = self.entries.put(key, value) {
            self.current_size = self.current_size.saturating_sub(old.memory_size());
        }
        self.current_size += size;

        self.evict_to_budget();
    }

    /// Remove a value, returning it if present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.entries.pop(key)?;
        self.current_size = self.current_size.saturating_sub(value.memory_size());
        Some(value)
    }

    /// Keep only the entries for which `keep` returns true.
    ///
    /// Returns the number of entries removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) -> usize
    where
        K: Clone,
    {
        let doomed: Vec<K> = self
            .entries
            .iter()
            .filter(|(k, v)| !keep(k, v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.remove(key);
        }
        doomed.len()
    }

    /// Visit every entry mutably without changing LRU order.
    ///
    /// Sizes are re-accounted afterwards.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&K, &mut V)) {
        let mut total = 0;
        for (key, value) in self.entries.iter_mut() {
            f(key, value);
            total += value.memory_size();
        }
        self.current_size = total;
        self.evict_to_budget();
    }

    /// Keys matching `predicate`, most recently used first.
    pub fn keys_where(&self, mut predicate: impl FnMut(&K) -> bool) -> Vec<K>
    where
        K: Clone,
    {
        self.entries
            .iter()
            .filter(|(k, _)| predicate(k))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Drop every entry.
    pub fn clean(&mut self) {
        self.entries.clear();
        self.current_size = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current total size of cached values in bytes.
    pub fn size(&self) -> usize {
        self.current_size
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Number of entries evicted so far.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    fn evict_to_budget(&mut self) {
        while self.current_size > self.max_size {
            match self.entries.pop_lru() {
                Some((_, evicted)) => {
                    self.current_size = self.current_size.saturating_sub(evicted.memory_size());
                    self.evictions += 1;
                }
                // Cache is empty, nothing more to evict
                None => break,
            }
        }
    }
}

impl<K: Hash + Eq, V: MemorySize> Default for KvCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Blob(usize);

    impl MemorySize for Blob {
        fn memory_size(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn test_basic_get_set() {
        let mut cache = KvCache::with_capacity(10_000);

        assert!(cache.get(&"a").is_none());
        cache.set("a", Blob(100));
        assert_eq!(cache.get(&"a"), Some(&Blob(100)));
        assert_eq!(cache.size(), 100);
    }

    #[test]
    fn test_size_based_eviction() {
        let mut cache = KvCache::with_capacity(1000);

        cache.set("a", Blob(400));
        cache.set("b", Blob(400));
        assert_eq!(cache.len(), 2);

        cache.set("c", Blob(400));

        assert!(cache.size() <= 1000);
        assert!(!cache.contains(&"a"));
        assert!(cache.contains(&"b"));
        assert!(cache.contains(&"c"));
        assert_eq!(cache.evictions(), 1);
    }

    #[test]
    fn test_touch_protects_from_eviction() {
        let mut cache = KvCache::with_capacity(1500);

        cache.set("a", Blob(500));
        cache.set("b", Blob(500));
        cache.set("c", Blob(500));

        assert!(cache.touch(&"a"));
        assert!(!cache.touch(&"zzz"));

        cache.set("d", Blob(500));

        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
        assert!(cache.contains(&"d"));
    }

    #[test]
    fn test_update_existing_entry() {
        let mut cache = KvCache::with_capacity(10_000);

        cache.set("a", Blob(1000));
        cache.set("a", Blob(500));
        assert_eq!(cache.size(), 500);
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.update(&"a", |b| b.0 = 700), Some(()));
        assert_eq!(cache.size(), 700);
        assert_eq!(cache.update(&"missing", |b| b.0 = 1), None);
    }

    #[test]
    fn test_retain_and_remove() {
        let mut cache = KvCache::with_capacity(10_000);
        for (i, key) in ["a", "b", "c", "d"].into_iter().enumerate() {
            cache.set(key, Blob(i + 1));
        }

        let removed = cache.retain(|_, v| v.0 % 2 == 0);
        assert_eq!(removed, 2);
        assert_eq!(cache.size(), 6);

        assert_eq!(cache.remove(&"b"), Some(Blob(2)));
        assert_eq!(cache.size(), 4);
    }

    #[test]
    fn test_for_each_mut_reaccounts() {
        let mut cache = KvCache::with_capacity(10_000);
        cache.set(1, Blob(10));
        cache.set(2, Blob(20));

        cache.for_each_mut(|_, v| v.0 *= 2);
        assert_eq!(cache.size(), 60);
    }

    #[test]
    fn test_clean() {
        let mut cache = KvCache::with_capacity(10_000);
        cache.set("a", Blob(1000));
        cache.set("b", Blob(2000));

        cache.clean();

        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.capacity(), 10_000);
    }
}
