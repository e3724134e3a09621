//! Layer and composite tile storage.
//!
//! One memory-budgeted LRU holds both kinds of entry for every cache
//! generation (stack id). Revisiting an old slice finds its tiles still
//! cached until the budget forces them out.
//!
//! # Cache Key
//!
//! - Layer tiles: stack id, image source, tile index
//! - Composite tiles: stack id, tile index
//!
//! # Freshness
//!
//! Every layer entry records the logical time of the fetch that produced
//! its image (`timestamp`) and of the last dirtying (`dirtied_at`). A reply
//! is stored only if it is newer than the stored image, and the entry stays
//! dirty if it was dirtied after the reply's request was made. Composite
//! entries carry a revision that every dirtying bumps, so a composite that
//! raced with a dirtying is stored but not marked clean.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use image::RgbaImage;

use crate::cache::{KvCache, MemorySize};
use crate::imagesources::ImageSourceId;
use crate::slicing::StackId;
use crate::sync::lock;

/// Bookkeeping bytes charged per entry on top of its image.
const ENTRY_OVERHEAD: usize = 64;

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for layer and composite tiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TileKey {
    Layer {
        stack: StackId,
        source: ImageSourceId,
        tile: usize,
    },
    Composite {
        stack: StackId,
        tile: usize,
    },
}

impl TileKey {
    pub fn stack(&self) -> &StackId {
        match self {
            TileKey::Layer { stack, .. } | TileKey::Composite { stack, .. } => stack,
        }
    }
}

// =============================================================================
// Entries
// =============================================================================

#[derive(Debug, Clone)]
pub(crate) struct LayerTileEntry {
    image: Option<Arc<RgbaImage>>,
    dirty: bool,
    timestamp: u64,
    dirtied_at: u64,
    /// Timestamp of the outstanding fetch, if any
    pending: Option<u64>,
}

impl LayerTileEntry {
    fn missing() -> Self {
        Self {
            image: None,
            dirty: true,
            timestamp: 0,
            dirtied_at: 0,
            pending: None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CompositeTileEntry {
    image: Option<Arc<RgbaImage>>,
    dirty: bool,
    revision: u64,
}

#[derive(Debug, Clone)]
pub(crate) enum TileEntry {
    Layer(LayerTileEntry),
    Composite(CompositeTileEntry),
}

impl MemorySize for TileEntry {
    fn memory_size(&self) -> usize {
        let image = match self {
            TileEntry::Layer(e) => &e.image,
            TileEntry::Composite(e) => &e.image,
        };
        ENTRY_OVERHEAD + image.as_ref().map_or(0, |i| i.memory_size())
    }
}

/// Snapshot of cache usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Bytes currently held
    pub size: usize,
    /// Byte budget
    pub capacity: usize,
    pub entries: usize,
    /// Entries dropped to stay within budget
    pub evictions: u64,
}

// =============================================================================
// TilesCache
// =============================================================================

/// Thread-safe store of layer and composite tile images.
///
/// All access goes through short lock-guarded methods; no lock is held
/// while rendering or fetching.
pub struct TilesCache {
    entries: Mutex<KvCache<TileKey, TileEntry>>,
}

impl TilesCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(KvCache::with_capacity(capacity)),
        }
    }

    /// Reserve a fetch for a layer tile at time `ts`.
    ///
    /// Returns false if the entry is clean, or if a fetch requested after
    /// the latest dirtying is still outstanding.
    pub(crate) fn claim_fetch(
        &self,
        stack: &StackId,
        source: ImageSourceId,
        tile: usize,
        ts: u64,
    ) -> bool {
        let key = TileKey::Layer {
            stack: stack.clone(),
            source,
            tile,
        };
        let mut entries = lock(&self.entries);
        let claimed = entries.update(&key, |entry| match entry {
            TileEntry::Layer(e) => {
                if !e.dirty || e.pending.is_some_and(|p| p > e.dirtied_at) {
                    return false;
                }
                e.pending = Some(ts);
                true
            }
            TileEntry::Composite(_) => false,
        });
        match claimed {
            Some(claimed) => claimed,
            None => {
                let mut entry = LayerTileEntry::missing();
                entry.pending = Some(ts);
                entries.set(key, TileEntry::Layer(entry));
                true
            }
        }
    }

    /// Give up a claimed fetch that will never complete.
    pub(crate) fn release_fetch(&self, stack: &StackId, source: ImageSourceId, tile: usize, ts: u64) {
        let key = TileKey::Layer {
            stack: stack.clone(),
            source,
            tile,
        };
        lock(&self.entries).update(&key, |entry| {
            if let TileEntry::Layer(e) = entry {
                if e.pending == Some(ts) {
                    e.pending = None;
                }
            }
        });
    }

    /// Store a fetched layer image produced by the request made at `ts`.
    ///
    /// Returns whether the image was accepted. Accepted images dirty the
    /// tile's composite.
    pub(crate) fn update_layer(
        &self,
        stack: &StackId,
        source: ImageSourceId,
        tile: usize,
        ts: u64,
        image: Arc<RgbaImage>,
    ) -> bool {
        let key = TileKey::Layer {
            stack: stack.clone(),
            source,
            tile,
        };
        let mut entries = lock(&self.entries);
        let accepted = entries
            .update(&key, |entry| match entry {
                TileEntry::Layer(e) => {
                    if e.pending == Some(ts) {
                        e.pending = None;
                    }
                    if ts <= e.timestamp {
                        return false;
                    }
                    e.image = Some(image);
                    e.timestamp = ts;
                    e.dirty = e.dirtied_at > ts;
                    true
                }
                TileEntry::Composite(_) => false,
            })
            .unwrap_or(false);

        if accepted {
            let composite = TileKey::Composite {
                stack: stack.clone(),
                tile,
            };
            entries.update(&composite, |entry| {
                if let TileEntry::Composite(e) = entry {
                    e.dirty = true;
                    e.revision += 1;
                }
            });
        }
        accepted
    }

    /// Dirty the given tiles of one image source in every generation.
    pub(crate) fn mark_layer_dirty(&self, source: ImageSourceId, tiles: &[usize], ts: u64) {
        let tiles: HashSet<usize> = tiles.iter().copied().collect();
        lock(&self.entries).for_each_mut(|key, entry| {
            if let (TileKey::Layer { source: s, tile, .. }, TileEntry::Layer(e)) = (key, entry) {
                if *s == source && tiles.contains(tile) {
                    e.dirty = true;
                    e.dirtied_at = e.dirtied_at.max(ts);
                }
            }
        });
    }

    /// Dirty composites in every generation; `None` means every tile.
    pub(crate) fn mark_composites_dirty(&self, tiles: Option<&[usize]>) {
        let tiles: Option<HashSet<usize>> = tiles.map(|t| t.iter().copied().collect());
        lock(&self.entries).for_each_mut(|key, entry| {
            if let (TileKey::Composite { tile, .. }, TileEntry::Composite(e)) = (key, entry) {
                if tiles.as_ref().map_or(true, |t| t.contains(tile)) {
                    e.dirty = true;
                    e.revision += 1;
                }
            }
        });
    }

    /// If the composite needs rendering, return its revision and the cached
    /// images of `sources` (in the given order).
    pub(crate) fn composite_job(
        &self,
        stack: &StackId,
        tile: usize,
        sources: &[ImageSourceId],
    ) -> Option<(u64, Vec<Option<Arc<RgbaImage>>>)> {
        let key = TileKey::Composite {
            stack: stack.clone(),
            tile,
        };
        let mut entries = lock(&self.entries);
        let revision = match entries.get(&key) {
            Some(TileEntry::Composite(e)) if !e.dirty => return None,
            Some(TileEntry::Composite(e)) => e.revision,
            _ => {
                entries.set(
                    key,
                    TileEntry::Composite(CompositeTileEntry {
                        image: None,
                        dirty: true,
                        revision: 0,
                    }),
                );
                0
            }
        };

        let images = sources
            .iter()
            .map(|&source| {
                let key = TileKey::Layer {
                    stack: stack.clone(),
                    source,
                    tile,
                };
                match entries.get(&key) {
                    Some(TileEntry::Layer(e)) => e.image.clone(),
                    _ => None,
                }
            })
            .collect();
        Some((revision, images))
    }

    /// Store a rendered composite. It is clean only if nothing dirtied it
    /// since `revision` was handed out.
    pub(crate) fn store_composite(
        &self,
        stack: &StackId,
        tile: usize,
        revision: u64,
        image: Arc<RgbaImage>,
    ) {
        let key = TileKey::Composite {
            stack: stack.clone(),
            tile,
        };
        let mut entries = lock(&self.entries);
        let stored = entries.update(&key, |entry| {
            if let TileEntry::Composite(e) = entry {
                e.dirty = e.revision != revision;
                e.image = Some(image.clone());
            }
        });
        if stored.is_none() {
            entries.set(
                key,
                TileEntry::Composite(CompositeTileEntry {
                    image: Some(image),
                    dirty: true,
                    revision: 0,
                }),
            );
        }
    }

    pub fn composite(&self, stack: &StackId, tile: usize) -> Option<Arc<RgbaImage>> {
        let key = TileKey::Composite {
            stack: stack.clone(),
            tile,
        };
        match lock(&self.entries).get(&key) {
            Some(TileEntry::Composite(e)) => e.image.clone(),
            _ => None,
        }
    }

    pub fn layer_image(
        &self,
        stack: &StackId,
        source: ImageSourceId,
        tile: usize,
    ) -> Option<Arc<RgbaImage>> {
        let key = TileKey::Layer {
            stack: stack.clone(),
            source,
            tile,
        };
        match lock(&self.entries).peek(&key) {
            Some(TileEntry::Layer(e)) => e.image.clone(),
            _ => None,
        }
    }

    /// Missing entries count as dirty.
    pub fn is_layer_dirty(&self, stack: &StackId, source: ImageSourceId, tile: usize) -> bool {
        let key = TileKey::Layer {
            stack: stack.clone(),
            source,
            tile,
        };
        match lock(&self.entries).peek(&key) {
            Some(TileEntry::Layer(e)) => e.dirty,
            _ => true,
        }
    }

    /// Fraction of `active` layers whose tile is not holding up the view.
    ///
    /// Only `eligible` (visible, unoccluded) layers can be outstanding;
    /// hidden and occluded layers count as done.
    pub fn progress(
        &self,
        stack: &StackId,
        tile: usize,
        active: usize,
        eligible: &[ImageSourceId],
    ) -> f64 {
        if active == 0 {
            return 1.0;
        }
        let entries = lock(&self.entries);
        let outstanding = eligible
            .iter()
            .filter(|&&source| {
                let key = TileKey::Layer {
                    stack: stack.clone(),
                    source,
                    tile,
                };
                match entries.peek(&key) {
                    Some(TileEntry::Layer(e)) => e.dirty,
                    _ => true,
                }
            })
            .count();
        (active.saturating_sub(outstanding)) as f64 / active as f64
    }

    /// Mark every entry of a generation as recently used.
    pub fn touch_stack(&self, stack: &StackId) -> usize {
        let mut entries = lock(&self.entries);
        let keys = entries.keys_where(|key| key.stack() == stack);
        // Oldest first, so the generation keeps its internal order.
        for key in keys.iter().rev() {
            entries.touch(key);
        }
        keys.len()
    }

    pub fn clear(&self) {
        lock(&self.entries).clean();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = lock(&self.entries);
        CacheStats {
            size: entries.size(),
            capacity: entries.capacity(),
            entries: entries.len(),
            evictions: entries.evictions(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
