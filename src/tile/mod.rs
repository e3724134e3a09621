//! Tile layer: the cache of layer and composite tiles and the provider
//! that keeps it filled.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 View                    │
//! └────────────────────┬────────────────────┘
//!                      │ get_tiles(rect)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             TileProvider                │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TilesCache  │  │   FetchQueue    │  │
//! │  │  (layer +    │  │  (priority,     │  │
//! │  │  composite)  │  │   newest first) │  │
//! │  └──────────────┘  └────────┬────────┘  │
//! └─────────────────────────────┼───────────┘
//!                               │ workers
//!                               ▼
//! ┌─────────────────────────────────────────┐
//! │          StackedImageSources            │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileProvider`]: schedules fetches, composites tiles, reacts to
//!   invalidation events
//! - [`TilesCache`]: one LRU for every layer and composite tile, keyed by
//!   [`TileKey`] and bounded by memory
//! - [`Tile`]: what a view receives: the latest composite and its progress
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tilestack::config::TileProviderConfig;
//! use tilestack::geometry::unbounded_rect;
//! use tilestack::layer::LayerStack;
//! use tilestack::stack::StackedImageSources;
//! use tilestack::tile::TileProvider;
//! use tilestack::tiling::Tiling;
//!
//! let stack = Arc::new(LayerStack::new());
//! let sources = Arc::new(StackedImageSources::new(stack));
//! let tiling = Tiling::identity((900, 400), 100).unwrap();
//! let provider = TileProvider::new(tiling, sources, TileProviderConfig::default()).unwrap();
//!
//! provider.wait_for_tiles(unbounded_rect());
//! for tile in provider.get_tiles(unbounded_rect()) {
//!     println!("tile {} is {:.0}% done", tile.id, tile.progress * 100.0);
//! }
//! ```

mod cache;
mod compose;
mod provider;
mod queue;

pub use cache::{CacheStats, TileKey, TilesCache};
pub use provider::{Tile, TileProvider};
