//! # tilestack
//!
//! An asynchronous, multi-layer tile compositing cache for browsing very
//! large N-dimensional image volumes.
//!
//! A view asks for the tiles covering its viewport and gets back whatever
//! composites are available right now, each with a progress fraction.
//! Missing or stale layer tiles are fetched by background workers; when
//! they land, the view is told which scene region changed and asks again.
//!
//! ## Features
//!
//! - **Pluggable data**: any async [`DataSource`] can back a layer
//! - **2-D slicing**: [`SliceSource`] cuts planes out of N-d volumes along
//!   configurable axes, with synchronized through values across layers
//! - **Layer kinds**: grayscale, colortable, alpha-modulated, RGBA and
//!   label-edge rendering
//! - **Occlusion**: layers below a fully opaque one are never fetched
//! - **Generational caching**: tiles of previously visited slices stay
//!   cached and are reused when the view returns
//! - **Stale-write protection**: late replies never overwrite newer data
//!
//! ## Architecture
//!
//! - [`data`] - Data sources, arrays and slicings
//! - [`slicing`] - 2-D projections of N-d data and synced through values
//! - [`imagesources`] - Rendering slices into RGBA tiles
//! - [`layer`] - Layers and the ordered layer stack
//! - [`stack`] - Binding layers to image sources, invalidation events
//! - [`tiling`] - Scene tile grids
//! - [`tile`] - Tile cache and the tile provider
//! - [`cache`] - Memory-bounded LRU used by the caches
//! - [`config`] - Provider settings and CLI arguments
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tilestack::data::{ArraySource, DType, DataArray};
//! use tilestack::geometry::unbounded_rect;
//! use tilestack::layer::{Layer, LayerKind, LayerStack};
//! use tilestack::slicing::{SliceProjection, SliceSource};
//! use tilestack::stack::StackedImageSources;
//! use tilestack::tile::TileProvider;
//! use tilestack::tiling::Tiling;
//! use tilestack::TileProviderConfig;
//!
//! let volume = DataArray::filled(DType::U8, &[1, 900, 400, 16, 1], 128.0);
//! let data = Arc::new(ArraySource::new(volume));
//! let slice = Arc::new(SliceSource::new(data, SliceProjection::xy()).unwrap());
//!
//! let stack = Arc::new(LayerStack::new());
//! let layer = Arc::new(Layer::new("raw", LayerKind::Grayscale { normalize: None }));
//! stack.push_top(layer.clone());
//!
//! let sources = Arc::new(StackedImageSources::new(stack));
//! sources
//!     .register(&layer, layer.create_image_source(&[slice]).unwrap())
//!     .unwrap();
//!
//! let tiling = Tiling::identity((900, 400), 256).unwrap();
//! let provider = TileProvider::new(tiling, sources, TileProviderConfig::default()).unwrap();
//! provider.wait_for_tiles(unbounded_rect());
//! let tiles = provider.get_tiles(unbounded_rect());
//! assert!(tiles.iter().all(|t| t.progress == 1.0));
//! ```

pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod geometry;
pub mod imagesources;
pub mod layer;
pub mod signal;
pub mod slicing;
pub mod stack;
pub mod tile;
pub mod tiling;

mod sync;

// Re-export commonly used types
pub use config::{Config, TileProviderConfig};
pub use data::{ArraySource, DType, DataArray, DataSource, Slicing};
pub use error::{
    ConfigError, DataError, GeometryError, ProjectionError, ProviderError, RegistrationError,
};
pub use imagesources::{ImageSource, ImageSourceId};
pub use layer::{Layer, LayerKind, LayerStack};
pub use slicing::{SliceProjection, SliceSource, StackId, SyncedSliceSources};
pub use stack::{StackEvent, StackedImageSources};
pub use tile::{Tile, TileProvider};
pub use tiling::Tiling;
