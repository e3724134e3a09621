//! The bridge between the layer stack and the tile provider.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              TileProvider               │
//! └────────────────────┬────────────────────┘
//!                      │ entries() / StackEvent
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          StackedImageSources            │
//! │  (layer -> image source, occlusion)     │
//! └──────────┬──────────────────┬───────────┘
//!            │                  │
//!            ▼                  ▼
//! ┌──────────────────┐ ┌──────────────────────┐
//! │    LayerStack    │ │  ImageSource family  │
//! └──────────────────┘ └──────────────────────┘
//! ```
//!
//! Occlusion is derived on every [`entries`](StackedImageSources::entries)
//! call from a single snapshot of the stack, so it is always consistent with
//! the visibility, opacity and order it was computed from.

mod sources;

pub use sources::{StackEntry, StackEvent, StackedImageSources};
