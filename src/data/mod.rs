//! Data layer: pluggable, asynchronous N-dimensional array sources.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              SliceSource                │
//! └────────────────────┬────────────────────┘
//!                      │ request(slicing)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │       CacheSource (optional)            │
//! │  (memoized slices, singleflight)        │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           DataSource Trait              │
//! │  ArraySource, ConstantSource, ...       │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Sources publish dirty regions as N-d [`Slicing`]s on their
//! [`dirty_signal`](DataSource::dirty_signal). A slicing with open ranges
//! means "everything is dirty".

mod array;
mod array_source;
mod cache_source;
mod slicing;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::DataError;
use crate::signal::Signal;

pub use array::{DType, DataArray, Element};
pub use array_source::{ArraySource, ConstantSource};
pub use cache_source::CacheSource;
pub use slicing::{AxisRange, Slicing};

/// Axis names of the canonical 5-D layout.
pub const AXES: [&str; 5] = ["t", "x", "y", "z", "c"];

/// Identity of a data source's backing storage.
///
/// Two sources compare equal only if they read the same storage; decorators
/// report the identity of what they wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    /// Allocate a fresh identity.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SourceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// An asynchronous, array-like backing store.
///
/// This abstraction lets slice sources pull from in-memory arrays, remote
/// stores or computed pipelines without knowing which.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch the region selected by `slicing`.
    ///
    /// The slicing has one range per axis of [`shape`](Self::shape); open
    /// range ends select the whole axis. Returns
    /// [`DataError::Indeterminate`] when the source cannot answer yet; the
    /// source must later emit a dirty notification so the caller retries.
    async fn request(&self, slicing: &Slicing) -> Result<DataArray, DataError>;

    /// Element type of returned arrays.
    fn dtype(&self) -> DType;

    /// Full shape of the source.
    fn shape(&self) -> Vec<usize>;

    /// Number of channels, the length of the last axis.
    fn number_of_channels(&self) -> usize {
        self.shape().last().copied().unwrap_or(1)
    }

    /// Dirty regions of this source.
    fn dirty_signal(&self) -> &Signal<Slicing>;

    /// Identity of the backing storage.
    fn id(&self) -> SourceId;
}
