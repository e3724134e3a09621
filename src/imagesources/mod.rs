//! Image sources: per-layer adapters from 2-D data to RGBA bitmaps.
//!
//! Each layer kind gets its own source type. All of them pull planes from
//! one or more [`SliceSource`]s, map values to colors, and forward the
//! slices' dirty regions on their own [`dirty_signal`](ImageSource::dirty_signal).
//!
//! | Source | Inputs | Opaque |
//! |--------|--------|--------|
//! | [`GrayscaleImageSource`] | 1 | always |
//! | [`ColortableImageSource`] | 1 | all colors opaque, zero not transparent |
//! | [`AlphaModulatedImageSource`] | 1 | never |
//! | [`RgbaImageSource`] | 0 to 4 | alpha is the constant 255 |
//! | [`LabelEdgesImageSource`] | 1 | never |

mod alpha_modulated;
mod colortable;
mod grayscale;
mod label_edges;
mod rgba;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::RgbaImage;

use crate::error::DataError;
use crate::geometry::{IntRect, Rect};
use crate::signal::{Signal, Subscription};
use crate::slicing::SliceSource;

pub use alpha_modulated::AlphaModulatedImageSource;
pub use colortable::ColortableImageSource;
pub use grayscale::GrayscaleImageSource;
pub use label_edges::LabelEdgesImageSource;
pub use rgba::{RgbaChannel, RgbaImageSource};

/// Identity of an image source, used as part of the tile cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageSourceId(u64);

impl ImageSourceId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ImageSourceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ImageSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "imagesource-{}", self.0)
    }
}

type ImageFuture = Pin<Box<dyn Future<Output = Result<RgbaImage, DataError>> + Send>>;

/// A pending bitmap. Nothing is fetched until it is awaited.
pub struct ImageRequest {
    future: ImageFuture,
}

impl ImageRequest {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<RgbaImage, DataError>> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
        }
    }

    /// A request that has already completed.
    pub fn ready(result: Result<RgbaImage, DataError>) -> Self {
        Self::new(std::future::ready(result))
    }

    pub async fn wait(self) -> Result<RgbaImage, DataError> {
        self.future.await
    }
}

impl fmt::Debug for ImageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRequest").finish_non_exhaustive()
    }
}

/// Turns a window of 2-D data into a drawable bitmap.
pub trait ImageSource: Send + Sync {
    fn id(&self) -> ImageSourceId;

    /// Start rendering the data window `rect`.
    ///
    /// `along_through` pins the through values for this request instead of
    /// using the slice sources' current ones.
    fn request(&self, rect: IntRect, along_through: Option<&[usize]>) -> ImageRequest;

    /// Announce that `rect` (data coordinates) must be re-rendered.
    fn set_dirty(&self, rect: Rect);

    fn dirty_signal(&self) -> &Signal<Rect>;

    /// Every pixel this source renders has alpha 255.
    fn is_opaque(&self) -> bool;

    /// Higher priorities are fetched first.
    fn priority(&self) -> i32;

    /// Cheap enough to render on the caller's thread.
    fn direct(&self) -> bool;
}

/// Bookkeeping shared by every image source.
pub(crate) struct SourceCore {
    id: ImageSourceId,
    priority: i32,
    direct: bool,
    dirty: Arc<Signal<Rect>>,
    _forwarding: Vec<Subscription>,
}

impl SourceCore {
    /// Forward dirty regions of every slice to this source's own signal.
    pub(crate) fn new(slices: &[Arc<SliceSource>]) -> Self {
        let dirty: Arc<Signal<Rect>> = Arc::new(Signal::new());
        let forwarding = slices
            .iter()
            .map(|slice| {
                let dirty = dirty.clone();
                slice
                    .dirty_signal()
                    .subscribe(move |rect: &Rect| dirty.emit(rect))
            })
            .collect();

        Self {
            id: ImageSourceId::next(),
            priority: 0,
            direct: false,
            dirty,
            _forwarding: forwarding,
        }
    }
}

/// Implements the bookkeeping half of [`ImageSource`] through `self.core`.
macro_rules! delegate_core {
    () => {
        fn id(&self) -> $crate::imagesources::ImageSourceId {
            self.core.id
        }

        fn set_dirty(&self, rect: $crate::geometry::Rect) {
            self.core.dirty.emit(&rect);
        }

        fn dirty_signal(&self) -> &$crate::signal::Signal<$crate::geometry::Rect> {
            &self.core.dirty
        }

        fn priority(&self) -> i32 {
            self.core.priority
        }

        fn direct(&self) -> bool {
            self.core.direct
        }
    };
}

/// Builder methods for `priority` and `direct`.
macro_rules! core_builders {
    () => {
        /// Fetch priority; higher runs first.
        pub fn with_priority(mut self, priority: i32) -> Self {
            self.core.priority = priority;
            self
        }

        /// Render on the caller's thread instead of a worker.
        pub fn with_direct(mut self, direct: bool) -> Self {
            self.core.direct = direct;
            self
        }
    };
}

pub(crate) use core_builders;
pub(crate) use delegate_core;

/// Linear rescale of `[lo, hi]` onto `[0, 255]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
    pub lo: f64,
    pub hi: f64,
}

impl Normalize {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// Position of `value` within the range, clamped to `[0, 1]`.
    pub fn fraction(&self, value: f64) -> f64 {
        let span = self.hi - self.lo;
        if span == 0.0 || !span.is_finite() {
            return if value >= self.hi { 1.0 } else { 0.0 };
        }
        ((value - self.lo) / span).clamp(0.0, 1.0)
    }

    pub fn apply(&self, value: f64) -> u8 {
        (self.fraction(value) * 255.0).round() as u8
    }
}

/// Map a value to a display byte, rescaling when a range is given and
/// clipping otherwise.
pub(crate) fn to_byte(value: f64, normalize: Option<Normalize>) -> u8 {
    match normalize {
        Some(n) => n.apply(value),
        None if value.is_nan() => 0,
        None => value.clamp(0.0, 255.0).round() as u8,
    }
}

/// Width and height of an `[x, y]` plane as image dimensions.
pub(crate) fn plane_dims<T>(plane: &ndarray::Array2<T>) -> (u32, u32) {
    let (w, h) = plane.dim();
    (w as u32, h as u32)
}
