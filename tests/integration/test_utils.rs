//! Test utilities for integration tests.
//!
//! Provides instrumented data sources and a small scene builder that wires
//! volumes, layers and a tile provider together.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use ndarray::{ArrayD, IxDyn};

use tilestack::data::{ArraySource, DType, DataArray, DataSource, Slicing, SourceId};
use tilestack::geometry::{Point, Rect};
use tilestack::layer::{Layer, LayerKind, LayerStack};
use tilestack::signal::Signal;
use tilestack::slicing::{SliceProjection, SliceSource, SyncedSliceSources};
use tilestack::stack::StackedImageSources;
use tilestack::tile::TileProvider;
use tilestack::tiling::Tiling;
use tilestack::{DataError, TileProviderConfig};

/// Index of z among the along axes of an x/y projection.
pub const Z: usize = 1;

// =============================================================================
// Volumes
// =============================================================================

/// A `[1, w, h, d, 1]` uint8 volume with voxel values `f(x, y, z)`.
pub fn volume(w: usize, h: usize, d: usize, f: impl Fn(usize, usize, usize) -> u8) -> DataArray {
    DataArray::from(ArrayD::from_shape_fn(IxDyn(&[1, w, h, d, 1]), |ix| {
        f(ix[1], ix[2], ix[3])
    }))
}

/// A volume with every voxel set to `value`.
pub fn constant(w: usize, h: usize, d: usize, value: u8) -> Arc<ArraySource> {
    Arc::new(ArraySource::new(volume(w, h, d, |_, _, _| value)))
}

/// A slicing over `x0..x1, y0..y1` of every z.
pub fn region(x0: usize, x1: usize, y0: usize, y1: usize) -> Slicing {
    use tilestack::data::AxisRange;
    Slicing::new(vec![
        AxisRange::all(),
        AxisRange::new(x0, x1),
        AxisRange::new(y0, y1),
        AxisRange::all(),
        AxisRange::all(),
    ])
}

// =============================================================================
// Counting Source
// =============================================================================

/// An [`ArraySource`] wrapper counting requests.
pub struct CountingSource {
    inner: ArraySource,
    requests: AtomicUsize,
}

impl CountingSource {
    pub fn new(data: DataArray) -> Self {
        Self {
            inner: ArraySource::new(data),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &ArraySource {
        &self.inner
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for CountingSource {
    async fn request(&self, slicing: &Slicing) -> Result<DataArray, DataError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.inner.request(slicing).await
    }

    fn dtype(&self) -> DType {
        self.inner.dtype()
    }

    fn shape(&self) -> Vec<usize> {
        self.inner.shape()
    }

    fn dirty_signal(&self) -> &Signal<Slicing> {
        self.inner.dirty_signal()
    }

    fn id(&self) -> SourceId {
        self.inner.id()
    }
}

// =============================================================================
// Scripted Source
// =============================================================================

/// A source that reads its data when a request starts but answers after a
/// scripted delay, so replies can arrive out of order.
pub struct ScriptedSource {
    id: SourceId,
    data: RwLock<DataArray>,
    delays: Mutex<VecDeque<Duration>>,
    dirty: Signal<Slicing>,
}

impl ScriptedSource {
    pub fn new(data: DataArray) -> Self {
        Self {
            id: SourceId::next(),
            data: RwLock::new(data),
            delays: Mutex::new(VecDeque::new()),
            dirty: Signal::new(),
        }
    }

    /// Delay the next request by `delay`. Unscripted requests answer at once.
    pub fn push_delay(&self, delay: Duration) {
        self.delays.lock().unwrap().push_back(delay);
    }

    pub fn fill(&self, slicing: &Slicing, value: f64) {
        self.data.write().unwrap().fill(slicing, value).unwrap();
        self.dirty.emit(slicing);
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    async fn request(&self, slicing: &Slicing) -> Result<DataArray, DataError> {
        let result = self.data.read().unwrap().slice(slicing);
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    fn dtype(&self) -> DType {
        self.data.read().unwrap().dtype()
    }

    fn shape(&self) -> Vec<usize> {
        self.data.read().unwrap().shape().to_vec()
    }

    fn dirty_signal(&self) -> &Signal<Slicing> {
        &self.dirty
    }

    fn id(&self) -> SourceId {
        self.id
    }
}

// =============================================================================
// Scene
// =============================================================================

/// Layers over a set of synchronized slice sources.
pub struct Scene {
    pub stack: Arc<LayerStack>,
    pub sources: Arc<StackedImageSources>,
    pub synced: SyncedSliceSources,
}

impl Scene {
    pub fn new() -> Self {
        let stack = Arc::new(LayerStack::new());
        let sources = Arc::new(StackedImageSources::new(stack.clone()));
        let synced = SyncedSliceSources::new(vec![0, 0, 0]);
        sources.follow(&synced);
        Self {
            stack,
            sources,
            synced,
        }
    }

    /// Add a layer below the existing ones.
    pub fn add(&self, layer: Layer, data: Arc<dyn DataSource>) -> Arc<Layer> {
        let slice = Arc::new(SliceSource::new(data, SliceProjection::xy()).unwrap());
        self.synced.add(slice.clone()).unwrap();

        let layer = Arc::new(layer);
        self.stack.push_bottom(layer.clone());
        let source = layer.create_image_source(&[slice]).unwrap();
        self.sources.register(&layer, source).unwrap();
        layer
    }

    /// Add a grayscale layer below the existing ones.
    pub fn add_gray(&self, data: Arc<dyn DataSource>, opacity: f64, visible: bool) -> Arc<Layer> {
        let layer = Layer::new("gray", LayerKind::Grayscale { normalize: None })
            .with_opacity(opacity)
            .with_visible(visible);
        self.add(layer, data)
    }

    pub fn provider(&self, shape: (usize, usize), block_size: usize, workers: usize) -> TileProvider {
        let tiling = Tiling::identity(shape, block_size).unwrap();
        let config = TileProviderConfig {
            workers,
            ..TileProviderConfig::default()
        };
        TileProvider::new(tiling, self.sources.clone(), config).unwrap()
    }
}

/// The composite pixel at scene point `(x, y)`, if rendered.
pub fn pixel(provider: &TileProvider, x: f64, y: f64) -> Option<[u8; 4]> {
    let tiling = provider.tiling();
    let id = tiling.tile_at(Point::new(x, y))?;
    let tile = provider
        .get_tiles(Rect::new(x, y, x + 1.0, y + 1.0))
        .into_iter()
        .find(|t| t.id == id)?;
    let image = tile.image?;
    let px = (x - tile.image_rect.x0).floor() as u32;
    let py = (y - tile.image_rect.y0).floor() as u32;
    Some(image.get_pixel(px, py).0)
}

/// Assert two channel values are within one step of each other.
pub fn assert_close(actual: u8, expected: f64) {
    assert!(
        (actual as f64 - expected).abs() <= 1.0,
        "expected {} +/- 1, got {}",
        expected,
        actual
    );
}
