//! The tile provider: compositing, fetch scheduling and invalidation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use image::RgbaImage;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::TileProviderConfig;
use crate::error::{DataError, GeometryError, ProviderError};
use crate::geometry::{is_bounded, Affine, Rect};
use crate::imagesources::ImageSourceId;
use crate::signal::Subscription;
use crate::slicing::StackId;
use crate::stack::{StackEntry, StackEvent, StackedImageSources};
use crate::sync::{lock, read, write};
use crate::tiling::Tiling;

use super::cache::{CacheStats, TilesCache};
use super::compose::{compose, Placement};
use super::queue::{FetchJob, FetchQueue};

/// Buffered `changed` notifications per receiver.
const CHANGED_CAPACITY: usize = 1024;

/// One tile as handed to the view.
#[derive(Debug, Clone)]
pub struct Tile {
    /// Index into the tiling
    pub id: usize,
    /// Latest composite, if one has been rendered
    pub image: Option<Arc<RgbaImage>>,
    /// Scene rect without overlap
    pub rect: Rect,
    /// Scene rect covered by `image`
    pub image_rect: Rect,
    /// Fraction of layers that are up to date, in `[0, 1]`
    pub progress: f64,
}

impl Tile {
    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0
    }
}

// =============================================================================
// Shared state
// =============================================================================

struct Shared {
    config: TileProviderConfig,
    sources: Arc<StackedImageSources>,
    tiling: RwLock<Arc<Tiling>>,
    cache: TilesCache,
    queue: FetchQueue,
    /// Logical clock for request and dirtying timestamps
    clock: AtomicU64,
    /// Bumped by structural changes; replies from older epochs are dropped
    epoch: AtomicU64,
    changed: broadcast::Sender<Rect>,
    stopped: AtomicBool,
}

impl Shared {
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn tiling(&self) -> Arc<Tiling> {
        read(&self.tiling).clone()
    }

    fn emit_changed(&self, rect: Rect) {
        // No receivers is fine
        let _ = self.changed.send(rect);
    }

    /// Throw away everything tied to the current geometry or layer set.
    fn reset(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let dropped = self.queue.clear();
        self.cache.clear();
        debug!("Tile cache reset (epoch {}, {} queued fetches dropped)", epoch, dropped);
    }

    fn on_stack_event(&self, event: &StackEvent) {
        let tiling = self.tiling();
        match event {
            StackEvent::Visibility { .. } | StackEvent::Opacity { .. } | StackEvent::Order => {
                self.cache.mark_composites_dirty(None);
                self.emit_changed(tiling.scene_rect());
            }
            StackEvent::Size => {
                self.reset();
                self.emit_changed(tiling.scene_rect());
            }
            StackEvent::LayerDirty { source, rect } => {
                let scene = tiling.data_rect_to_scene(*rect);
                let tiles = tiling.intersected(scene);
                let ts = self.tick();
                self.cache.mark_layer_dirty(*source, &tiles, ts);

                let contributes = self
                    .sources
                    .entries()
                    .iter()
                    .any(|e| e.source.id() == *source && e.is_eligible());
                if contributes {
                    self.cache.mark_composites_dirty(Some(&tiles));
                }
                trace!("{} dirtied {} tiles", source, tiles.len());

                let changed = if is_bounded(&scene) {
                    scene.intersect(tiling.scene_rect())
                } else {
                    tiling.scene_rect()
                };
                self.emit_changed(changed);
            }
            StackEvent::StackIdChanged { old, new } => {
                let touched = self.cache.touch_stack(new);
                debug!(
                    "Stack id changed from {} to {} ({} cached entries revived)",
                    old, new, touched
                );
                self.emit_changed(tiling.scene_rect());
            }
        }
    }

    fn refresh(&self, rect: Rect, handle: &Handle) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let tiling = self.tiling();
        let stack = self.sources.stack_id();
        let entries = self.sources.entries();
        let epoch = self.epoch.load(Ordering::SeqCst);
        let through = (!stack.through().is_empty()).then(|| stack.through());
        let direct_allowed = Handle::try_current().is_err();

        for tile in tiling.intersected(rect) {
            let Some(rects) = tiling.tile_rects(tile) else {
                continue;
            };

            for entry in entries.iter().filter(|e| e.is_eligible()) {
                let source = entry.source.id();
                let ts = self.tick();
                if !self.cache.claim_fetch(&stack, source, tile, ts) {
                    continue;
                }
                let job = FetchJob {
                    priority: entry.source.priority(),
                    timestamp: ts,
                    epoch,
                    stack: stack.clone(),
                    source,
                    tile,
                    request: entry.source.request(rects.data_image_rect, through),
                };

                if entry.source.direct() && direct_allowed {
                    let result = handle.block_on(job.request.wait());
                    self.finish_fetch(epoch, &stack, source, tile, ts, result);
                } else if let Err(job) = self.queue.try_push(job) {
                    self.cache.release_fetch(&stack, job.source, job.tile, job.timestamp);
                    trace!("Fetch queue full, dropped {} tile {}", job.source, job.tile);
                }
            }

            self.refresh_composite(&tiling, &stack, tile, &entries);
        }
    }

    fn refresh_composite(&self, tiling: &Tiling, stack: &StackId, tile: usize, entries: &[StackEntry]) {
        let Some(rects) = tiling.tile_rects(tile) else {
            return;
        };
        let eligible: Vec<&StackEntry> = entries.iter().filter(|e| e.is_eligible()).collect();
        let ids: Vec<ImageSourceId> = eligible.iter().map(|e| e.source.id()).collect();
        let Some((revision, images)) = self.cache.composite_job(stack, tile, &ids) else {
            return;
        };

        // Bottom layer first
        let layers: Vec<(Arc<RgbaImage>, f64)> = images
            .into_iter()
            .zip(&eligible)
            .rev()
            .filter_map(|(image, entry)| image.map(|image| (image, entry.opacity)))
            .collect();
        let placement = Placement::new(rects, tiling.scene2data());
        let image = compose(&placement, self.config.background, &layers);
        self.cache.store_composite(stack, tile, revision, Arc::new(image));
    }

    fn finish_fetch(
        &self,
        epoch: u64,
        stack: &StackId,
        source: ImageSourceId,
        tile: usize,
        ts: u64,
        result: Result<RgbaImage, DataError>,
    ) {
        if epoch != self.epoch.load(Ordering::SeqCst) {
            // The claim may have landed in the cache after the reset
            self.cache.release_fetch(stack, source, tile, ts);
            trace!("Discarding {} tile {} from epoch {}", source, tile, epoch);
            return;
        }
        match result {
            Ok(image) => {
                if self.cache.update_layer(stack, source, tile, ts, Arc::new(image)) {
                    if let Some(rects) = self.tiling().tile_rects(tile) {
                        self.emit_changed(rects.tile_rect);
                    }
                } else {
                    trace!("Superseded reply for {} tile {} ignored", source, tile);
                }
            }
            Err(DataError::Indeterminate) => {
                self.cache.release_fetch(stack, source, tile, ts);
                debug!("{} tile {} is indeterminate, waiting for dirty", source, tile);
            }
            Err(e) => {
                self.cache.release_fetch(stack, source, tile, ts);
                warn!("Fetch of {} tile {} failed: {}", source, tile, e);
            }
        }
    }
}

async fn run_worker(shared: Arc<Shared>, index: usize) {
    trace!("Tile worker {} started", index);
    while let Some(job) = shared.queue.pop().await {
        let FetchJob {
            timestamp,
            epoch,
            stack,
            source,
            tile,
            request,
            ..
        } = job;

        // A panicking source must not take the worker down with it.
        let result = match tokio::spawn(request.wait()).await {
            Ok(result) => result,
            Err(e) => {
                error!("Fetch of {} tile {} aborted: {}", source, tile, e);
                Err(DataError::Cancelled)
            }
        };
        shared.finish_fetch(epoch, &stack, source, tile, timestamp, result);
        shared.queue.done();
    }
    trace!("Tile worker {} stopped", index);
}

// =============================================================================
// TileProvider
// =============================================================================

/// Produces composited tiles for a viewport and keeps them fresh.
///
/// Layer tiles are fetched on a pool of worker threads; composites are
/// rendered on the caller's thread from whatever layer tiles are cached.
/// [`get_tiles`](Self::get_tiles) never waits for fetches;
/// [`join`](Self::join) does.
///
/// The blocking methods (`join`, `wait_for_tiles`, `join_threads`) must be
/// called from outside an async runtime; async callers use
/// [`idle`](Self::idle).
pub struct TileProvider {
    shared: Arc<Shared>,
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    _events: Subscription,
}

impl TileProvider {
    /// Start a provider with `config.workers` fetch threads.
    pub fn new(
        tiling: Tiling,
        sources: Arc<StackedImageSources>,
        config: TileProviderConfig,
    ) -> Result<Self, ProviderError> {
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.workers)
            .thread_name("tile-worker")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        let (changed, _) = broadcast::channel(CHANGED_CAPACITY);
        let shared = Arc::new(Shared {
            cache: TilesCache::new(config.cache_memory),
            queue: FetchQueue::new(config.queue_capacity),
            config,
            sources,
            tiling: RwLock::new(Arc::new(tiling)),
            clock: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            changed,
            stopped: AtomicBool::new(false),
        });

        let events = {
            let weak: Weak<Shared> = Arc::downgrade(&shared);
            shared.sources.events().subscribe(move |event: &StackEvent| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_stack_event(event);
                }
            })
        };

        let workers = (0..shared.config.workers)
            .map(|i| handle.spawn(run_worker(shared.clone(), i)))
            .collect();

        info!(
            "Tile provider started: {} workers, {} tiles, cache {} bytes",
            shared.config.workers,
            shared.tiling().len(),
            shared.config.cache_memory
        );

        Ok(Self {
            shared,
            handle,
            runtime: Mutex::new(Some(runtime)),
            workers: Mutex::new(workers),
            _events: events,
        })
    }

    pub fn config(&self) -> &TileProviderConfig {
        &self.shared.config
    }

    pub fn sources(&self) -> &Arc<StackedImageSources> {
        &self.shared.sources
    }

    pub fn tiling(&self) -> Arc<Tiling> {
        self.shared.tiling()
    }

    /// Replace the tiling. Every cached tile and queued fetch is dropped.
    pub fn set_tiling(&self, tiling: Tiling) {
        let scene = tiling.scene_rect();
        *write(&self.shared.tiling) = Arc::new(tiling);
        self.shared.reset();
        self.shared.emit_changed(scene);
    }

    /// Change the data-to-scene transform, keeping the other parameters.
    pub fn set_data2scene(&self, data2scene: Affine) -> Result<(), GeometryError> {
        let tiling = self.tiling().with_data2scene(data2scene)?;
        self.set_tiling(tiling);
        Ok(())
    }

    /// Change the slice shape, keeping the other parameters.
    pub fn set_shape(&self, shape: (usize, usize)) -> Result<(), GeometryError> {
        let tiling = self.tiling().with_shape(shape)?;
        self.set_tiling(tiling);
        Ok(())
    }

    /// Recomposite dirty tiles intersecting `rect` and schedule fetches for
    /// stale layer tiles.
    pub fn request_refresh(&self, rect: Rect) {
        self.shared.refresh(rect, &self.handle);
    }

    /// The current tiles intersecting `rect`. Never waits for fetches.
    pub fn get_tiles(&self, rect: Rect) -> Vec<Tile> {
        self.request_refresh(rect);

        let tiling = self.tiling();
        let stack = self.shared.sources.stack_id();
        let entries = self.shared.sources.entries();
        let eligible: Vec<ImageSourceId> = entries
            .iter()
            .filter(|e| e.is_eligible())
            .map(|e| e.source.id())
            .collect();

        tiling
            .intersected(rect)
            .into_iter()
            .filter_map(|id| {
                let rects = tiling.tile_rects(id)?;
                Some(Tile {
                    id,
                    image: self.shared.cache.composite(&stack, id),
                    rect: rects.tile_rect,
                    image_rect: rects.image_rect,
                    progress: self
                        .shared
                        .cache
                        .progress(&stack, id, entries.len(), &eligible),
                })
            })
            .collect()
    }

    /// Block until no fetch is queued or running.
    pub fn join(&self) {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return;
        }
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let shared = self.shared.clone();
        self.handle.spawn(async move {
            shared.queue.wait_idle().await;
            let _ = tx.send(());
        });
        // A dropped sender means the runtime went away; nothing left to wait for.
        let _ = rx.recv();
    }

    /// Wait asynchronously until no fetch is queued or running.
    pub async fn idle(&self) {
        self.shared.queue.wait_idle().await;
    }

    /// Schedule `rect` and block until every fetch has landed.
    pub fn wait_for_tiles(&self, rect: Rect) {
        self.request_refresh(rect);
        self.join();
    }

    /// Receive the scene rect of every change.
    pub fn subscribe_changed(&self) -> broadcast::Receiver<Rect> {
        self.shared.changed.subscribe()
    }

    /// Number of fetches waiting for a worker.
    pub fn pending_fetches(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    pub fn cache(&self) -> &TilesCache {
        &self.shared.cache
    }

    /// Ask the workers to exit. Queued fetches are dropped.
    pub fn notify_threads_to_stop(&self) {
        if !self.shared.stopped.swap(true, Ordering::SeqCst) {
            debug!("Stopping tile workers");
        }
        self.shared.queue.close();
    }

    /// Stop the workers and wait for them to exit.
    pub fn join_threads(&self) {
        self.notify_threads_to_stop();
        let workers = std::mem::take(&mut *lock(&self.workers));
        let Some(runtime) = lock(&self.runtime).take() else {
            return;
        };
        if Handle::try_current().is_ok() {
            runtime.shutdown_background();
            return;
        }
        for worker in workers {
            if let Err(e) = runtime.block_on(worker) {
                error!("Tile worker exited abnormally: {}", e);
            }
        }
        drop(runtime);
        info!("Tile workers stopped");
    }
}

impl Drop for TileProvider {
    fn drop(&mut self) {
        self.notify_threads_to_stop();
        if let Some(runtime) = lock(&self.runtime).take() {
            runtime.shutdown_background();
        }
    }
}
