//! Memoizing decorator for data sources.
//!
//! Interactive navigation requests the same slices over and over. The
//! `CacheSource` keeps recent answers in a memory-budgeted LRU and makes
//! sure identical concurrent requests reach the wrapped source only once.
//!
//! Features:
//! - Size-based LRU eviction via [`KvCache`]
//! - Singleflight: concurrent requests for the same slicing share one fetch
//! - Failed requests are never cached, so they are retried
//! - Dirty notifications evict intersecting entries before being re-emitted

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;

use crate::cache::{KvCache, DEFAULT_CACHE_CAPACITY};
use crate::error::DataError;
use crate::signal::{Signal, Subscription};
use crate::sync::lock;

use super::{DType, DataArray, DataSource, Slicing, SourceId};

/// State for an in-flight request.
struct InFlightState {
    /// Notification for waiters
    notify: Notify,
    /// Result of the request (set when complete)
    result: Mutex<Option<Result<DataArray, DataError>>>,
    /// Set once the leader finished or was dropped
    done: AtomicBool,
}

/// Retires an in-flight entry when the leader finishes or is cancelled.
struct LeaderGuard<'a> {
    in_flight: &'a Mutex<HashMap<Slicing, Arc<InFlightState>>>,
    slicing: &'a Slicing,
    state: Arc<InFlightState>,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        {
            let mut in_flight = lock(self.in_flight);
            if in_flight
                .get(self.slicing)
                .is_some_and(|s| Arc::ptr_eq(s, &self.state))
            {
                in_flight.remove(self.slicing);
            }
        }
        self.state.done.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }
}

/// A [`DataSource`] decorator memoizing slice requests.
pub struct CacheSource<S: DataSource> {
    /// The wrapped source
    inner: Arc<S>,

    /// Cached answers indexed by slicing
    cache: Arc<Mutex<KvCache<Slicing, DataArray>>>,

    /// In-flight requests for singleflight pattern
    in_flight: Mutex<HashMap<Slicing, Arc<InFlightState>>>,

    /// Bumped on every dirty notification; answers fetched across a bump
    /// are returned but not cached
    generation: Arc<AtomicU64>,

    dirty: Arc<Signal<Slicing>>,

    _inner_dirty: Subscription,
}

impl<S: DataSource + 'static> CacheSource<S> {
    /// Wrap `inner` with the default budget (256MB).
    pub fn new(inner: S) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_CAPACITY)
    }

    /// Wrap `inner`, keeping at most `max_size` bytes of answers.
    pub fn with_capacity(inner: S, max_size: usize) -> Self {
        let inner = Arc::new(inner);
        let cache = Arc::new(Mutex::new(KvCache::<Slicing, DataArray>::with_capacity(max_size)));
        let generation = Arc::new(AtomicU64::new(0));
        let dirty = Arc::new(Signal::new());

        let subscription = {
            let cache = cache.clone();
            let generation = generation.clone();
            let dirty = dirty.clone();
            inner.dirty_signal().subscribe(move |slicing: &Slicing| {
                generation.fetch_add(1, Ordering::SeqCst);
                let evicted = lock(&cache).retain(|key, _| !key.intersects(slicing));
                if evicted > 0 {
                    debug!("Evicted {} cached slices dirtied by {}", evicted, slicing);
                }
                dirty.emit(slicing);
            })
        };

        Self {
            inner,
            cache,
            in_flight: Mutex::new(HashMap::new()),
            generation,
            dirty,
            _inner_dirty: subscription,
        }
    }

    /// The wrapped source.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// `(current_size, capacity, entry_count)` of the memo cache.
    pub fn cache_stats(&self) -> (usize, usize, usize) {
        let cache = lock(&self.cache);
        (cache.size(), cache.capacity(), cache.len())
    }

    /// Drop every memoized answer.
    pub fn clear(&self) {
        lock(&self.cache).clean();
    }
}

#[async_trait]
impl<S: DataSource + 'static> DataSource for CacheSource<S> {
    /// Fetch a slice from cache or from the wrapped source.
    ///
    /// Implements the singleflight pattern: if multiple tasks request the
    /// same slicing concurrently, only one fetch is performed and all tasks
    /// share the result.
    async fn request(&self, slicing: &Slicing) -> Result<DataArray, DataError> {
        loop {
            // Fast path: check cache
            if let Some(data) = lock(&self.cache).get(slicing) {
                return Ok(data.clone());
            }

            // Slow path: check in_flight or become leader
            let (state, leader) = {
                let mut in_flight = lock(&self.in_flight);
                match in_flight.get(slicing) {
                    Some(state) => (state.clone(), false),
                    None => {
                        let state = Arc::new(InFlightState {
                            notify: Notify::new(),
                            result: Mutex::new(None),
                            done: AtomicBool::new(false),
                        });
                        in_flight.insert(slicing.clone(), state.clone());
                        (state, true)
                    }
                }
            };

            if leader {
                let guard = LeaderGuard {
                    in_flight: &self.in_flight,
                    slicing,
                    state: state.clone(),
                };
                let generation = self.generation.load(Ordering::SeqCst);
                let result = self.inner.request(slicing).await;

                if let Ok(ref data) = result {
                    if self.generation.load(Ordering::SeqCst) == generation {
                        lock(&self.cache).set(slicing.clone(), data.clone());
                    }
                }

                *lock(&state.result) = Some(result.clone());
                drop(guard);

                return result;
            }

            // Wait for the leader to finish
            let notified = state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !state.done.load(Ordering::SeqCst) {
                notified.await;
            }

            let finished = lock(&state.result).clone();
            if let Some(result) = finished {
                return result;
            }

            // Leader vanished without a result (cancelled); try again
        }
    }

    fn dtype(&self) -> DType {
        self.inner.dtype()
    }

    fn shape(&self) -> Vec<usize> {
        self.inner.shape()
    }

    fn dirty_signal(&self) -> &Signal<Slicing> {
        &self.dirty
    }

    fn id(&self) -> SourceId {
        self.inner.id()
    }
}
