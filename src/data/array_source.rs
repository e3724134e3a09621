//! In-memory data sources.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::DataError;
use crate::signal::Signal;
use crate::sync::{read, write};

use super::{DType, DataArray, DataSource, Slicing, SourceId};

// =============================================================================
// ArraySource
// =============================================================================

/// A data source over an owned, mutable array.
///
/// Writes emit dirty notifications for the touched region. An optional
/// latency makes every request wait before answering, which is useful for
/// exercising asynchronous paths.
pub struct ArraySource {
    id: SourceId,
    data: RwLock<DataArray>,
    dirty: Signal<Slicing>,
    indeterminate: AtomicBool,
    latency: Option<Duration>,
}

impl ArraySource {
    pub fn new(data: DataArray) -> Self {
        Self {
            id: SourceId::next(),
            data: RwLock::new(data),
            dirty: Signal::new(),
            indeterminate: AtomicBool::new(false),
            latency: None,
        }
    }

    /// Delay every request by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Overwrite a region with `value` and mark it dirty.
    pub fn fill(&self, slicing: &Slicing, value: f64) -> Result<(), DataError> {
        write(&self.data).fill(slicing, value)?;
        self.dirty.emit(slicing);
        Ok(())
    }

    /// Replace the whole array. Axis lengths may change, the number of
    /// axes may not.
    pub fn set_data(&self, data: DataArray) -> Result<(), DataError> {
        let ndim = data.ndim();
        {
            let mut current = write(&self.data);
            if current.ndim() != ndim {
                return Err(DataError::Dimensionality {
                    expected: current.ndim(),
                    actual: ndim,
                });
            }
            *current = data;
        }
        self.dirty.emit(&Slicing::all(ndim));
        Ok(())
    }

    /// While indeterminate, every request fails with
    /// [`DataError::Indeterminate`]. Leaving the state marks everything
    /// dirty so consumers retry.
    pub fn set_indeterminate(&self, indeterminate: bool) {
        let was = self.indeterminate.swap(indeterminate, Ordering::SeqCst);
        if was && !indeterminate {
            let ndim = read(&self.data).ndim();
            self.dirty.emit(&Slicing::all(ndim));
        }
    }
}

#[async_trait]
impl DataSource for ArraySource {
    async fn request(&self, slicing: &Slicing) -> Result<DataArray, DataError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.indeterminate.load(Ordering::SeqCst) {
            return Err(DataError::Indeterminate);
        }
        read(&self.data).slice(slicing)
    }

    fn dtype(&self) -> DType {
        read(&self.data).dtype()
    }

    fn shape(&self) -> Vec<usize> {
        read(&self.data).shape().to_vec()
    }

    fn dirty_signal(&self) -> &Signal<Slicing> {
        &self.dirty
    }

    fn id(&self) -> SourceId {
        self.id
    }
}

// =============================================================================
// ConstantSource
// =============================================================================

/// A source that answers every request with a constant.
///
/// Serves as a placeholder channel, for example the alpha channel of an
/// RGBA layer without transparency data.
pub struct ConstantSource {
    id: SourceId,
    value: RwLock<f64>,
    dtype: DType,
    shape: Vec<usize>,
    dirty: Signal<Slicing>,
}

impl ConstantSource {
    pub fn new(value: f64, dtype: DType, shape: Vec<usize>) -> Self {
        Self {
            id: SourceId::next(),
            value: RwLock::new(value),
            dtype,
            shape,
            dirty: Signal::new(),
        }
    }

    pub fn value(&self) -> f64 {
        *read(&self.value)
    }

    /// Change the constant; everything becomes dirty.
    pub fn set_value(&self, value: f64) {
        *write(&self.value) = value;
        self.dirty.emit(&Slicing::all(self.shape.len()));
    }
}

#[async_trait]
impl DataSource for ConstantSource {
    async fn request(&self, slicing: &Slicing) -> Result<DataArray, DataError> {
        let bounds = slicing.resolve(&self.shape)?;
        let shape: Vec<usize> = bounds.iter().map(|(start, stop)| stop - start).collect();
        Ok(DataArray::filled(self.dtype, &shape, self.value()))
    }

    fn dtype(&self) -> DType {
        self.dtype
    }

    fn shape(&self) -> Vec<usize> {
        self.shape.clone()
    }

    fn dirty_signal(&self) -> &Signal<Slicing> {
        &self.dirty
    }

    fn id(&self) -> SourceId {
        self.id
    }
}
