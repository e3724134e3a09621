//! 2-D views onto N-d data sources.

use std::sync::{Arc, RwLock};

use tracing::trace;

use crate::data::{AxisRange, DataArray, DataSource, Slicing};
use crate::error::{DataError, ProjectionError};
use crate::geometry::{slicing2rect, unbounded_rect, IntRect, Rect};
use crate::signal::{Signal, Subscription};
use crate::sync::{read, write};

use super::projection::SliceProjection;

/// Emitted when a slice source moves to different through values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThroughChange {
    pub old: Vec<usize>,
    pub new: Vec<usize>,
}

/// A pending 2-D slice fetch.
///
/// The N-d slicing is fixed when the request is created, so later
/// navigation does not change what it returns.
pub struct SliceRequest {
    data: Arc<dyn DataSource>,
    slicing: Slicing,
    projection: SliceProjection,
}

impl SliceRequest {
    /// The N-d slicing that will be pulled from the data source.
    pub fn slicing(&self) -> &Slicing {
        &self.slicing
    }

    /// Fetch and collapse to a 2-D `[abscissa, ordinate]` array.
    pub async fn wait(self) -> Result<DataArray, DataError> {
        let array = self.data.request(&self.slicing).await?;
        self.projection.project(array)
    }
}

/// A data source seen through a [`SliceProjection`] at fixed through values.
pub struct SliceSource {
    data: Arc<dyn DataSource>,
    projection: SliceProjection,
    through: Arc<RwLock<Vec<usize>>>,
    dirty: Arc<Signal<Rect>>,
    through_changed: Signal<ThroughChange>,
    _data_dirty: Subscription,
}

impl SliceSource {
    /// View `data` through `projection`, starting at through values of 0.
    pub fn new(
        data: Arc<dyn DataSource>,
        projection: SliceProjection,
    ) -> Result<Self, ProjectionError> {
        let ndim = data.shape().len();
        if ndim != projection.ndim() {
            return Err(ProjectionError::Dimensionality {
                expected: projection.ndim(),
                actual: ndim,
            });
        }

        let through = Arc::new(RwLock::new(vec![0; projection.along().len()]));
        let dirty: Arc<Signal<Rect>> = Arc::new(Signal::new());

        let subscription = {
            let through = through.clone();
            let dirty = dirty.clone();
            let projection = projection.clone();
            data.dirty_signal().subscribe(move |slicing: &Slicing| {
                let current = read(&through).clone();
                if !projection.touches(slicing, &current) {
                    trace!("Ignoring dirty region {} off the current plane", slicing);
                    return;
                }
                let rect = if slicing.ndim() == projection.ndim() {
                    let ranges = slicing.ranges();
                    slicing2rect(&ranges[projection.abscissa()], &ranges[projection.ordinate()])
                } else {
                    unbounded_rect()
                };
                dirty.emit(&rect);
            })
        };

        Ok(Self {
            data,
            projection,
            through,
            dirty,
            through_changed: Signal::new(),
            _data_dirty: subscription,
        })
    }

    pub fn data(&self) -> &Arc<dyn DataSource> {
        &self.data
    }

    pub fn projection(&self) -> &SliceProjection {
        &self.projection
    }

    /// Current through values, one per along axis.
    pub fn through(&self) -> Vec<usize> {
        read(&self.through).clone()
    }

    /// `(width, height)` of the displayed plane.
    pub fn plane_shape(&self) -> (usize, usize) {
        let shape = self.data.shape();
        let len = |axis: usize| shape.get(axis).copied().unwrap_or(0);
        (len(self.projection.abscissa()), len(self.projection.ordinate()))
    }

    /// Move one fixed coordinate. Changing it dirties the whole plane.
    pub fn set_through(&self, index: usize, value: usize) -> Result<(), ProjectionError> {
        let mut values = self.through();
        let len = values.len();
        let slot = values
            .get_mut(index)
            .ok_or(ProjectionError::ThroughIndex { index, len })?;
        *slot = value;
        self.set_through_all(&values)
    }

    /// Move every fixed coordinate at once.
    pub fn set_through_all(&self, values: &[usize]) -> Result<(), ProjectionError> {
        let old = {
            let mut through = write(&self.through);
            if values.len() != through.len() {
                return Err(ProjectionError::ThroughLength {
                    expected: through.len(),
                    actual: values.len(),
                });
            }
            if through.as_slice() == values {
                return Ok(());
            }
            std::mem::replace(&mut *through, values.to_vec())
        };

        self.dirty.emit(&unbounded_rect());
        self.through_changed.emit(&ThroughChange {
            old,
            new: values.to_vec(),
        });
        Ok(())
    }

    /// Start a fetch of the plane window `rect`.
    ///
    /// `through` overrides the current through values for this request.
    pub fn request(
        &self,
        rect: IntRect,
        through: Option<&[usize]>,
    ) -> Result<SliceRequest, ProjectionError> {
        let through = match through {
            Some(values) => values.to_vec(),
            None => self.through(),
        };
        let x0 = rect.x.max(0) as usize;
        let y0 = rect.y.max(0) as usize;
        let x1 = rect.right().max(0) as usize;
        let y1 = rect.bottom().max(0) as usize;

        let slicing = self.projection.domain(
            &through,
            AxisRange::new(x0, x1.max(x0)),
            AxisRange::new(y0, y1.max(y0)),
        )?;

        Ok(SliceRequest {
            data: self.data.clone(),
            slicing,
            projection: self.projection.clone(),
        })
    }

    /// Mark a plane region dirty.
    pub fn set_dirty(&self, rect: Rect) {
        self.dirty.emit(&rect);
    }

    /// Dirty plane regions, in data coordinates.
    pub fn dirty_signal(&self) -> &Signal<Rect> {
        &self.dirty
    }

    pub fn through_changed_signal(&self) -> &Signal<ThroughChange> {
        &self.through_changed
    }
}
