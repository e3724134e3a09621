//! Projection of N-d data onto a 2-D plane.

use crate::data::{AxisRange, DataArray, Slicing};
use crate::error::{DataError, ProjectionError};

/// Which axes of an N-d source become the displayed plane.
///
/// The abscissa and ordinate axes are displayed; every remaining axis is
/// "along" and fixed at a through value. Together the three sets partition
/// the source's axes exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceProjection {
    abscissa: usize,
    ordinate: usize,
    along: Vec<usize>,
    ndim: usize,
}

impl SliceProjection {
    /// Build a projection over `ndim` axes.
    ///
    /// # Errors
    ///
    /// Fails unless `abscissa`, `ordinate` and `along` cover `0..ndim`
    /// exactly once.
    pub fn new(
        abscissa: usize,
        ordinate: usize,
        along: Vec<usize>,
        ndim: usize,
    ) -> Result<Self, ProjectionError> {
        let mut seen = vec![false; ndim];
        for axis in [abscissa, ordinate].into_iter().chain(along.iter().copied()) {
            let slot = seen
                .get_mut(axis)
                .ok_or(ProjectionError::AxisOutOfRange { axis, ndim })?;
            if *slot {
                return Err(ProjectionError::DuplicateAxis(axis));
            }
            *slot = true;
        }
        if let Some(axis) = seen.iter().position(|covered| !covered) {
            return Err(ProjectionError::MissingAxis(axis));
        }

        Ok(Self {
            abscissa,
            ordinate,
            along,
            ndim,
        })
    }

    /// The x/y plane of a `(t, x, y, z, c)` volume.
    pub fn xy() -> Self {
        Self {
            abscissa: 1,
            ordinate: 2,
            along: vec![0, 3, 4],
            ndim: 5,
        }
    }

    /// The x/z plane of a `(t, x, y, z, c)` volume.
    pub fn xz() -> Self {
        Self {
            abscissa: 1,
            ordinate: 3,
            along: vec![0, 2, 4],
            ndim: 5,
        }
    }

    /// The y/z plane of a `(t, x, y, z, c)` volume.
    pub fn yz() -> Self {
        Self {
            abscissa: 2,
            ordinate: 3,
            along: vec![0, 1, 4],
            ndim: 5,
        }
    }

    pub fn abscissa(&self) -> usize {
        self.abscissa
    }

    pub fn ordinate(&self) -> usize {
        self.ordinate
    }

    pub fn along(&self) -> &[usize] {
        &self.along
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    /// The ordinate precedes the abscissa in storage order, so the
    /// collapsed plane must be transposed to keep x horizontal.
    pub fn handedness_switched(&self) -> bool {
        self.ordinate < self.abscissa
    }

    /// The N-d slicing selecting a window of the plane at `through`.
    pub fn domain(
        &self,
        through: &[usize],
        abscissa_range: AxisRange,
        ordinate_range: AxisRange,
    ) -> Result<Slicing, ProjectionError> {
        if through.len() != self.along.len() {
            return Err(ProjectionError::ThroughLength {
                expected: self.along.len(),
                actual: through.len(),
            });
        }

        let mut ranges = vec![AxisRange::all(); self.ndim];
        ranges[self.abscissa] = abscissa_range;
        ranges[self.ordinate] = ordinate_range;
        for (&axis, &value) in self.along.iter().zip(through) {
            ranges[axis] = AxisRange::single(value);
        }
        Ok(Slicing::new(ranges))
    }

    /// Collapse an N-d answer to a 2-D `[abscissa, ordinate]` array.
    pub fn project(&self, array: DataArray) -> Result<DataArray, DataError> {
        if array.ndim() != self.ndim {
            return Err(DataError::Dimensionality {
                expected: self.ndim,
                actual: array.ndim(),
            });
        }
        let plane = array.collapse_axes(&self.along)?;
        if self.handedness_switched() {
            Ok(plane.reversed_axes())
        } else {
            Ok(plane)
        }
    }

    /// Whether an N-d dirty slicing touches the plane at `through`.
    pub fn touches(&self, slicing: &Slicing, through: &[usize]) -> bool {
        if slicing.ndim() != self.ndim {
            return true;
        }
        self.along
            .iter()
            .zip(through)
            .all(|(&axis, &value)| slicing.ranges()[axis].contains(value))
    }
}
