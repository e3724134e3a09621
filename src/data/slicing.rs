//! N-dimensional slicings.

use std::fmt;

use crate::error::DataError;

/// A half-open range along one axis. `None` ends are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AxisRange {
    pub start: Option<usize>,
    pub stop: Option<usize>,
}

impl AxisRange {
    /// A bounded range `[start, stop)`.
    pub const fn new(start: usize, stop: usize) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
        }
    }

    /// The whole axis.
    pub const fn all() -> Self {
        Self {
            start: None,
            stop: None,
        }
    }

    /// The single index `[index, index + 1)`.
    pub const fn single(index: usize) -> Self {
        Self::new(index, index + 1)
    }

    pub fn is_bounded(&self) -> bool {
        self.start.is_some() && self.stop.is_some()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.start.map_or(true, |s| index >= s) && self.stop.map_or(true, |e| index < e)
    }

    /// Whether the two ranges share at least one index.
    pub fn intersects(&self, other: &AxisRange) -> bool {
        let start = self.start.unwrap_or(0).max(other.start.unwrap_or(0));
        let stop = self
            .stop
            .unwrap_or(usize::MAX)
            .min(other.stop.unwrap_or(usize::MAX));
        start < stop
    }

    /// Resolve open ends against an axis of length `len`.
    pub fn resolve(&self, len: usize) -> (usize, usize) {
        (self.start.unwrap_or(0), self.stop.unwrap_or(len))
    }
}

impl fmt::Display for AxisRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(start) = self.start {
            write!(f, "{start}")?;
        }
        f.write_str(":")?;
        if let Some(stop) = self.stop {
            write!(f, "{stop}")?;
        }
        Ok(())
    }
}

/// One [`AxisRange`] per axis of a data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slicing(Vec<AxisRange>);

impl Slicing {
    pub fn new(ranges: Vec<AxisRange>) -> Self {
        Self(ranges)
    }

    /// A slicing covering every axis completely. Used to signal "all dirty".
    pub fn all(ndim: usize) -> Self {
        Self(vec![AxisRange::all(); ndim])
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    pub fn ranges(&self) -> &[AxisRange] {
        &self.0
    }

    pub fn axis(&self, axis: usize) -> Option<&AxisRange> {
        self.0.get(axis)
    }

    pub fn is_bounded(&self) -> bool {
        self.0.iter().all(AxisRange::is_bounded)
    }

    /// Whether the two slicings overlap. Mismatched dimensionality is
    /// treated as overlapping.
    pub fn intersects(&self, other: &Slicing) -> bool {
        if self.ndim() != other.ndim() {
            return true;
        }
        self.0.iter().zip(&other.0).all(|(a, b)| a.intersects(b))
    }

    /// Resolve open ends against `shape` and check bounds.
    pub fn resolve(&self, shape: &[usize]) -> Result<Vec<(usize, usize)>, DataError> {
        if self.ndim() != shape.len() {
            return Err(DataError::Dimensionality {
                expected: shape.len(),
                actual: self.ndim(),
            });
        }
        self.0
            .iter()
            .zip(shape)
            .map(|(range, &len)| {
                let (start, stop) = range.resolve(len);
                if start > stop || stop > len {
                    Err(DataError::OutOfBounds {
                        slicing: self.to_string(),
                        shape: shape.to_vec(),
                    })
                } else {
                    Ok((start, stop))
                }
            })
            .collect()
    }
}

impl From<Vec<AxisRange>> for Slicing {
    fn from(ranges: Vec<AxisRange>) -> Self {
        Self(ranges)
    }
}

impl fmt::Display for Slicing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, range) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{range}")?;
        }
        f.write_str("]")
    }
}
