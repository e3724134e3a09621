//! Typed N-dimensional arrays returned by data sources.

use std::fmt;

use ndarray::{Array2, ArrayD, Axis, Ix2, IxDyn, Slice};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::MemorySize;
use crate::error::DataError;

use super::slicing::Slicing;

/// Element type of a [`DataArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    U8,
    U16,
    U32,
    U64,
    I32,
    I64,
    F32,
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            DType::U8 => 1,
            DType::U16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::U64 | DType::I64 | DType::F64 => 8,
        }
    }

    /// 64-bit integers are narrowed before color mapping.
    pub fn is_wide_integer(&self) -> bool {
        matches!(self, DType::U64 | DType::I64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::U8 => "uint8",
            DType::U16 => "uint16",
            DType::U32 => "uint32",
            DType::U64 => "uint64",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::F32 => "float32",
            DType::F64 => "float64",
        };
        f.write_str(name)
    }
}

/// A scalar type that can live in a [`DataArray`].
pub trait Element: Copy + Send + Sync + PartialEq + fmt::Debug + 'static {
    const DTYPE: DType;

    fn from_f64(value: f64) -> Self;

    fn to_f64(self) -> f64;

    fn to_i64(self) -> i64;
}

macro_rules! impl_element {
    ($($t:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DTYPE: DType = DType::$dtype;

                fn from_f64(value: f64) -> Self {
                    value as $t
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn to_i64(self) -> i64 {
                    self as i64
                }
            }

            impl From<ArrayD<$t>> for DataArray {
                fn from(array: ArrayD<$t>) -> Self {
                    DataArray::$dtype(array)
                }
            }
        )*
    };
}

/// An owned, dynamically-shaped array of one of the supported dtypes.
#[derive(Debug, Clone, PartialEq)]
pub enum DataArray {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

impl_element!(
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
);

/// Evaluate `$body` with `$a` bound to the inner array, whatever its type.
macro_rules! with_array {
    ($value:expr, $a:ident => $body:expr) => {
        match $value {
            DataArray::U8($a) => $body,
            DataArray::U16($a) => $body,
            DataArray::U32($a) => $body,
            DataArray::U64($a) => $body,
            DataArray::I32($a) => $body,
            DataArray::I64($a) => $body,
            DataArray::F32($a) => $body,
            DataArray::F64($a) => $body,
        }
    };
}

/// Like `with_array!`, rewrapping the result in the same variant.
macro_rules! map_array {
    ($value:expr, $a:ident => $body:expr) => {
        match $value {
            DataArray::U8($a) => DataArray::U8($body),
            DataArray::U16($a) => DataArray::U16($body),
            DataArray::U32($a) => DataArray::U32($body),
            DataArray::U64($a) => DataArray::U64($body),
            DataArray::I32($a) => DataArray::I32($body),
            DataArray::I64($a) => DataArray::I64($body),
            DataArray::F32($a) => DataArray::F32($body),
            DataArray::F64($a) => DataArray::F64($body),
        }
    };
}

fn filled<T: Element>(shape: &[usize], value: f64) -> ArrayD<T> {
    ArrayD::from_elem(IxDyn(shape), T::from_f64(value))
}

fn slice_owned<T: Element>(array: &ArrayD<T>, bounds: &[(usize, usize)]) -> ArrayD<T> {
    array
        .slice_each_axis(|ax| {
            let (start, stop) = bounds[ax.axis.index()];
            Slice::from(start..stop)
        })
        .to_owned()
}

fn fill_region<T: Element>(array: &mut ArrayD<T>, bounds: &[(usize, usize)], value: f64) {
    array
        .slice_each_axis_mut(|ax| {
            let (start, stop) = bounds[ax.axis.index()];
            Slice::from(start..stop)
        })
        .fill(T::from_f64(value));
}

fn collapse<T: Element>(mut array: ArrayD<T>, axes: &[usize]) -> ArrayD<T> {
    for &axis in axes.iter().rev() {
        array = array.index_axis_move(Axis(axis), 0);
    }
    array
}

fn plane<T: Element, U>(array: &ArrayD<T>, f: impl Fn(T) -> U) -> Result<Array2<U>, DataError> {
    array
        .mapv(f)
        .into_dimensionality::<Ix2>()
        .map_err(|e| DataError::Shape(e.to_string()))
}

impl DataArray {
    /// An array of `shape` with every element set to `value` (cast to `dtype`).
    pub fn filled(dtype: DType, shape: &[usize], value: f64) -> Self {
        match dtype {
            DType::U8 => DataArray::U8(filled(shape, value)),
            DType::U16 => DataArray::U16(filled(shape, value)),
            DType::U32 => DataArray::U32(filled(shape, value)),
            DType::U64 => DataArray::U64(filled(shape, value)),
            DType::I32 => DataArray::I32(filled(shape, value)),
            DType::I64 => DataArray::I64(filled(shape, value)),
            DType::F32 => DataArray::F32(filled(shape, value)),
            DType::F64 => DataArray::F64(filled(shape, value)),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            DataArray::U8(_) => DType::U8,
            DataArray::U16(_) => DType::U16,
            DataArray::U32(_) => DType::U32,
            DataArray::U64(_) => DType::U64,
            DataArray::I32(_) => DType::I32,
            DataArray::I64(_) => DType::I64,
            DataArray::F32(_) => DType::F32,
            DataArray::F64(_) => DType::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_array!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn len(&self) -> usize {
        with_array!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out the region selected by `slicing`.
    pub fn slice(&self, slicing: &Slicing) -> Result<DataArray, DataError> {
        let bounds = slicing.resolve(self.shape())?;
        Ok(map_array!(self, a => slice_owned(a, &bounds)))
    }

    /// Overwrite the region selected by `slicing` with `value`.
    pub fn fill(&mut self, slicing: &Slicing, value: f64) -> Result<(), DataError> {
        let bounds = slicing.resolve(self.shape())?;
        with_array!(self, a => fill_region(a, &bounds, value));
        Ok(())
    }

    /// Drop the given axes, each of which must have length 1.
    pub fn collapse_axes(self, axes: &[usize]) -> Result<DataArray, DataError> {
        let mut sorted = axes.to_vec();
        sorted.sort_unstable();
        for &axis in &sorted {
            match self.shape().get(axis) {
                Some(1) => {}
                _ => {
                    return Err(DataError::Shape(format!(
                        "cannot collapse axis {axis} of shape {:?}",
                        self.shape()
                    )))
                }
            }
        }
        Ok(map_array!(self, a => collapse(a, &sorted)))
    }

    /// Reverse axis order (a transpose for 2-D arrays).
    pub fn reversed_axes(self) -> DataArray {
        map_array!(self, a => a.reversed_axes())
    }

    /// Down-cast 64-bit integers to 32 bits; other dtypes pass through.
    pub fn narrowed(self) -> DataArray {
        match self {
            DataArray::U64(a) => {
                warn!("Down-casting uint64 data to uint32 for display");
                DataArray::U32(a.mapv(|v| v as u32))
            }
            DataArray::I64(a) => {
                warn!("Down-casting int64 data to int32 for display");
                DataArray::I32(a.mapv(|v| v as i32))
            }
            other => other,
        }
    }

    /// View a 2-D array as floating point values.
    pub fn to_f64_plane(&self) -> Result<Array2<f64>, DataError> {
        with_array!(self, a => plane(a, |v| v.to_f64()))
    }

    /// View a 2-D array as integer labels.
    pub fn to_i64_plane(&self) -> Result<Array2<i64>, DataError> {
        with_array!(self, a => plane(a, |v| v.to_i64()))
    }
}

impl MemorySize for DataArray {
    fn memory_size(&self) -> usize {
        self.len() * self.dtype().size()
    }
}
