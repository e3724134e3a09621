use std::sync::Arc;

use image::{Rgba, RgbaImage};
use ndarray::Array2;

use crate::geometry::IntRect;
use crate::slicing::SliceSource;

use super::{
    core_builders, delegate_core, plane_dims, ImageRequest, ImageSource, Normalize, SourceCore,
};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Looks values up in a color table.
///
/// Without a normalization range the value is used as an index modulo the
/// table length. With one, the range is spread over the whole table.
pub struct ColortableImageSource {
    core: SourceCore,
    slice: Arc<SliceSource>,
    table: Arc<[Rgba<u8>]>,
    normalize: Option<Normalize>,
    zero_transparent: bool,
}

impl ColortableImageSource {
    pub fn new(
        slice: Arc<SliceSource>,
        table: Vec<Rgba<u8>>,
        normalize: Option<Normalize>,
        zero_transparent: bool,
    ) -> Self {
        Self {
            core: SourceCore::new(std::slice::from_ref(&slice)),
            slice,
            table: table.into(),
            normalize,
            zero_transparent,
        }
    }

    core_builders!();

    pub fn table(&self) -> &[Rgba<u8>] {
        &self.table
    }
}

/// Table index for `value`, or `None` for an empty table.
pub(crate) fn lookup(value: f64, len: usize, normalize: Option<Normalize>) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let index = match normalize {
        Some(n) => (n.fraction(value) * (len - 1) as f64).round() as usize,
        None => (value as i64).rem_euclid(len as i64) as usize,
    };
    Some(index.min(len - 1))
}

pub(crate) fn render(
    plane: &Array2<f64>,
    table: &[Rgba<u8>],
    normalize: Option<Normalize>,
    zero_transparent: bool,
) -> RgbaImage {
    let (w, h) = plane_dims(plane);
    RgbaImage::from_fn(w, h, |x, y| {
        let value = plane[[x as usize, y as usize]];
        if zero_transparent && value == 0.0 {
            return TRANSPARENT;
        }
        lookup(value, table.len(), normalize).map_or(TRANSPARENT, |i| table[i])
    })
}

impl ImageSource for ColortableImageSource {
    delegate_core!();

    fn request(&self, rect: IntRect, along_through: Option<&[usize]>) -> ImageRequest {
        let request = match self.slice.request(rect, along_through) {
            Ok(request) => request,
            Err(e) => return ImageRequest::ready(Err(e.into())),
        };
        let table = self.table.clone();
        let normalize = self.normalize;
        let zero_transparent = self.zero_transparent;
        ImageRequest::new(async move {
            let plane = request.wait().await?.narrowed().to_f64_plane()?;
            Ok(render(&plane, &table, normalize, zero_transparent))
        })
    }

    fn is_opaque(&self) -> bool {
        !self.zero_transparent
            && !self.table.is_empty()
            && self.table.iter().all(|color| color[3] == 255)
    }
}
