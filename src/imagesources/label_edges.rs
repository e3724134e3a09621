use std::sync::Arc;

use image::{Rgba, RgbaImage};
use ndarray::Array2;

use crate::geometry::IntRect;
use crate::slicing::SliceSource;

use super::{core_builders, delegate_core, plane_dims, ImageRequest, ImageSource, SourceCore};

const EDGE_DEFAULT: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Outlines the boundaries between labels.
///
/// A pixel is on an edge when its label differs from its right or lower
/// neighbour. Edge pixels take the label's color from the table (modulo
/// its length); everything else is transparent.
pub struct LabelEdgesImageSource {
    core: SourceCore,
    slice: Arc<SliceSource>,
    table: Arc<[Rgba<u8>]>,
}

impl LabelEdgesImageSource {
    pub fn new(slice: Arc<SliceSource>, table: Vec<Rgba<u8>>) -> Self {
        Self {
            core: SourceCore::new(std::slice::from_ref(&slice)),
            slice,
            table: table.into(),
        }
    }

    core_builders!();
}

pub(crate) fn render(labels: &Array2<i64>, table: &[Rgba<u8>]) -> RgbaImage {
    let (w, h) = plane_dims(labels);
    RgbaImage::from_fn(w, h, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let label = labels[[x, y]];
        let right = labels.get([x + 1, y]).is_some_and(|&l| l != label);
        let below = labels.get([x, y + 1]).is_some_and(|&l| l != label);
        if !(right || below) {
            return TRANSPARENT;
        }
        if table.is_empty() {
            EDGE_DEFAULT
        } else {
            table[label.rem_euclid(table.len() as i64) as usize]
        }
    })
}

impl ImageSource for LabelEdgesImageSource {
    delegate_core!();

    fn request(&self, rect: IntRect, along_through: Option<&[usize]>) -> ImageRequest {
        let request = match self.slice.request(rect, along_through) {
            Ok(request) => request,
            Err(e) => return ImageRequest::ready(Err(e.into())),
        };
        let table = self.table.clone();
        ImageRequest::new(async move {
            let labels = request.wait().await?.narrowed().to_i64_plane()?;
            Ok(render(&labels, &table))
        })
    }

    fn is_opaque(&self) -> bool {
        false
    }
}
