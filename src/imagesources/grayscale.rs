use std::sync::Arc;

use image::{Rgba, RgbaImage};
use ndarray::Array2;

use crate::geometry::IntRect;
use crate::slicing::SliceSource;

use super::{
    core_builders, delegate_core, plane_dims, to_byte, ImageRequest, ImageSource, Normalize,
    SourceCore,
};

/// Renders one channel as opaque gray.
pub struct GrayscaleImageSource {
    core: SourceCore,
    slice: Arc<SliceSource>,
    normalize: Option<Normalize>,
}

impl GrayscaleImageSource {
    pub fn new(slice: Arc<SliceSource>, normalize: Option<Normalize>) -> Self {
        Self {
            core: SourceCore::new(std::slice::from_ref(&slice)),
            slice,
            normalize,
        }
    }

    core_builders!();
}

pub(crate) fn render(plane: &Array2<f64>, normalize: Option<Normalize>) -> RgbaImage {
    let (w, h) = plane_dims(plane);
    RgbaImage::from_fn(w, h, |x, y| {
        let g = to_byte(plane[[x as usize, y as usize]], normalize);
        Rgba([g, g, g, 255])
    })
}

impl ImageSource for GrayscaleImageSource {
    delegate_core!();

    fn request(&self, rect: IntRect, along_through: Option<&[usize]>) -> ImageRequest {
        let request = match self.slice.request(rect, along_through) {
            Ok(request) => request,
            Err(e) => return ImageRequest::ready(Err(e.into())),
        };
        let normalize = self.normalize;
        ImageRequest::new(async move {
            let plane = request.wait().await?.narrowed().to_f64_plane()?;
            Ok(render(&plane, normalize))
        })
    }

    fn is_opaque(&self) -> bool {
        true
    }
}
