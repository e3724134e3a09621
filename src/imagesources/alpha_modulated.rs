use std::sync::Arc;

use image::{Rgba, RgbaImage};
use ndarray::Array2;

use crate::geometry::IntRect;
use crate::slicing::SliceSource;

use super::{
    core_builders, delegate_core, plane_dims, to_byte, ImageRequest, ImageSource, Normalize,
    SourceCore,
};

/// A fixed tint whose alpha follows the data.
pub struct AlphaModulatedImageSource {
    core: SourceCore,
    slice: Arc<SliceSource>,
    tint: [u8; 3],
    normalize: Option<Normalize>,
}

impl AlphaModulatedImageSource {
    pub fn new(slice: Arc<SliceSource>, tint: [u8; 3], normalize: Option<Normalize>) -> Self {
        Self {
            core: SourceCore::new(std::slice::from_ref(&slice)),
            slice,
            tint,
            normalize,
        }
    }

    core_builders!();
}

pub(crate) fn render(plane: &Array2<f64>, tint: [u8; 3], normalize: Option<Normalize>) -> RgbaImage {
    let (w, h) = plane_dims(plane);
    let [r, g, b] = tint;
    RgbaImage::from_fn(w, h, |x, y| {
        Rgba([r, g, b, to_byte(plane[[x as usize, y as usize]], normalize)])
    })
}

impl ImageSource for AlphaModulatedImageSource {
    delegate_core!();

    fn request(&self, rect: IntRect, along_through: Option<&[usize]>) -> ImageRequest {
        let request = match self.slice.request(rect, along_through) {
            Ok(request) => request,
            Err(e) => return ImageRequest::ready(Err(e.into())),
        };
        let tint = self.tint;
        let normalize = self.normalize;
        ImageRequest::new(async move {
            let plane = request.wait().await?.narrowed().to_f64_plane()?;
            Ok(render(&plane, tint, normalize))
        })
    }

    fn is_opaque(&self) -> bool {
        false
    }
}
