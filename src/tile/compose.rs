//! Back-to-front blending of layer tiles into one composite.

use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::geometry::{Affine, Point};
use crate::tiling::TileRects;

/// Where each composite pixel samples layer images.
///
/// Composites cover the tile's scene `image_rect`; layer images cover its
/// `data_image_rect`. Pixel centres are mapped back to data space and
/// sampled nearest-neighbour.
pub(crate) struct Placement {
    width: u32,
    height: u32,
    lookup: Vec<Option<(u32, u32)>>,
}

impl Placement {
    pub fn new(rects: &TileRects, scene2data: Affine) -> Self {
        let image_rect = rects.image_rect;
        let data = rects.data_image_rect;
        let width = image_rect.width().ceil().max(0.0) as u32;
        let height = image_rect.height().ceil().max(0.0) as u32;

        let mut lookup = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let scene = Point::new(
                    image_rect.x0 + x as f64 + 0.5,
                    image_rect.y0 + y as f64 + 0.5,
                );
                let p = scene2data * scene;
                let dx = p.x.floor() as i64 - data.x;
                let dy = p.y.floor() as i64 - data.y;
                let inside = dx >= 0 && dy >= 0 && dx < data.width && dy < data.height;
                lookup.push(inside.then_some((dx as u32, dy as u32)));
            }
        }

        Self {
            width,
            height,
            lookup,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Blend `layers` (bottom first, each with its opacity) over `background`.
///
/// Colors are straight (non-premultiplied) RGBA and are combined with the
/// "source over" operator.
pub(crate) fn compose(
    placement: &Placement,
    background: [u8; 4],
    layers: &[(Arc<RgbaImage>, f64)],
) -> RgbaImage {
    let bg = background.map(|c| c as f32 / 255.0);
    let mut acc = vec![bg; placement.lookup.len()];

    for (image, opacity) in layers {
        let opacity = opacity.clamp(0.0, 1.0) as f32;
        if opacity == 0.0 {
            continue;
        }
        for (dst, sample) in acc.iter_mut().zip(&placement.lookup) {
            let Some((sx, sy)) = *sample else { continue };
            let Some(src) = image.get_pixel_checked(sx, sy) else {
                continue;
            };
            blend_over(dst, src, opacity);
        }
    }

    let mut out = RgbaImage::new(placement.width, placement.height);
    for (pixel, value) in out.pixels_mut().zip(&acc) {
        *pixel = Rgba(value.map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8));
    }
    out
}

fn blend_over(dst: &mut [f32; 4], src: &Rgba<u8>, opacity: f32) {
    let sa = src[3] as f32 / 255.0 * opacity;
    if sa <= 0.0 {
        return;
    }
    let da = dst[3];
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let s = src[c] as f32 / 255.0;
        dst[c] = (s * sa + dst[c] * da * (1.0 - sa)) / out_a;
    }
    dst[3] = out_a;
}
