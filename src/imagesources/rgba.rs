use std::sync::Arc;

use image::{Rgba, RgbaImage};
use ndarray::Array2;

use crate::error::{DataError, RegistrationError};
use crate::geometry::IntRect;
use crate::slicing::{SliceRequest, SliceSource};

use super::{
    core_builders, delegate_core, to_byte, ImageRequest, ImageSource, Normalize, SourceCore,
};

/// Where one output channel of an [`RgbaImageSource`] comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RgbaChannel {
    /// Read from the next slice source.
    Data { normalize: Option<Normalize> },
    /// A placeholder value for every pixel.
    Constant(u8),
}

impl RgbaChannel {
    pub fn is_data(&self) -> bool {
        matches!(self, RgbaChannel::Data { .. })
    }
}

/// Combines up to four slices into red, green, blue and alpha.
pub struct RgbaImageSource {
    core: SourceCore,
    channels: [RgbaChannel; 4],
    /// One slice per `Data` channel, in channel order
    slices: Vec<Arc<SliceSource>>,
}

impl RgbaImageSource {
    /// `slices` must hold exactly one source per `Data` channel.
    pub fn new(
        channels: [RgbaChannel; 4],
        slices: Vec<Arc<SliceSource>>,
    ) -> Result<Self, RegistrationError> {
        let expected = channels.iter().filter(|c| c.is_data()).count();
        if slices.len() != expected {
            return Err(RegistrationError::SourceCount {
                kind: "rgba",
                expected,
                actual: slices.len(),
            });
        }
        Ok(Self {
            core: SourceCore::new(&slices),
            channels,
            slices,
        })
    }

    core_builders!();

    pub fn channels(&self) -> &[RgbaChannel; 4] {
        &self.channels
    }
}

enum Plane {
    Data(Array2<f64>, Option<Normalize>),
    Constant(u8),
}

fn render(planes: &[Plane; 4], w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        let sample = |plane: &Plane| match plane {
            Plane::Data(values, normalize) => to_byte(values[[x as usize, y as usize]], *normalize),
            Plane::Constant(value) => *value,
        };
        Rgba([
            sample(&planes[0]),
            sample(&planes[1]),
            sample(&planes[2]),
            sample(&planes[3]),
        ])
    })
}

impl ImageSource for RgbaImageSource {
    delegate_core!();

    fn request(&self, rect: IntRect, along_through: Option<&[usize]>) -> ImageRequest {
        let requests: Result<Vec<SliceRequest>, _> = self
            .slices
            .iter()
            .map(|slice| slice.request(rect, along_through))
            .collect();
        let requests = match requests {
            Ok(requests) => requests,
            Err(e) => return ImageRequest::ready(Err(e.into())),
        };
        let channels = self.channels;
        let w = rect.width.max(0) as usize;
        let h = rect.height.max(0) as usize;

        ImageRequest::new(async move {
            let mut requests = requests.into_iter();
            let mut planes = Vec::with_capacity(4);
            for channel in channels {
                let plane = match channel {
                    RgbaChannel::Data { normalize } => {
                        let request = requests.next().ok_or_else(|| {
                            DataError::Shape("missing slice for data channel".into())
                        })?;
                        let values = request.wait().await?.narrowed().to_f64_plane()?;
                        if values.dim() != (w, h) {
                            return Err(DataError::Shape(format!(
                                "channel plane is {:?}, expected {:?}",
                                values.dim(),
                                (w, h)
                            )));
                        }
                        Plane::Data(values, normalize)
                    }
                    RgbaChannel::Constant(value) => Plane::Constant(value),
                };
                planes.push(plane);
            }
            let planes: [Plane; 4] = planes
                .try_into()
                .map_err(|_| DataError::Shape("expected four channels".into()))?;
            Ok(render(&planes, w as u32, h as u32))
        })
    }

    fn is_opaque(&self) -> bool {
        self.channels[3] == RgbaChannel::Constant(255)
    }
}
