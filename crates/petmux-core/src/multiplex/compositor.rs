//! RGB composition of normalised tracer volumes.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::channel::{Channel, ChannelAssignment};
use crate::error::{CoreError, Result};
use crate::image::{Image, ImageGeometry};

/// Weights for collapsing an RGB composite into grayscale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LumaWeights {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl Default for LumaWeights {
    fn default() -> Self {
        Self {
            red: 0.299,
            green: 0.587,
            blue: 0.114,
        }
    }
}

impl LumaWeights {
    pub fn weight(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Red => self.red,
            Channel::Green => self.green,
            Channel::Blue => self.blue,
        }
    }
}

/// Three-channel image sharing a single geometry.
///
/// Channel values lie in `0..=255`.
#[derive(Debug, Clone)]
pub struct Composite<B: Backend> {
    channels: [Tensor<B, 3>; 3],
    geometry: ImageGeometry,
}

impl<B: Backend> Composite<B> {
    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    pub fn channel(&self, channel: Channel) -> &Tensor<B, 3> {
        &self.channels[channel.index()]
    }

    /// Weighted grayscale image of the composite.
    pub fn luminance(&self, weights: &LumaWeights) -> Result<Image<B>> {
        let gray = Channel::ALL
            .into_iter()
            .map(|channel| self.channel(channel).clone() * weights.weight(channel))
            .reduce(|acc, plane| acc + plane)
            .ok_or_else(|| CoreError::tensor_data("composite has no channels"))?;
        Image::from_geometry(gray, self.geometry)
    }

    /// Interleaved RGB triples in `[Z, Y, X]` row-major order.
    pub fn to_rgb_voxels(&self) -> Result<Vec<[u8; 3]>> {
        let mut planes = Vec::with_capacity(3);
        for channel in Channel::ALL {
            let voxels = self
                .channel(channel)
                .clone()
                .into_data()
                .convert::<f32>()
                .to_vec::<f32>()
                .map_err(|e| CoreError::tensor_data(format!("{e:?}")))?;
            planes.push(voxels);
        }

        let to_u8 = |v: f32| v.round().clamp(0.0, 255.0) as u8;
        Ok((0..self.geometry.voxel_count())
            .map(|i| [to_u8(planes[0][i]), to_u8(planes[1][i]), to_u8(planes[2][i])])
            .collect())
    }
}

/// Min-max normalise a volume to `[0, 1]` over its own full extent.
///
/// A constant volume normalises to zeros.
pub fn normalize_unit<B: Backend>(image: &Image<B>) -> Result<Image<B>> {
    let data = image.data().clone();
    let min = data.clone().min().into_scalar().elem::<f64>();
    let max = data.clone().max().into_scalar().elem::<f64>();
    let range = max - min;

    if range <= f64::EPSILON {
        debug!(min, max, "Constant volume, normalised to zeros");
        return Ok(Image::zeros(*image.geometry(), &image.device()));
    }
    image.with_data((data - min) / range)
}

/// Place each assigned volume on its channel.
///
/// `volumes[i]` belongs to the i-th entry of `assignment`. Every volume is
/// normalised on its own, scaled to `0..=255`, and unassigned channels are
/// zero. All volumes must share the grid of the first.
pub fn compose<B: Backend>(volumes: &[Image<B>], assignment: &ChannelAssignment) -> Result<Composite<B>> {
    if volumes.is_empty() || volumes.len() > Channel::ALL.len() {
        return Err(CoreError::ChannelCount(volumes.len()));
    }
    if volumes.len() != assignment.len() {
        return Err(CoreError::ChannelCount(assignment.len()));
    }

    let reference = &volumes[0];
    let shape = reference.shape();
    let device = reference.device();
    let mut channels = [
        Tensor::<B, 3>::zeros(shape, &device),
        Tensor::<B, 3>::zeros(shape, &device),
        Tensor::<B, 3>::zeros(shape, &device),
    ];

    for (volume, (tracer, channel)) in volumes.iter().zip(assignment.entries()) {
        if volume.shape() != shape {
            return Err(CoreError::shape_mismatch(shape, volume.shape()));
        }
        debug!(tracer = %tracer, channel = %channel, "Placing tracer on channel");
        channels[channel.index()] = normalize_unit(volume)?.into_data() * 255.0;
    }

    Ok(Composite {
        channels,
        geometry: *reference.geometry(),
    })
}
