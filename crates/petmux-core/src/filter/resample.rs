//! Resample image filter.
//!
//! Resamples an image onto a new grid by mapping every output voxel through
//! a transform into the input image and interpolating there.

use std::marker::PhantomData;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::error::Result;
use crate::image::grid::generate_grid;
use crate::image::image::geometry_index_to_world;
use crate::image::{Image, ImageGeometry};
use crate::interpolation::Interpolator;
use crate::transform::Transform;

/// Resample image filter.
///
/// The transform maps Output Physical Space -> Input Physical Space.
/// Output voxels whose source position falls outside the input grid are zero.
pub struct ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B>,
    I: Interpolator<B>,
{
    geometry: ImageGeometry,
    transform: T,
    interpolator: I,
    _phantom: PhantomData<B>,
}

impl<B, T, I> ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B>,
    I: Interpolator<B>,
{
    /// Create a new resample filter producing images on `geometry`.
    pub fn new(geometry: ImageGeometry, transform: T, interpolator: I) -> Self {
        Self {
            geometry,
            transform,
            interpolator,
            _phantom: PhantomData,
        }
    }

    /// Apply filter to an input image.
    pub fn apply(&self, input: &Image<B>) -> Result<Image<B>> {
        let device = input.device();
        let shape = self.geometry.tensor_shape();

        let output_indices = generate_grid::<B>(shape, &device);
        let output_points = geometry_index_to_world(&self.geometry, output_indices);
        let input_points = self.transform.transform_points(output_points);
        let input_indices = input.world_to_index_tensor(input_points)?;

        let inside = Self::inside_mask(input.geometry(), input_indices.clone());
        let sampled = self.interpolator.interpolate(input.data(), input_indices);

        let values = sampled * inside;

        Image::from_geometry(values.reshape(shape), self.geometry)
    }

    /// 1.0 where the continuous index lies within half a voxel of the grid.
    fn inside_mask(geometry: &ImageGeometry, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let mut mask = Tensor::<B, 1>::ones([indices.dims()[0]], &indices.device());
        for (axis, &n) in geometry.size().iter().enumerate() {
            let coord = indices.clone().narrow(1, axis, 1).squeeze::<1>(1);
            let lower = coord.clone().greater_equal_elem(-0.5).float();
            let upper = coord.lower_equal_elem(n as f64 - 0.5).float();
            mask = mask * lower * upper;
        }
        mask
    }
}
