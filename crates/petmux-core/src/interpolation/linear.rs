//! Trilinear interpolation.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::trait_::Interpolator;

/// Linear interpolator (trilinear over `[Z, Y, X]` volumes).
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    /// Weighted sum over the eight neighbouring voxels; neighbours past the
    /// last voxel of an axis are clamped onto it.
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [nz, ny, nx] = data.dims();
        let points = indices.dims()[0];
        let device = indices.device();
        let flat = data.clone().reshape([nz * ny * nx]);
        let strides = [1, nx as i32, (nx * ny) as i32];

        // (lower neighbour, upper neighbour, weight of the upper one) for x, y, z
        let axes: Vec<(Tensor<B, 1, Int>, Tensor<B, 1, Int>, Tensor<B, 1>)> = [nx, ny, nz]
            .into_iter()
            .enumerate()
            .map(|(axis, n)| {
                let last = (n - 1) as f64;
                let coord = indices.clone().narrow(1, axis, 1).squeeze::<1>(1);
                let lower = coord.clone().floor();
                let weight = coord - lower.clone();
                let upper = (lower.clone() + 1.0).clamp(0.0, last).int();
                (lower.clamp(0.0, last).int(), upper, weight)
            })
            .collect();

        let mut result = Tensor::<B, 1>::zeros([points], &device);
        for corner in 0..8usize {
            let mut offset = Tensor::<B, 1, Int>::zeros([points], &device);
            let mut weight = Tensor::<B, 1>::ones([points], &device);
            for (axis, (lower, upper, upper_weight)) in axes.iter().enumerate() {
                if (corner >> axis) & 1 == 1 {
                    offset = offset + upper.clone() * strides[axis];
                    weight = weight * upper_weight.clone();
                } else {
                    offset = offset + lower.clone() * strides[axis];
                    weight = weight * (upper_weight.clone().neg() + 1.0);
                }
            }
            result = result + flat.clone().gather(0, offset) * weight;
        }
        result
    }
}
