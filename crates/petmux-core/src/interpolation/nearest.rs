//! Nearest neighbour interpolation.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::Interpolator;

/// Nearest neighbour interpolator.
///
/// Returns the value of the closest voxel, so label ids are never blended.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighborInterpolator;

impl NearestNeighborInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for NearestNeighborInterpolator {
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [d0, d1, d2] = data.dims(); // Z, Y, X

        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.clone().narrow(1, 1, 1).squeeze::<1>(1);
        let z = indices.narrow(1, 2, 1).squeeze::<1>(1);

        let x_i = x.round().clamp(0.0, (d2 - 1) as f64).int();
        let y_i = y.round().clamp(0.0, (d1 - 1) as f64).int();
        let z_i = z.round().clamp(0.0, (d0 - 1) as f64).int();

        let stride_z = (d1 * d2) as i32;
        let stride_y = d2 as i32;

        let idx = z_i * stride_z + y_i * stride_y + x_i;
        data.clone().reshape([d0 * d1 * d2]).gather(0, idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_nearest_rounds_to_closest_voxel() {
        let device = Default::default();
        // z=0: [[0, 1], [2, 3]], z=1: [[4, 5], [6, 7]]
        let data = Tensor::<TestBackend, 3>::from_floats(
            [[[0.0, 1.0], [2.0, 3.0]], [[4.0, 5.0], [6.0, 7.0]]],
            &device,
        );
        let indices = Tensor::<TestBackend, 2>::from_floats(
            [[0.4, 0.4, 0.4], [0.6, 0.0, 0.0], [1.0, 1.0, 1.0], [0.0, 0.6, 0.6]],
            &device,
        );
        let values = NearestNeighborInterpolator::new()
            .interpolate(&data, indices)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(values, vec![0.0, 1.0, 7.0, 6.0]);
    }

    #[test]
    fn test_nearest_clamps_outside_grid() {
        let device = Default::default();
        let data = Tensor::<TestBackend, 3>::from_floats([[[1.0, 2.0]]], &device);
        let indices = Tensor::<TestBackend, 2>::from_floats([[-3.0, 0.0, 0.0], [9.0, 0.0, 0.0]], &device);
        let values = NearestNeighborInterpolator::new()
            .interpolate(&data, indices)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(values, vec![1.0, 2.0]);
    }
}
