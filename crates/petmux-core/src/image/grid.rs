use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

/// Generate a grid of continuous indices for a `[Z, Y, X]` tensor shape.
///
/// Returns a tensor of shape `[N, 3]` with rows `(x, y, z)`, ordered so that
/// row `i` corresponds to flat offset `i` of the volume.
pub fn generate_grid<B: Backend>(shape: [usize; 3], device: &B::Device) -> Tensor<B, 2> {
    let [d, h, w] = shape;
    let total = d * h * w;

    let mut grid = Vec::with_capacity(total * 3);
    for z in 0..d {
        for y in 0..h {
            for x in 0..w {
                grid.push(x as f32);
                grid.push(y as f32);
                grid.push(z as f32);
            }
        }
    }

    Tensor::<B, 1>::from_data(TensorData::new(grid, Shape::new([total * 3])), device)
        .reshape([total, 3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_grid_rows_follow_flat_order() {
        let device = Default::default();
        let grid = generate_grid::<TestBackend>([2, 1, 3], &device);
        assert_eq!(grid.dims(), [6, 3]);

        let values = grid.into_data().to_vec::<f32>().unwrap();
        // row 4: flat offset 4 -> z=1, y=0, x=1
        assert_eq!(&values[12..15], &[1.0, 0.0, 1.0]);
    }
}
