//! Translation transform implementation.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::trait_::Transform;
use crate::image::ImageGeometry;
use crate::spatial::Vector3;

/// Translates points by a fixed offset vector (mm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslationTransform {
    translation: Vector3,
}

impl TranslationTransform {
    pub fn new(translation: Vector3) -> Self {
        Self { translation }
    }

    /// Translation that maps the centre of `output` onto the centre of `input`.
    ///
    /// Used to pull `input` voxels onto the `output` grid when the two grids
    /// describe the same anatomy with unrelated origins.
    pub fn aligning_centers(output: &ImageGeometry, input: &ImageGeometry) -> Self {
        Self::new(input.center() - output.center())
    }

    pub fn translation(&self) -> &Vector3 {
        &self.translation
    }
}

impl<B: Backend> Transform<B> for TranslationTransform {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let offset: Vec<f32> = self.translation.iter().map(|&v| v as f32).collect();
        let t = Tensor::<B, 1>::from_data(TensorData::new(offset, Shape::new([3])), &device).reshape([1, 3]);
        points + t
    }
}
