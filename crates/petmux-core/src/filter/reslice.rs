//! Reslicing a volume onto another grid without registration.

use burn::tensor::backend::Backend;
use tracing::debug;

use super::resample::ResampleImageFilter;
use crate::error::Result;
use crate::image::{Image, ImageGeometry, VolumeKind};
use crate::interpolation::{LinearInterpolator, NearestNeighborInterpolator};
use crate::spatial::GEOMETRY_TOLERANCE;
use crate::transform::{IdentityTransform, Transform, TranslationTransform};

/// How the source grid is placed relative to the target grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResliceAlignment {
    /// Use physical coordinates as they are (same scanner frame).
    Physical,
    /// Align the geometric centres when the two grids differ.
    CentersIfDiffer,
}

/// Resample `image` onto `reference`.
///
/// Labels use nearest neighbour, intensities use linear interpolation.
/// Voxels outside the source field of view become zero.
pub fn reslice_identity<B: Backend>(
    reference: &ImageGeometry,
    image: &Image<B>,
    kind: VolumeKind,
    alignment: ResliceAlignment,
) -> Result<Image<B>> {
    if reference.approx_eq(image.geometry(), GEOMETRY_TOLERANCE) {
        debug!("Geometries match, reslice is a copy");
        return Ok(image.clone());
    }

    match alignment {
        ResliceAlignment::Physical => apply(reference, image, kind, IdentityTransform),
        ResliceAlignment::CentersIfDiffer => {
            let transform = TranslationTransform::aligning_centers(reference, image.geometry());
            debug!(translation = ?transform.translation(), "Aligning grid centres");
            apply(reference, image, kind, transform)
        }
    }
}

fn apply<B, T>(reference: &ImageGeometry, image: &Image<B>, kind: VolumeKind, transform: T) -> Result<Image<B>>
where
    B: Backend,
    T: Transform<B>,
{
    match kind {
        VolumeKind::Label => {
            ResampleImageFilter::new(*reference, transform, NearestNeighborInterpolator::new()).apply(image)
        }
        VolumeKind::Intensity => {
            ResampleImageFilter::new(*reference, transform, LinearInterpolator::new()).apply(image)
        }
    }
}
