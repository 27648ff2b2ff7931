//! Per-label agreement between label volumes on a shared grid.
//!
//! Overlap measures count voxels with tensor reductions. The Hausdorff
//! distance is computed on the host in physical units, from every voxel of
//! one label to the boundary voxels of the other.

use std::collections::BTreeSet;

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::image::Image;
use crate::mask::labels::label_values;

/// Agreement of one label, plus intensity statistics under the compared label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMetrics {
    pub label: u8,
    pub dice: f64,
    pub jaccard: f64,
    /// `2 (|R| - |C|) / (|R| + |C|)` for reference `R` and compared `C`.
    pub volume_similarity: f64,
    /// Symmetric Hausdorff distance in mm; `None` when one side has no voxels.
    pub hausdorff_distance: Option<f64>,
    pub intensity_total: f64,
    pub intensity_mean: f64,
    /// Sample standard deviation; 0 for fewer than two voxels.
    pub intensity_std: f64,
}

fn label_plane<B: Backend>(mask: &Tensor<B, 3>, label: u8) -> Tensor<B, 3> {
    mask.clone().round().equal_elem(label as f32).float()
}

fn total<B: Backend>(tensor: Tensor<B, 3>) -> f64 {
    tensor.sum().into_scalar().elem::<f64>()
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Compare `label` between `reference` and `compared`, and summarise
/// `intensity` over the compared label.
pub fn evaluate_label<B: Backend>(
    reference: &Image<B>,
    compared: &Image<B>,
    intensity: &Image<B>,
    label: u8,
) -> Result<LabelMetrics> {
    let shape = reference.shape();
    for other in [compared, intensity] {
        if other.shape() != shape {
            return Err(CoreError::shape_mismatch(shape, other.shape()));
        }
    }

    let in_reference = label_plane(reference.data(), label);
    let in_compared = label_plane(compared.data(), label);
    let reference_count = total(in_reference.clone());
    let compared_count = total(in_compared.clone());
    let overlap = total(in_reference * in_compared.clone());
    let union = reference_count + compared_count - overlap;

    let values = intensity.data().clone();
    let intensity_total = total(values.clone() * in_compared.clone());
    let intensity_mean = ratio(intensity_total, compared_count);
    let intensity_std = if compared_count > 1.0 {
        let centred = (values - intensity_mean) * in_compared;
        (total(centred.clone() * centred) / (compared_count - 1.0)).sqrt()
    } else {
        0.0
    };

    Ok(LabelMetrics {
        label,
        dice: ratio(2.0 * overlap, reference_count + compared_count),
        jaccard: ratio(overlap, union),
        volume_similarity: ratio(2.0 * (reference_count - compared_count), reference_count + compared_count),
        hausdorff_distance: hausdorff_distance(reference, compared, label)?,
        intensity_total,
        intensity_mean,
        intensity_std,
    })
}

/// [`evaluate_label`] for every label present in either mask, in id order.
pub fn evaluate_labels<B: Backend>(
    reference: &Image<B>,
    compared: &Image<B>,
    intensity: &Image<B>,
) -> Result<Vec<LabelMetrics>> {
    let labels: BTreeSet<u8> = label_values(reference)?
        .union(&label_values(compared)?)
        .copied()
        .collect();
    labels
        .into_iter()
        .map(|label| evaluate_label(reference, compared, intensity, label))
        .collect()
}

/// Voxels of one label: membership by flat offset, all points, boundary points.
struct LabelVoxels {
    inside: Vec<bool>,
    points: Vec<[f64; 3]>,
    boundary: Vec<[f64; 3]>,
}

impl LabelVoxels {
    fn collect(voxels: &[f32], size: [usize; 3], spacing: [f64; 3], label: u8) -> Self {
        let [nx, ny, nz] = size;
        let inside: Vec<bool> = voxels.iter().map(|&v| v.round() == label as f32).collect();
        let at = |x: usize, y: usize, z: usize| inside[(z * ny + y) * nx + x];

        let mut points = Vec::new();
        let mut boundary = Vec::new();
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    if !at(x, y, z) {
                        continue;
                    }
                    let point = [x as f64 * spacing[0], y as f64 * spacing[1], z as f64 * spacing[2]];
                    let edge = x == 0 || y == 0 || z == 0 || x + 1 == nx || y + 1 == ny || z + 1 == nz;
                    let exposed = edge
                        || !at(x - 1, y, z)
                        || !at(x + 1, y, z)
                        || !at(x, y - 1, z)
                        || !at(x, y + 1, z)
                        || !at(x, y, z - 1)
                        || !at(x, y, z + 1);
                    if exposed {
                        boundary.push(point);
                    }
                    points.push(point);
                }
            }
        }
        Self {
            inside,
            points,
            boundary,
        }
    }

    /// Largest distance from a voxel of `self` to the nearest voxel of `other`.
    ///
    /// The nearest voxel of a label always lies on its boundary, so only the
    /// boundary of `other` is searched.
    fn directed_distance(&self, other: &LabelVoxels) -> f64 {
        let mut worst = 0.0f64;
        for (point, offset) in self.points.iter().zip(self.offsets()) {
            if other.inside[offset] {
                continue;
            }
            let nearest = other
                .boundary
                .iter()
                .map(|b| (0..3).map(|axis| (point[axis] - b[axis]).powi(2)).sum::<f64>())
                .fold(f64::INFINITY, f64::min);
            worst = worst.max(nearest);
        }
        worst.sqrt()
    }

    fn offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.inside
            .iter()
            .enumerate()
            .filter_map(|(offset, &inside)| inside.then_some(offset))
    }
}

/// Symmetric Hausdorff distance of `label` between two masks, in mm.
///
/// Distances use the spacing of `reference`; both masks share its grid.
/// `None` when either mask has no voxel of `label`.
pub fn hausdorff_distance<B: Backend>(reference: &Image<B>, compared: &Image<B>, label: u8) -> Result<Option<f64>> {
    if reference.shape() != compared.shape() {
        return Err(CoreError::shape_mismatch(reference.shape(), compared.shape()));
    }
    let geometry = reference.geometry();
    let size = geometry.size();
    let spacing = [geometry.spacing().x, geometry.spacing().y, geometry.spacing().z];

    let a = LabelVoxels::collect(&reference.to_voxels()?, size, spacing, label);
    let b = LabelVoxels::collect(&compared.to_voxels()?, size, spacing, label);
    if a.points.is_empty() || b.points.is_empty() {
        return Ok(None);
    }
    Ok(Some(a.directed_distance(&b).max(b.directed_distance(&a))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageGeometry;
    use crate::spatial::{Direction3, Point3, Spacing3};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn row(voxels: Vec<f32>, spacing: f64) -> Image<TestBackend> {
        let geometry = ImageGeometry::new(
            [voxels.len(), 1, 1],
            Point3::origin(),
            Spacing3::new(spacing, 1.0, 1.0),
            Direction3::identity(),
        );
        Image::from_voxels(voxels, geometry, &Default::default()).unwrap()
    }

    #[test]
    fn test_identical_masks_agree() {
        let mask = row(vec![0.0, 1.0, 1.0, 2.0], 1.0);
        let intensity = row(vec![5.0, 1.0, 3.0, 8.0], 1.0);
        let metrics = evaluate_labels(&mask, &mask, &intensity).unwrap();

        assert_eq!(metrics.iter().map(|m| m.label).collect::<Vec<_>>(), vec![1, 2]);
        let first = &metrics[0];
        assert_eq!(first.dice, 1.0);
        assert_eq!(first.jaccard, 1.0);
        assert_eq!(first.volume_similarity, 0.0);
        assert_eq!(first.hausdorff_distance, Some(0.0));
        assert!((first.intensity_total - 4.0).abs() < 1e-9);
        assert!((first.intensity_mean - 2.0).abs() < 1e-9);
        assert!((first.intensity_std - 2f64.sqrt()).abs() < 1e-6);
        // a single voxel has no spread
        assert_eq!(metrics[1].intensity_std, 0.0);
    }

    #[test]
    fn test_partial_overlap() {
        // reference covers 0..4, compared covers 2..6
        let reference = row(vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0], 2.0);
        let compared = row(vec![0.0, 0.0, 1.0, 1.0, 1.0, 1.0], 2.0);
        let intensity = row(vec![1.0; 6], 2.0);
        let m = evaluate_label(&reference, &compared, &intensity, 1).unwrap();

        assert!((m.dice - 0.5).abs() < 1e-9);
        assert!((m.jaccard - 2.0 / 6.0).abs() < 1e-9);
        assert_eq!(m.volume_similarity, 0.0);
        // voxel 0 is two voxels from voxel 2, at 2 mm spacing
        assert_eq!(m.hausdorff_distance, Some(4.0));
        assert_eq!(m.intensity_total, 4.0);
    }

    #[test]
    fn test_missing_label_on_one_side() {
        let reference = row(vec![3.0, 3.0, 0.0], 1.0);
        let compared = row(vec![0.0, 0.0, 0.0], 1.0);
        let m = evaluate_label(&reference, &compared, &row(vec![1.0; 3], 1.0), 3).unwrap();
        assert_eq!(m.dice, 0.0);
        assert_eq!(m.volume_similarity, 2.0);
        assert_eq!(m.hausdorff_distance, None);
        assert_eq!(m.intensity_mean, 0.0);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let mask = row(vec![1.0, 1.0], 1.0);
        let other = row(vec![1.0, 1.0, 1.0], 1.0);
        assert!(matches!(
            evaluate_label(&mask, &other, &mask, 1),
            Err(CoreError::ShapeMismatch { .. })
        ));
    }
}
