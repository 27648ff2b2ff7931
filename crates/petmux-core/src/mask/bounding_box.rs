//! Axis-aligned voxel bounding boxes.

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::image::{Image, ImageGeometry};

/// Inclusive voxel-index box, `(x, y, z)` ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [usize; 3],
    pub max: [usize; 3],
}

impl BoundingBox {
    pub fn new(min: [usize; 3], max: [usize; 3]) -> Self {
        Self { min, max }
    }

    /// Tightest box enclosing every non-zero voxel of `mask`.
    pub fn from_mask<B: Backend>(mask: &Image<B>) -> Result<Self> {
        let voxels = mask.to_voxels()?;
        let [nx, ny, _] = mask.geometry().size();

        let mut min = [usize::MAX; 3];
        let mut max = [0usize; 3];
        let mut found = false;

        for (offset, &value) in voxels.iter().enumerate() {
            if value <= 0.0 {
                continue;
            }
            found = true;
            let x = offset % nx;
            let y = (offset / nx) % ny;
            let z = offset / (nx * ny);
            for (axis, coord) in [x, y, z].into_iter().enumerate() {
                min[axis] = min[axis].min(coord);
                max[axis] = max[axis].max(coord);
            }
        }

        if !found {
            return Err(CoreError::empty_mask(format!(
                "no foreground voxels in {:?} grid",
                mask.geometry().size()
            )));
        }
        Ok(Self { min, max })
    }

    /// Coordinate-wise max of mins and min of maxes; `None` if disjoint.
    pub fn intersect(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let mut min = [0; 3];
        let mut max = [0; 3];
        for axis in 0..3 {
            min[axis] = self.min[axis].max(other.min[axis]);
            max[axis] = self.max[axis].min(other.max[axis]);
            if min[axis] > max[axis] {
                return None;
            }
        }
        Some(BoundingBox { min, max })
    }

    pub fn contains(&self, index: [usize; 3]) -> bool {
        (0..3).all(|axis| self.min[axis] <= index[axis] && index[axis] <= self.max[axis])
    }

    /// Number of voxels inside the box.
    pub fn voxel_count(&self) -> usize {
        (0..3).map(|axis| self.max[axis] - self.min[axis] + 1).product()
    }

    /// Binary volume on `geometry`: 1 inside the box, 0 elsewhere.
    pub fn to_mask<B: Backend>(&self, geometry: ImageGeometry, device: &B::Device) -> Result<Image<B>> {
        let [nx, ny, nz] = geometry.size();
        let mut voxels = vec![0.0f32; geometry.voxel_count()];
        for z in self.min[2]..=self.max[2].min(nz.saturating_sub(1)) {
            for y in self.min[1]..=self.max[1].min(ny.saturating_sub(1)) {
                for x in self.min[0]..=self.max[0].min(nx.saturating_sub(1)) {
                    voxels[geometry.linear_index(x, y, z)] = 1.0;
                }
            }
        }
        Image::from_voxels(voxels, geometry, device)
    }
}
