//! Image geometry: grid size plus physical metadata.
//!
//! Geometry describes how voxel indices map to physical coordinates:
//! `point = origin + Direction * (index * spacing)`.

use crate::spatial::{Direction3, Point3, Spacing3, Vector3};

/// Grid size and physical placement of a 3-D volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageGeometry {
    /// Number of voxels along x, y and z.
    size: [usize; 3],
    /// Physical coordinate of voxel (0, 0, 0).
    origin: Point3,
    /// Physical distance between voxels along each axis.
    spacing: Spacing3,
    /// Orientation of the image axes (columns are axis directions).
    direction: Direction3,
}

impl ImageGeometry {
    /// Create new geometry.
    pub fn new(size: [usize; 3], origin: Point3, spacing: Spacing3, direction: Direction3) -> Self {
        Self {
            size,
            origin,
            spacing,
            direction,
        }
    }

    /// Unit spacing, zero origin and identity direction.
    pub fn with_size(size: [usize; 3]) -> Self {
        Self::new(
            size,
            Point3::origin(),
            Spacing3::new(1.0, 1.0, 1.0),
            Direction3::identity(),
        )
    }

    /// Voxel counts along (x, y, z).
    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    /// Tensor shape `[z, y, x]` for this grid.
    pub fn tensor_shape(&self) -> [usize; 3] {
        [self.size[2], self.size[1], self.size[0]]
    }

    pub fn voxel_count(&self) -> usize {
        self.size.iter().product()
    }

    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing3 {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction3 {
        &self.direction
    }

    /// Flat offset of voxel `(x, y, z)` in a `[z, y, x]` row-major buffer.
    pub fn linear_index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.size[1] + y) * self.size[0] + x
    }

    /// Convert a continuous index to a physical point.
    pub fn index_to_physical(&self, index: &Vector3) -> Point3 {
        let scaled = index.component_mul(&self.spacing);
        self.origin + self.direction * scaled
    }

    /// Convert a physical point to a continuous index.
    ///
    /// Returns `None` when the direction matrix is singular.
    pub fn physical_to_index(&self, point: &Point3) -> Option<Vector3> {
        let inv_dir = self.direction.try_inverse()?;
        let rotated = inv_dir * (point - self.origin);
        Some(rotated.component_div(&self.spacing))
    }

    /// Physical position of the geometric centre of the grid.
    pub fn center(&self) -> Point3 {
        let half = Vector3::new(
            (self.size[0].saturating_sub(1)) as f64 / 2.0,
            (self.size[1].saturating_sub(1)) as f64 / 2.0,
            (self.size[2].saturating_sub(1)) as f64 / 2.0,
        );
        self.index_to_physical(&half)
    }

    /// True when both grids coincide voxel for voxel within `tolerance`.
    pub fn approx_eq(&self, other: &ImageGeometry, tolerance: f64) -> bool {
        self.size == other.size
            && (self.origin - other.origin).amax() <= tolerance
            && (self.spacing - other.spacing).amax() <= tolerance
            && (self.direction - other.direction).amax() <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_index_is_x_fastest() {
        let geometry = ImageGeometry::with_size([4, 3, 2]);
        assert_eq!(geometry.linear_index(0, 0, 0), 0);
        assert_eq!(geometry.linear_index(1, 0, 0), 1);
        assert_eq!(geometry.linear_index(0, 1, 0), 4);
        assert_eq!(geometry.linear_index(0, 0, 1), 12);
        assert_eq!(geometry.tensor_shape(), [2, 3, 4]);
    }

    #[test]
    fn test_index_physical_roundtrip_with_spacing() {
        let geometry = ImageGeometry::new(
            [10, 10, 10],
            Point3::new(10.0, 20.0, 30.0),
            Spacing3::new(2.0, 2.0, 4.0),
            Direction3::identity(),
        );
        let point = geometry.index_to_physical(&Vector3::new(1.0, 2.0, 3.0));
        assert!((point - Point3::new(12.0, 24.0, 42.0)).norm() < 1e-9);

        let index = geometry.physical_to_index(&point).unwrap();
        assert!((index - Vector3::new(1.0, 2.0, 3.0)).norm() < 1e-9);
    }

    #[test]
    fn test_center() {
        let geometry = ImageGeometry::new(
            [11, 5, 3],
            Point3::new(-5.0, 0.0, 0.0),
            Spacing3::new(1.0, 2.0, 1.0),
            Direction3::identity(),
        );
        let center = geometry.center();
        assert!((center - Point3::new(0.0, 4.0, 1.0)).norm() < 1e-9);
    }

    #[test]
    fn test_approx_eq_detects_shift() {
        let a = ImageGeometry::with_size([4, 4, 4]);
        let mut b = a;
        assert!(a.approx_eq(&b, 1e-6));
        b.origin = Point3::new(0.5, 0.0, 0.0);
        assert!(!a.approx_eq(&b, 1e-6));
    }
}
