//! Image type with physical metadata and coordinate transformations.
//!
//! An [`Image`] pairs a `[Z, Y, X]` tensor with the [`ImageGeometry`] that
//! maps its voxel indices to physical coordinates.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::geometry::ImageGeometry;
use crate::error::{CoreError, Result};
use crate::spatial::{Direction3, Point3, Spacing3};

/// 3-D medical volume with physical metadata.
///
/// # Coordinate Systems
/// * **Index Space**: voxel indices `(x, y, z)`
/// * **Physical Space**: continuous coordinates in mm
///
/// # Examples
/// ```rust
/// use petmux_core::Image;
/// use petmux_core::spatial::{Direction3, Point3, Spacing3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([4, 8, 16], &device);
/// let image = Image::new(
///     data,
///     Point3::origin(),
///     Spacing3::new(1.0, 1.0, 2.0),
///     Direction3::identity(),
/// );
/// assert_eq!(image.geometry().size(), [16, 8, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend> {
    /// Voxel data, shape `[Z, Y, X]`.
    data: Tensor<B, 3>,
    geometry: ImageGeometry,
}

impl<B: Backend> Image<B> {
    /// Create an image; the grid size is taken from the tensor shape.
    pub fn new(data: Tensor<B, 3>, origin: Point3, spacing: Spacing3, direction: Direction3) -> Self {
        let [nz, ny, nx] = data.dims();
        let geometry = ImageGeometry::new([nx, ny, nz], origin, spacing, direction);
        Self { data, geometry }
    }

    /// Create an image from a tensor and an existing geometry.
    ///
    /// Fails when the tensor shape does not match the geometry.
    pub fn from_geometry(data: Tensor<B, 3>, geometry: ImageGeometry) -> Result<Self> {
        let dims = data.dims();
        if dims != geometry.tensor_shape() {
            return Err(CoreError::shape_mismatch(geometry.tensor_shape(), dims));
        }
        Ok(Self { data, geometry })
    }

    /// Create an image from voxels in `[Z, Y, X]` row-major order.
    pub fn from_voxels(voxels: Vec<f32>, geometry: ImageGeometry, device: &B::Device) -> Result<Self> {
        if voxels.len() != geometry.voxel_count() {
            return Err(CoreError::ShapeMismatch {
                expected: vec![geometry.voxel_count()],
                actual: vec![voxels.len()],
            });
        }
        let data = Tensor::<B, 1>::from_data(
            TensorData::new(voxels, Shape::new([geometry.voxel_count()])),
            device,
        )
        .reshape(geometry.tensor_shape());
        Ok(Self { data, geometry })
    }

    /// Zero-filled image on the given grid.
    pub fn zeros(geometry: ImageGeometry, device: &B::Device) -> Self {
        let data = Tensor::<B, 3>::zeros(geometry.tensor_shape(), device);
        Self { data, geometry }
    }

    /// Replace the voxel data, keeping the geometry.
    pub fn with_data(&self, data: Tensor<B, 3>) -> Result<Self> {
        Self::from_geometry(data, self.geometry)
    }

    pub fn data(&self) -> &Tensor<B, 3> {
        &self.data
    }

    pub fn into_data(self) -> Tensor<B, 3> {
        self.data
    }

    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    /// Tensor shape `[Z, Y, X]`.
    pub fn shape(&self) -> [usize; 3] {
        self.data.dims()
    }

    pub fn device(&self) -> B::Device {
        self.data.device()
    }

    /// Copy the voxels back to the host in `[Z, Y, X]` row-major order.
    pub fn to_voxels(&self) -> Result<Vec<f32>> {
        self.data
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| CoreError::tensor_data(format!("{e:?}")))
    }

    /// Batch transform physical points to continuous indices.
    ///
    /// `points` has shape `[Batch, 3]` with rows `(x, y, z)` in mm.
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let device = points.device();
        let origin = self.origin_tensor(&device);

        // I = (P - O) @ T with T_rc = (D^-1)_cr / S_c
        let inv_dir = self
            .geometry
            .direction()
            .try_inverse()
            .ok_or(CoreError::SingularDirection)?;
        let spacing = self.geometry.spacing();

        let mut t_data = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                t_data.push((inv_dir[(c, r)] / spacing[c]) as f32);
            }
        }
        let t_tensor = Tensor::<B, 2>::from_data(TensorData::new(t_data, Shape::new([3, 3])), &device);

        Ok((points - origin).matmul(t_tensor))
    }

    /// Batch transform continuous indices to physical points.
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        geometry_index_to_world(&self.geometry, indices)
    }

    fn origin_tensor(&self, device: &B::Device) -> Tensor<B, 2> {
        let origin = self.geometry.origin();
        let origin_vec: Vec<f32> = (0..3).map(|i| origin[i] as f32).collect();
        Tensor::<B, 1>::from_data(TensorData::new(origin_vec, Shape::new([3])), device).reshape([1, 3])
    }
}

/// Map `[Batch, 3]` continuous indices on `geometry` to physical points.
///
/// `P = O + I @ M` with `M_rc = S_r * D_cr`.
pub fn geometry_index_to_world<B: Backend>(geometry: &ImageGeometry, indices: Tensor<B, 2>) -> Tensor<B, 2> {
    let device = indices.device();
    let origin = geometry.origin();
    let spacing = geometry.spacing();
    let direction = geometry.direction();

    let origin_vec: Vec<f32> = (0..3).map(|i| origin[i] as f32).collect();
    let origin_tensor =
        Tensor::<B, 1>::from_data(TensorData::new(origin_vec, Shape::new([3])), &device).reshape([1, 3]);

    let mut m_data = Vec::with_capacity(9);
    for r in 0..3 {
        for c in 0..3 {
            m_data.push((spacing[r] * direction[(c, r)]) as f32);
        }
    }
    let m_tensor = Tensor::<B, 2>::from_data(TensorData::new(m_data, Shape::new([3, 3])), &device);

    indices.matmul(m_tensor) + origin_tensor
}
