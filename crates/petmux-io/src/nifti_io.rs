use std::path::Path;

use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, ArrayD, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use tracing::debug;

use petmux_core::multiplex::Composite;
use petmux_core::spatial::{Direction3, Point3, Spacing3};
use petmux_core::{Image, ImageGeometry};

/// True for `.nii` and `.nii.gz` paths.
pub fn is_nifti_path<P: AsRef<Path>>(path: P) -> bool {
    let name = path.as_ref().file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name.ends_with(".nii") || name.ends_with(".nii.gz")
}

/// File name without its `.nii` / `.nii.gz` extension.
pub fn nifti_stem<P: AsRef<Path>>(path: P) -> Option<String> {
    let name = path.as_ref().file_name()?.to_str()?;
    let stem = name.strip_suffix(".nii.gz").or_else(|| name.strip_suffix(".nii"))?;
    Some(stem.to_string())
}

/// Read a 3-D NIfTI volume as f32 voxels in `[Z, Y, X]` order.
///
/// Geometry comes from the sform if set, then the qform, then pixdim alone.
/// A 4-D file with a single time point is read as its first volume.
pub fn read_nifti<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let affine = header_affine(obj.header());

    // Columns of the rotation matrix, scaled by spacing
    let mut spacing = Spacing3::zeros();
    let mut direction = Direction3::identity();
    for axis in 0..3 {
        let column = Vector3::new(
            affine[0][axis] as f64,
            affine[1][axis] as f64,
            affine[2][axis] as f64,
        );
        let norm = column.norm();
        if norm > 1e-9 {
            spacing[axis] = norm;
            direction.set_column(axis, &(column / norm));
        } else {
            spacing[axis] = 1.0;
        }
    }
    let origin = Point3::new(affine[0][3] as f64, affine[1][3] as f64, affine[2][3] as f64);

    let volume: ArrayD<f32> = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;
    let volume = match volume.ndim() {
        3 => volume,
        4 if volume.shape()[3] == 1 => volume.index_axis_move(Axis(3), 0),
        n => bail!("Expected 3D NIfTI file {}, found {} dimensions", path.display(), n),
    };
    let volume = volume
        .into_dimensionality::<Ix3>()
        .context("Failed to view NIfTI volume as 3D")?;

    // NIfTI is [X, Y, Z]; iterate the [Z, Y, X] view so x varies fastest.
    let (nx, ny, nz) = volume.dim();
    let voxels: Vec<f32> = volume.permuted_axes([2, 1, 0]).iter().copied().collect();
    let geometry = ImageGeometry::new([nx, ny, nz], origin, spacing, direction);
    debug!(path = %path.display(), size = ?geometry.size(), "Read NIfTI volume");

    Image::from_voxels(voxels, geometry, device).map_err(Into::into)
}

/// Write an image as float32 NIfTI.
pub fn write_nifti<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B>) -> Result<()> {
    let path = path.as_ref();
    let array = nifti_array(image.geometry(), image.to_voxels()?)?;
    WriterOptions::new(path)
        .reference_header(&header_for(image.geometry()))
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;
    debug!(path = %path.display(), size = ?image.geometry().size(), "Wrote NIfTI volume");
    Ok(())
}

/// Write a label image as uint8 NIfTI; values are rounded and clamped.
pub fn write_label_nifti<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B>) -> Result<()> {
    let labels: Vec<u8> = image
        .to_voxels()?
        .into_iter()
        .map(|v| v.round().clamp(0.0, u8::MAX as f32) as u8)
        .collect();
    let path = path.as_ref();
    let array = nifti_array(image.geometry(), labels)?;
    WriterOptions::new(path)
        .reference_header(&header_for(image.geometry()))
        .write_nifti(&array)
        .with_context(|| format!("Failed to write label NIfTI file {}", path.display()))?;
    debug!(path = %path.display(), size = ?image.geometry().size(), "Wrote label NIfTI volume");
    Ok(())
}

/// Write a composite as RGB24 NIfTI.
pub fn write_rgb_nifti<B: Backend, P: AsRef<Path>>(path: P, composite: &Composite<B>) -> Result<()> {
    let path = path.as_ref();
    let array = nifti_array(composite.geometry(), composite.to_rgb_voxels()?)?;
    WriterOptions::new(path)
        .reference_header(&header_for(composite.geometry()))
        .write_rgb_nifti(&array)
        .with_context(|| format!("Failed to write RGB NIfTI file {}", path.display()))?;
    debug!(path = %path.display(), "Wrote RGB NIfTI volume");
    Ok(())
}

/// NIfTI header whose sform encodes `geometry`.
pub fn header_for(geometry: &ImageGeometry) -> NiftiHeader {
    let spacing = geometry.spacing();
    let direction = geometry.direction();
    let origin = geometry.origin();

    let row = |r: usize| -> [f32; 4] {
        [
            (direction[(r, 0)] * spacing[0]) as f32,
            (direction[(r, 1)] * spacing[1]) as f32,
            (direction[(r, 2)] * spacing[2]) as f32,
            origin[r] as f32,
        ]
    };

    let mut header = NiftiHeader::default();
    header.sform_code = 1;
    header.qform_code = 0;
    header.srow_x = row(0);
    header.srow_y = row(1);
    header.srow_z = row(2);
    header.pixdim = [
        1.0,
        spacing[0] as f32,
        spacing[1] as f32,
        spacing[2] as f32,
        1.0,
        1.0,
        1.0,
        1.0,
    ];
    header
}

/// Lay `[Z, Y, X]` voxels out as a logical `[X, Y, Z]` array.
fn nifti_array<T>(geometry: &ImageGeometry, voxels: Vec<T>) -> Result<Array3<T>> {
    let [nx, ny, nz] = geometry.size();
    let zyx = Array3::from_shape_vec((nz, ny, nx), voxels).context("Failed to create ndarray")?;
    Ok(zyx.permuted_axes([2, 1, 0]))
}

fn header_affine(header: &NiftiHeader) -> [[f32; 4]; 4] {
    if header.sform_code > 0 {
        [header.srow_x, header.srow_y, header.srow_z, [0.0, 0.0, 0.0, 1.0]]
    } else if header.qform_code > 0 {
        qform_affine(header)
    } else {
        let [_, dx, dy, dz, ..] = header.pixdim;
        [
            [dx, 0.0, 0.0, 0.0],
            [0.0, dy, 0.0, 0.0],
            [0.0, 0.0, dz, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }
}

fn qform_affine(header: &NiftiHeader) -> [[f32; 4]; 4] {
    let b = header.quatern_b;
    let c = header.quatern_c;
    let d = header.quatern_d;
    let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
    let qfac = if header.pixdim[0] == 0.0 { 1.0 } else { header.pixdim[0] };

    let rotation = Matrix3::new(
        a * a + b * b - c * c - d * d,
        2.0 * b * c - 2.0 * a * d,
        2.0 * b * d + 2.0 * a * c,
        2.0 * b * c + 2.0 * a * d,
        a * a + c * c - b * b - d * d,
        2.0 * c * d - 2.0 * a * b,
        2.0 * b * d - 2.0 * a * c,
        2.0 * c * d + 2.0 * a * b,
        a * a + d * d - c * c - b * b,
    );
    let scale = [header.pixdim[1], header.pixdim[2], header.pixdim[3] * qfac];
    let offset = [header.quatern_x, header.quatern_y, header.quatern_z];

    let mut affine = [[0.0f32; 4]; 4];
    for r in 0..3 {
        for col in 0..3 {
            affine[r][col] = rotation[(r, col)] * scale[col];
        }
        affine[r][3] = offset[r];
    }
    affine[3][3] = 1.0;
    affine
}
