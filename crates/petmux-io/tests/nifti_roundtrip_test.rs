use anyhow::Result;
use burn_ndarray::NdArray;
use nifti::{NiftiObject, ReaderOptions};
use petmux_core::multiplex::{compose, ChannelAssignment};
use petmux_core::spatial::{Direction3, Point3, Spacing3};
use petmux_core::{Image, ImageGeometry};
use petmux_io::{read_nifti, write_label_nifti, write_nifti, write_rgb_nifti};
use tempfile::tempdir;

type Backend = NdArray<f32>;

fn geometry() -> ImageGeometry {
    // LPS-style flip on x and y
    let direction = Direction3::new(-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0);
    ImageGeometry::new(
        [4, 3, 2],
        Point3::new(120.5, -80.0, 1032.0),
        Spacing3::new(4.0, 4.0, 3.27),
        direction,
    )
}

#[test]
fn test_geometry_and_values_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("PT_fdg.nii.gz");
    let voxels: Vec<f32> = (0..24).map(|v| v as f32 * 1.5).collect();
    let image = Image::<Backend>::from_voxels(voxels.clone(), geometry(), &Default::default())?;

    write_nifti(&path, &image)?;
    let back = read_nifti::<Backend, _>(&path, &Default::default())?;

    assert!(back.geometry().approx_eq(image.geometry(), 1e-4));
    assert_eq!(back.to_voxels()?, voxels);
    Ok(())
}

#[test]
fn test_label_volume_is_rounded() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("mask.nii.gz");
    let voxels: Vec<f32> = (0..24).map(|v| (v % 5) as f32 + 0.2).collect();
    let image = Image::<Backend>::from_voxels(voxels, geometry(), &Default::default())?;

    write_label_nifti(&path, &image)?;
    let back = read_nifti::<Backend, _>(&path, &Default::default())?;
    let expected: Vec<f32> = (0..24).map(|v| (v % 5) as f32).collect();
    assert_eq!(back.to_voxels()?, expected);
    Ok(())
}

#[test]
fn test_rgb_composite_is_written_as_rgb24() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("multiplexed_composite_image.nii.gz");
    let volume = Image::<Backend>::from_voxels((0..24).map(|v| v as f32).collect(), geometry(), &Default::default())?;
    let composite = compose(&[volume], &ChannelAssignment::sequential(&["FDG"])?)?;

    write_rgb_nifti(&path, &composite)?;
    let obj = ReaderOptions::new().read_file(&path)?;
    // NIFTI_TYPE_RGB24
    assert_eq!(obj.header().datatype, 128);
    assert_eq!(&obj.header().dim[1..4], &[4, 3, 2]);
    Ok(())
}
