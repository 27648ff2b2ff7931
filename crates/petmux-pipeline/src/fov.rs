//! Common field-of-view reconciliation across acquisitions.

use std::path::PathBuf;

use burn::tensor::backend::Backend;
use petmux_core::mask::{binarize, BoundingBox, CommonFovBuilder};
use petmux_core::Image;
use petmux_io::{read_nifti, write_label_nifti};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::preprocess::{create_dir, WorkingLayout};
use crate::progress::{ProgressTracker, Stage};
use crate::registry::ArtifactRegistry;

pub const COMMON_FOV_FILE: &str = "common_fov_mask.nii.gz";

/// Outcome of the common-FOV stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FovSummary {
    /// Box in voxel indices of the reference mask.
    pub bounding_box: BoundingBox,
    pub mask: PathBuf,
}

/// Intersect every body mask's extent and crop the masks to it in place.
///
/// The reference body mask (first registry entry) defines the frame. Body
/// and region masks of every acquisition are overwritten with their
/// intersected versions.
pub fn reconcile_fov<B: Backend>(
    layout: &WorkingLayout,
    registry: &ArtifactRegistry,
    progress: &ProgressTracker,
    device: &B::Device,
) -> Result<FovSummary> {
    let (reference_id, reference) = registry
        .reference()
        .ok_or_else(|| PipelineError::configuration("no acquisitions to reconcile"))?;

    let stage = progress.start(Stage::CommonFov, Some(registry.len()));
    let reference_mask: Image<B> = read_nifti(&reference.body_mask, device)?;
    let mut builder = stage.check(CommonFovBuilder::new(binarize(&reference_mask)?))?;
    stage.item(reference_id);

    for (id, artifacts) in registry.moving() {
        let mask: Image<B> = read_nifti(&artifacts.body_mask, device)?;
        let bbox = stage.check(builder.add(&binarize(&mask)?))?;
        info!(acquisition = id, min = ?bbox.min, max = ?bbox.max, "Intersected body extent");
        stage.item(id);
    }

    create_dir(&layout.common_fov)?;
    let output = layout.common_fov.join(COMMON_FOV_FILE);
    write_label_nifti(&output, &builder.build()?)?;

    for (_, artifacts) in registry.iter() {
        for path in [&artifacts.body_mask, &artifacts.region_mask] {
            let mask: Image<B> = read_nifti(path, device)?;
            write_label_nifti(path, &builder.apply(&mask)?)?;
        }
    }
    stage.complete();

    Ok(FovSummary {
        bounding_box: *builder.bounding_box(),
        mask: output,
    })
}
