//! Common field of view across acquisitions.
//!
//! Every body mask is resliced into the reference grid and reduced to its
//! bounding box. The running intersection of those boxes is the region that
//! every acquisition covers. The box only ever shrinks as masks are added.

use burn::tensor::backend::Backend;
use tracing::{debug, info};

use super::bounding_box::BoundingBox;
use crate::error::{CoreError, Result};
use crate::filter::{reslice_identity, ResliceAlignment};
use crate::image::{Image, VolumeKind};

/// Incrementally intersects mask extents in a reference frame.
pub struct CommonFovBuilder<B: Backend> {
    reference: Image<B>,
    bbox: BoundingBox,
    masks: usize,
}

impl<B: Backend> CommonFovBuilder<B> {
    /// Start from the reference mask; its extent is the initial box.
    pub fn new(reference_mask: Image<B>) -> Result<Self> {
        let bbox = BoundingBox::from_mask(&reference_mask)?;
        debug!(?bbox, "Reference mask extent");
        Ok(Self {
            reference: reference_mask,
            bbox,
            masks: 1,
        })
    }

    /// Intersect the running box with the extent of `mask`.
    pub fn add(&mut self, mask: &Image<B>) -> Result<&BoundingBox> {
        let resliced = reslice_identity(
            self.reference.geometry(),
            mask,
            VolumeKind::Label,
            ResliceAlignment::CentersIfDiffer,
        )?;
        let extent = BoundingBox::from_mask(&resliced)?;
        self.masks += 1;

        self.bbox = self
            .bbox
            .intersect(&extent)
            .ok_or(CoreError::EmptyIntersection { masks: self.masks })?;
        debug!(bbox = ?self.bbox, masks = self.masks, "Common FOV updated");
        Ok(&self.bbox)
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Number of masks folded into the box so far, the reference included.
    pub fn mask_count(&self) -> usize {
        self.masks
    }

    /// Binary common-FOV mask in the reference geometry.
    pub fn build(&self) -> Result<Image<B>> {
        info!(
            bbox = ?self.bbox,
            voxels = self.bbox.voxel_count(),
            masks = self.masks,
            "Common FOV mask built"
        );
        self.bbox.to_mask(*self.reference.geometry(), &self.reference.device())
    }

    /// Restrict `mask` to the common FOV in the mask's own grid.
    ///
    /// Region ids inside the FOV are preserved; everything outside becomes 0.
    pub fn apply(&self, mask: &Image<B>) -> Result<Image<B>> {
        let fov = self.build()?;
        let native = reslice_identity(
            mask.geometry(),
            &fov,
            VolumeKind::Label,
            ResliceAlignment::CentersIfDiffer,
        )?;
        mask.with_data(mask.data().clone() * native.into_data())
    }
}

/// Common FOV mask of `masks`, in the geometry of the first.
pub fn common_fov<B: Backend>(masks: &[Image<B>]) -> Result<Image<B>> {
    let (first, rest) = masks.split_first().ok_or(CoreError::NoMasks)?;
    let mut builder = CommonFovBuilder::new(first.clone())?;
    for mask in rest {
        builder.add(mask)?;
    }
    builder.build()
}
