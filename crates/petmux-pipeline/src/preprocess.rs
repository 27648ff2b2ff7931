//! Parallel preprocessing of compliant acquisitions.
//!
//! 1. On the compute pool, reslice every anatomical volume into its own
//!    functional grid.
//! 2. Segment each resliced anatomical volume with the body and region
//!    models, one acquisition at a time, then derive the filled region mask
//!    and the registration guidance mask.
//! 3. After a full barrier, consolidate the per-acquisition files into the
//!    shared working directories on the I/O pool.
//!
//! Every derived file is skipped when it already exists.

use std::fs;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use petmux_core::filter::{reslice_identity, ResliceAlignment};
use petmux_core::mask::{binarize, exclude_regions, fill_against_body, RegionSelection};
use petmux_core::{Image, VolumeKind};
use petmux_io::{read_nifti, write_label_nifti, write_nifti};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::acquisition::{file_name, Acquisition};
use crate::config::{NamingConvention, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::progress::{ProgressTracker, Stage};
use crate::registry::{AcquisitionArtifacts, ArtifactRegistry};
use crate::segmentation::{find_label_volume, SegmentationModel};

const REGION_MASK_FILE: &str = "region_mask.nii.gz";
const GUIDANCE_MASK_FILE: &str = "guidance_mask.nii.gz";
const SEGMENTATION_INPUT: &str = "input";

/// Directories of one subject's working area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingLayout {
    pub root: PathBuf,
    pub anatomical: PathBuf,
    pub functional: PathBuf,
    pub region_masks: PathBuf,
    pub body_masks: PathBuf,
    pub guidance_masks: PathBuf,
    pub common_fov: PathBuf,
    pub transforms: PathBuf,
    pub aligned_masks: PathBuf,
    pub aligned_anatomical: PathBuf,
    pub aligned_functional: PathBuf,
}

impl WorkingLayout {
    pub fn new(subject_dir: &Path, naming: &NamingConvention) -> Self {
        let root = subject_dir.join(&naming.working_folder);
        Self {
            anatomical: root.join(&naming.anatomical_folder),
            functional: root.join(&naming.functional_folder),
            region_masks: root.join(&naming.region_mask_folder),
            body_masks: root.join(&naming.body_mask_folder),
            guidance_masks: root.join(&naming.guidance_mask_folder),
            common_fov: root.join(&naming.common_fov_folder),
            transforms: root.join(&naming.transforms_folder),
            aligned_masks: root.join(naming.aligned_folder(&naming.region_mask_folder)),
            aligned_anatomical: root.join(naming.aligned_folder(&naming.anatomical_folder)),
            aligned_functional: root.join(naming.aligned_folder(&naming.functional_folder)),
            root,
        }
    }

    /// Aligned output directories, in mask, anatomical, functional order.
    pub fn aligned_dirs(&self) -> [&Path; 3] {
        [&self.aligned_masks, &self.aligned_anatomical, &self.aligned_functional]
    }

    fn consolidation_dirs(&self) -> [&Path; 5] {
        [
            &self.anatomical,
            &self.functional,
            &self.region_masks,
            &self.body_masks,
            &self.guidance_masks,
        ]
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join("registry.json")
    }
}

pub(crate) fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))
}

/// Copy `src` into `dir` as `<id>_<file name>`.
pub(crate) fn copy_renamed(src: &Path, dir: &Path, id: &str) -> Result<PathBuf> {
    let dst = dir.join(format!("{id}_{}", file_name(src)));
    fs::copy(src, &dst).map_err(|e| PipelineError::io(&dst, e))?;
    Ok(dst)
}

#[derive(Debug, Clone)]
struct Segmented {
    body: PathBuf,
    region: PathBuf,
    guidance: PathBuf,
}

/// Runs the preprocessing stages.
pub struct Preprocessor<'a, B: Backend> {
    config: &'a PipelineConfig,
    segmenter: &'a dyn SegmentationModel,
    progress: &'a ProgressTracker,
    device: B::Device,
}

impl<'a, B: Backend> Preprocessor<'a, B> {
    pub fn new(
        config: &'a PipelineConfig,
        segmenter: &'a dyn SegmentationModel,
        progress: &'a ProgressTracker,
        device: B::Device,
    ) -> Self {
        Self {
            config,
            segmenter,
            progress,
            device,
        }
    }

    /// Preprocess `acquisitions` and record their consolidated artifacts.
    pub fn run(
        &self,
        subject_dir: &Path,
        acquisitions: &[Acquisition],
        regions: &RegionSelection,
    ) -> Result<(WorkingLayout, ArtifactRegistry)> {
        let layout = WorkingLayout::new(subject_dir, &self.config.naming);
        for dir in std::iter::once(layout.root.as_path()).chain(layout.consolidation_dirs()) {
            create_dir(dir)?;
        }
        info!(root = %layout.root.display(), acquisitions = acquisitions.len(), "Preprocessing");

        let compute = pool(self.config.compute_workers())?;
        let stage = self.progress.start(Stage::Reslice, Some(acquisitions.len()));
        let resampled: Vec<PathBuf> = stage.check(compute.install(|| {
            acquisitions
                .par_iter()
                .map(|acquisition| {
                    let path = self.reslice_anatomical(acquisition)?;
                    stage.item(acquisition.id.as_str());
                    Ok(path)
                })
                .collect::<Result<Vec<_>>>()
        }))?;
        stage.complete();

        // The model owns the accelerator, so acquisitions are segmented in turn.
        let stage = self.progress.start(Stage::Segmentation, Some(acquisitions.len()));
        let mut segmented = Vec::with_capacity(acquisitions.len());
        for (acquisition, anatomical) in acquisitions.iter().zip(&resampled) {
            let masks = stage.check(self.segment(acquisition, anatomical, regions))?;
            stage.item(acquisition.id.as_str());
            segmented.push(masks);
        }
        stage.complete();

        let io = pool(self.config.io_workers())?;
        let stage = self.progress.start(Stage::Consolidation, Some(acquisitions.len()));
        let entries: Vec<(String, AcquisitionArtifacts)> = stage.check(io.install(|| {
            acquisitions
                .par_iter()
                .zip(resampled.par_iter())
                .zip(segmented.par_iter())
                .map(|((acquisition, anatomical), masks)| {
                    let artifacts = consolidate(&layout, acquisition, anatomical, masks)?;
                    stage.item(acquisition.id.as_str());
                    Ok((acquisition.id.clone(), artifacts))
                })
                .collect::<Result<Vec<_>>>()
        }))?;
        stage.complete();

        let mut registry = ArtifactRegistry::new();
        for (id, artifacts) in entries {
            registry.insert(id, artifacts);
        }
        Ok((layout, registry))
    }

    /// Reslice the anatomical volume into the functional grid.
    ///
    /// Both volumes share the scanner frame, so no centre alignment is applied.
    pub fn reslice_anatomical(&self, acquisition: &Acquisition) -> Result<PathBuf> {
        let output = acquisition.dir.join(format!(
            "{}{}",
            self.config.naming.resampled_prefix,
            acquisition.anatomical_name()
        ));
        if output.exists() {
            debug!(acquisition = %acquisition.id, "Resliced anatomical volume exists, skipping");
            return Ok(output);
        }

        let anatomical: Image<B> = read_nifti(&acquisition.anatomical, &self.device)?;
        let functional: Image<B> = read_nifti(&acquisition.functional, &self.device)?;
        let resliced = reslice_identity(
            functional.geometry(),
            &anatomical,
            VolumeKind::Intensity,
            ResliceAlignment::Physical,
        )?;
        write_nifti(&output, &resliced)?;
        info!(acquisition = %acquisition.id, output = %output.display(), "Resliced anatomical volume");
        Ok(output)
    }

    fn segment(&self, acquisition: &Acquisition, anatomical: &Path, regions: &RegionSelection) -> Result<Segmented> {
        let settings = &self.config.segmentation;
        let root = acquisition.dir.join(&self.config.naming.segmentation_folder);
        let input = root.join(SEGMENTATION_INPUT);
        create_dir(&input)?;
        let staged = input.join(file_name(anatomical));
        if !staged.exists() {
            fs::copy(anatomical, &staged).map_err(|e| PipelineError::io(&staged, e))?;
        }

        let body = self.run_model(&settings.body_model, &input, &root.join(&settings.body_model))?;
        let fine = self.run_model(&settings.region_model, &input, &root.join(&settings.region_model))?;

        let region = root.join(REGION_MASK_FILE);
        if region.exists() {
            debug!(acquisition = %acquisition.id, "Region mask exists, skipping");
        } else {
            let coarse: Image<B> = read_nifti(&body, &self.device)?;
            let fine: Image<B> = read_nifti(&fine, &self.device)?;
            let filled = fill_against_body(&fine, &coarse, self.config.filler_label)?;
            write_label_nifti(&region, &filled)?;
        }

        // Cheap to derive, and it depends on this run's region selection.
        let guidance = root.join(GUIDANCE_MASK_FILE);
        let filled: Image<B> = read_nifti(&region, &self.device)?;
        write_label_nifti(&guidance, &binarize(&exclude_regions(&filled, regions)?)?)?;

        Ok(Segmented { body, region, guidance })
    }

    fn run_model(&self, model: &str, input: &Path, output: &Path) -> Result<PathBuf> {
        match find_label_volume(output)? {
            Some(existing) => {
                debug!(model, path = %existing.display(), "Segmentation exists, skipping");
                Ok(existing)
            }
            None => self.segmenter.segment(model, input, output),
        }
    }
}

fn consolidate(
    layout: &WorkingLayout,
    acquisition: &Acquisition,
    anatomical: &Path,
    masks: &Segmented,
) -> Result<AcquisitionArtifacts> {
    let id = acquisition.id.as_str();
    Ok(AcquisitionArtifacts {
        source_dir: acquisition.dir.clone(),
        anatomical: copy_renamed(anatomical, &layout.anatomical, id)?,
        functional: copy_renamed(&acquisition.functional, &layout.functional, id)?,
        region_mask: copy_renamed(&masks.region, &layout.region_masks, id)?,
        body_mask: copy_renamed(&masks.body, &layout.body_masks, id)?,
        guidance_mask: copy_renamed(&masks.guidance, &layout.guidance_masks, id)?,
        transforms: Default::default(),
        aligned: None,
    })
}

pub(crate) fn pool(threads: usize) -> Result<ThreadPool> {
    Ok(ThreadPoolBuilder::new().num_threads(threads).build()?)
}
