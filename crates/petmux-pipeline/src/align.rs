//! Alignment of every acquisition into the reference frame.
//!
//! The reference is the first acquisition in sorted order. Each moving
//! acquisition goes through [`AlignmentStage::Register`],
//! [`AlignmentStage::ResampleMask`] and [`AlignmentStage::ResampleCompanions`]
//! independently of the others, so they fan out over a worker pool. The
//! reference artifacts are only read during the fan-out.
//!
//! Transforms and aligned volumes are reused across runs only while the
//! [`AlignmentProvenance`] recorded in the registry stays the same; otherwise
//! they are discarded before registering.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use petmux_core::mask::RegionSelection;
use petmux_core::VolumeKind;
use petmux_registration::{
    RegistrationEngine, RegistrationRequest, ResampleJob, Resampler, ToolRunner, TransformSet,
};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::acquisition::file_name;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::preprocess::{create_dir, pool, WorkingLayout};
use crate::progress::{ProgressTracker, Stage};
use crate::registry::{AcquisitionArtifacts, AlignedOutputs, AlignmentProvenance, ArtifactRegistry};

/// State of the alignment of one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlignmentStage {
    SelectReference,
    Register,
    ResampleMask,
    ResampleCompanions,
    OrganizeOutputs,
    Done,
}

/// Result of aligning one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentSummary {
    pub reference: String,
    /// Number of moving acquisitions registered to the reference.
    pub registrations: usize,
    /// Aligned triple per acquisition, the reference included.
    pub outputs: BTreeMap<String, AlignedOutputs>,
}

struct MovingResult {
    id: String,
    transforms: TransformSet,
    aligned: AlignedOutputs,
}

pub struct Aligner<'a> {
    config: &'a PipelineConfig,
    engine: RegistrationEngine,
    resampler: Resampler,
    progress: &'a ProgressTracker,
}

impl<'a> Aligner<'a> {
    pub fn new(config: &'a PipelineConfig, runner: Arc<dyn ToolRunner>, progress: &'a ProgressTracker) -> Self {
        Self {
            config,
            engine: RegistrationEngine::new(runner.clone(), config.registration.clone()),
            resampler: Resampler::new(runner, config.registration.clone()),
            progress,
        }
    }

    /// Align every registry entry and record the results in `registry`.
    ///
    /// `regions` is the selection the guidance masks were derived with.
    pub fn run(
        &self,
        layout: &WorkingLayout,
        registry: &mut ArtifactRegistry,
        regions: &RegionSelection,
    ) -> Result<AlignmentSummary> {
        let (reference_id, reference) = registry
            .reference()
            .map(|(id, artifacts)| (id.to_string(), artifacts.clone()))
            .ok_or_else(|| PipelineError::configuration("no acquisitions to align"))?;
        self.progress.alignment(&reference_id, AlignmentStage::SelectReference);
        info!(reference = %reference_id, moving = registry.len() - 1, "Selected reference acquisition");

        let provenance = AlignmentProvenance::new(registry, regions, &self.config.registration)
            .ok_or_else(|| PipelineError::configuration("no acquisitions to align"))?;
        discard_stale(layout, &provenance)?;
        for dir in output_dirs(layout) {
            create_dir(dir)?;
        }
        registry.set_provenance(provenance);
        registry.save(&layout.registry_path())?;

        let moving: Vec<(String, AcquisitionArtifacts)> = registry
            .moving()
            .map(|(id, artifacts)| (id.to_string(), artifacts.clone()))
            .collect();

        let workers = pool(self.config.compute_workers())?;
        let stage = self.progress.start(Stage::Alignment, Some(moving.len()));
        let results: Vec<MovingResult> = stage.check(workers.install(|| {
            moving
                .par_iter()
                .map(|(id, artifacts)| {
                    let result = self.align_moving(layout, &reference, id, artifacts)?;
                    stage.item(id.as_str());
                    Ok(result)
                })
                .collect::<Result<Vec<_>>>()
        }))?;

        self.progress.alignment(&reference_id, AlignmentStage::OrganizeOutputs);
        let reference_outputs = self.copy_reference(layout, &reference)?;

        let mut outputs = BTreeMap::new();
        outputs.insert(reference_id.clone(), reference_outputs.clone());
        if let Some(entry) = registry.get_mut(&reference_id) {
            entry.aligned = Some(reference_outputs);
        }
        for result in &results {
            if let Some(entry) = registry.get_mut(&result.id) {
                entry.transforms = result.transforms.clone();
                entry.aligned = Some(result.aligned.clone());
            }
            outputs.insert(result.id.clone(), result.aligned.clone());
        }
        registry.save(&layout.registry_path())?;
        stage.complete();

        self.progress.alignment(&reference_id, AlignmentStage::Done);
        Ok(AlignmentSummary {
            reference: reference_id,
            registrations: results.len(),
            outputs,
        })
    }

    fn align_moving(
        &self,
        layout: &WorkingLayout,
        reference: &AcquisitionArtifacts,
        id: &str,
        moving: &AcquisitionArtifacts,
    ) -> Result<MovingResult> {
        self.progress.alignment(id, AlignmentStage::Register);
        let request = RegistrationRequest::new(&reference.region_mask, &moving.region_mask, id, &layout.transforms)
            .with_masks(
                existing(&reference.guidance_mask),
                existing(&moving.guidance_mask),
            );
        let transforms = self.engine.register(&request)?;

        self.progress.alignment(id, AlignmentStage::ResampleMask);
        let mask = self.aligned_path(&layout.aligned_masks, &moving.region_mask);
        let job = ResampleJob::new(&reference.region_mask).volume(VolumeKind::Label, &moving.region_mask, &mask);
        self.resampler.apply(&job, &transforms)?;

        self.progress.alignment(id, AlignmentStage::ResampleCompanions);
        let anatomical = self.aligned_path(&layout.aligned_anatomical, &moving.anatomical);
        let functional = self.aligned_path(&layout.aligned_functional, &moving.functional);
        let job = ResampleJob::new(&reference.region_mask)
            .volume(VolumeKind::Intensity, &moving.anatomical, &anatomical)
            .volume(VolumeKind::Intensity, &moving.functional, &functional);
        self.resampler.apply(&job, &transforms)?;

        self.progress.alignment(id, AlignmentStage::Done);
        Ok(MovingResult {
            id: id.to_string(),
            transforms,
            aligned: AlignedOutputs {
                mask,
                anatomical,
                functional,
            },
        })
    }

    /// The reference is already in its own frame; its volumes are copied.
    fn copy_reference(&self, layout: &WorkingLayout, reference: &AcquisitionArtifacts) -> Result<AlignedOutputs> {
        let copy = |src: &Path, dir: &Path| -> Result<PathBuf> {
            let dst = self.aligned_path(dir, src);
            fs::copy(src, &dst).map_err(|e| PipelineError::io(&dst, e))?;
            Ok(dst)
        };
        Ok(AlignedOutputs {
            mask: copy(&reference.region_mask, &layout.aligned_masks)?,
            anatomical: copy(&reference.anatomical, &layout.aligned_anatomical)?,
            functional: copy(&reference.functional, &layout.aligned_functional)?,
        })
    }

    fn aligned_path(&self, dir: &Path, source: &Path) -> PathBuf {
        dir.join(format!("{}{}", self.config.naming.aligned_prefix, file_name(source)))
    }
}

fn output_dirs(layout: &WorkingLayout) -> impl Iterator<Item = &Path> {
    std::iter::once(layout.transforms.as_path()).chain(layout.aligned_dirs())
}

/// Remove transforms and aligned volumes written under another provenance.
///
/// Outputs found without any recorded provenance are removed as well.
fn discard_stale(layout: &WorkingLayout, current: &AlignmentProvenance) -> Result<()> {
    let path = layout.registry_path();
    let previous = if path.exists() {
        match ArtifactRegistry::load(&path) {
            Ok(registry) => registry.provenance().cloned(),
            Err(err) => {
                warn!(error = %err, "Previous artifact registry is unreadable");
                None
            }
        }
    } else {
        None
    };
    if previous.as_ref() == Some(current) {
        return Ok(());
    }
    if !output_dirs(layout).any(has_entries) {
        return Ok(());
    }

    match &previous {
        Some(previous) => info!(
            previous_reference = %previous.reference,
            reference = %current.reference,
            "Alignment inputs changed, discarding previous transforms and aligned volumes"
        ),
        None => warn!("Alignment outputs have no recorded provenance, discarding them"),
    }
    for dir in output_dirs(layout) {
        if dir.exists() {
            fs::remove_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
        }
    }
    Ok(())
}

fn has_entries(dir: &Path) -> bool {
    fs::read_dir(dir).map(|mut entries| entries.next().is_some()).unwrap_or(false)
}

fn existing(path: &Path) -> Option<PathBuf> {
    path.exists().then(|| path.to_path_buf())
}
