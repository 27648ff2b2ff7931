//! End-to-end pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::tensor::backend::Backend;
use petmux_core::multiplex::Channel;
use petmux_core::CoreError;
use petmux_registration::ToolRunner;
use tracing::info;

use crate::acquisition::{select_compliant, Acquisition};
use crate::align::{Aligner, AlignmentSummary};
use crate::config::{PipelineConfig, RunOptions, RunPlan};
use crate::error::{PipelineError, Result};
use crate::evaluate::{EvaluationReport, Evaluator};
use crate::export::DicomExporter;
use crate::fov::{reconcile_fov, FovSummary};
use crate::multiplex::{ChannelChooser, ExplicitChooser, MultiplexOutputs, Multiplexer, SequentialChooser};
use crate::preprocess::{Preprocessor, WorkingLayout};
use crate::progress::{ProgressTracker, Stage};
use crate::registry::ArtifactRegistry;
use crate::segmentation::SegmentationModel;

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub layout: WorkingLayout,
    /// Compliant acquisition ids, reference first.
    pub acquisitions: Vec<String>,
    pub fov: FovSummary,
    pub alignment: AlignmentSummary,
    pub registry: ArtifactRegistry,
    pub evaluation: Option<EvaluationReport>,
    pub multiplex: Option<MultiplexOutputs>,
    pub dicom: Vec<PathBuf>,
}

pub struct Pipeline<B: Backend> {
    config: PipelineConfig,
    runner: Arc<dyn ToolRunner>,
    segmenter: Arc<dyn SegmentationModel>,
    progress: ProgressTracker,
    device: B::Device,
}

impl<B: Backend> Pipeline<B> {
    pub fn new(
        config: PipelineConfig,
        runner: Arc<dyn ToolRunner>,
        segmenter: Arc<dyn SegmentationModel>,
        device: B::Device,
    ) -> Self {
        Self {
            config,
            runner,
            segmenter,
            progress: ProgressTracker::new(),
            device,
        }
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage over `acquisition_dirs` of the subject.
    ///
    /// `chooser` picks channels when multiplexing without an explicit map;
    /// tracers go on red, green, blue in order when it is `None`.
    pub fn run<P: AsRef<Path>>(
        &self,
        subject_dir: &Path,
        acquisition_dirs: &[P],
        options: &RunOptions,
        chooser: Option<&dyn ChannelChooser>,
    ) -> Result<RunReport> {
        let plan = options.validate(&self.config)?;

        let stage = self.progress.start(Stage::Compliance, Some(acquisition_dirs.len()));
        let acquisitions = stage.check(select_compliant(acquisition_dirs, &self.config.naming))?;
        for acquisition in &acquisitions {
            stage.item(acquisition.id.as_str());
        }
        stage.complete();
        check_multiplex_inputs(&plan, &acquisitions)?;

        let preprocessor = Preprocessor::<B>::new(
            &self.config,
            self.segmenter.as_ref(),
            &self.progress,
            self.device.clone(),
        );
        let (layout, mut registry) = preprocessor.run(subject_dir, &acquisitions, &plan.regions)?;

        let fov = reconcile_fov::<B>(&layout, &registry, &self.progress, &self.device)?;

        let aligner = Aligner::new(&self.config, self.runner.clone(), &self.progress);
        let alignment = aligner.run(&layout, &mut registry, &plan.regions)?;

        let evaluation = if plan.evaluate {
            let evaluator = Evaluator::<B>::new(&self.config, &self.progress, self.device.clone());
            Some(evaluator.run(&layout, &registry)?)
        } else {
            None
        };

        let multiplex = if plan.multiplex {
            let multiplexer = Multiplexer::<B>::new(&self.config, &self.progress, self.device.clone());
            let outputs = match (&plan.channels, chooser) {
                (Some(assignment), _) => {
                    multiplexer.run(&layout, &registry, &ExplicitChooser(assignment.clone()))?
                }
                (None, Some(chooser)) => multiplexer.run(&layout, &registry, chooser)?,
                (None, None) => multiplexer.run(&layout, &registry, &SequentialChooser)?,
            };
            Some(outputs)
        } else {
            None
        };

        let dicom = match (&self.config.dicom_exporter, plan.dicom_export) {
            (Some(program), true) => {
                DicomExporter::new(self.runner.clone(), program).export(&layout.aligned_dirs(), &layout.root, &self.progress)?
            }
            _ => Vec::new(),
        };

        info!(
            acquisitions = acquisitions.len(),
            registrations = alignment.registrations,
            multiplexed = multiplex.is_some(),
            "Pipeline finished"
        );
        Ok(RunReport {
            layout,
            acquisitions: acquisitions.into_iter().map(|a| a.id).collect(),
            fov,
            alignment,
            registry,
            evaluation,
            multiplex,
            dicom,
        })
    }
}

/// Fail before any file is written when multiplexing cannot succeed.
fn check_multiplex_inputs(plan: &RunPlan, acquisitions: &[Acquisition]) -> Result<()> {
    if !plan.multiplex {
        return Ok(());
    }
    match &plan.channels {
        Some(assignment) => {
            for (tracer, _) in assignment.entries() {
                if !acquisitions.iter().any(|a| &a.id == tracer) {
                    return Err(PipelineError::configuration(format!(
                        "channel map names '{tracer}', which is not a compliant acquisition"
                    )));
                }
            }
            Ok(())
        }
        None if acquisitions.len() > Channel::ALL.len() => {
            Err(CoreError::ChannelCount(acquisitions.len()).into())
        }
        None => Ok(()),
    }
}
