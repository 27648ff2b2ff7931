//! Label agreement of every aligned acquisition with the reference.
//!
//! Each aligned region mask is compared with the reference mask label by
//! label; the acquisition's aligned functional volume supplies the intensity
//! statistics. Results are written as JSON into the working folder.

use std::fs;
use std::path::PathBuf;

use burn::tensor::backend::Backend;
use petmux_core::mask::{evaluate_labels, LabelMetrics};
use petmux_core::Image;
use petmux_io::read_nifti;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::preprocess::WorkingLayout;
use crate::progress::{ProgressTracker, Stage};
use crate::registry::{AlignedOutputs, ArtifactRegistry};

/// Metrics of one acquisition against the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionEvaluation {
    pub id: String,
    pub labels: Vec<LabelMetrics>,
}

/// Contents of the evaluation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub reference: String,
    /// Reference first, then every moving acquisition in id order.
    pub acquisitions: Vec<AcquisitionEvaluation>,
    #[serde(skip)]
    pub path: PathBuf,
}

pub struct Evaluator<'a, B: Backend> {
    config: &'a PipelineConfig,
    progress: &'a ProgressTracker,
    device: B::Device,
}

impl<'a, B: Backend> Evaluator<'a, B> {
    pub fn new(config: &'a PipelineConfig, progress: &'a ProgressTracker, device: B::Device) -> Self {
        Self {
            config,
            progress,
            device,
        }
    }

    /// Evaluate every acquisition with aligned outputs in `registry`.
    pub fn run(&self, layout: &WorkingLayout, registry: &ArtifactRegistry) -> Result<EvaluationReport> {
        let (reference_id, _) = registry
            .reference()
            .ok_or_else(|| PipelineError::configuration("nothing to evaluate"))?;
        let reference = aligned(registry, reference_id)?;
        let reference_mask: Image<B> = read_nifti(&reference.mask, &self.device)?;

        let stage = self.progress.start(Stage::Evaluation, Some(registry.len()));
        let mut acquisitions = Vec::with_capacity(registry.len());
        for id in registry.ids() {
            let outputs = stage.check(aligned(registry, id))?;
            let compared: Image<B> = read_nifti(&outputs.mask, &self.device)?;
            let intensity: Image<B> = read_nifti(&outputs.functional, &self.device)?;
            let labels = stage.check(evaluate_labels(&reference_mask, &compared, &intensity))?;

            for m in &labels {
                info!(
                    acquisition = id,
                    label = m.label,
                    dice = m.dice,
                    jaccard = m.jaccard,
                    volume_similarity = m.volume_similarity,
                    hausdorff = ?m.hausdorff_distance,
                    intensity_total = m.intensity_total,
                    intensity_mean = m.intensity_mean,
                    intensity_std = m.intensity_std,
                    "Label metrics"
                );
            }
            acquisitions.push(AcquisitionEvaluation {
                id: id.to_string(),
                labels,
            });
            stage.item(id);
        }

        let path = layout.root.join(&self.config.naming.evaluation_file);
        let report = EvaluationReport {
            reference: reference_id.to_string(),
            acquisitions,
            path,
        };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| PipelineError::configuration(format!("evaluation serialisation: {e}")))?;
        fs::write(&report.path, json).map_err(|e| PipelineError::io(&report.path, e))?;
        debug!(path = %report.path.display(), "Evaluation written");
        stage.complete();
        Ok(report)
    }
}

fn aligned<'r>(registry: &'r ArtifactRegistry, id: &str) -> Result<&'r AlignedOutputs> {
    registry
        .require(id)?
        .aligned
        .as_ref()
        .ok_or_else(|| PipelineError::configuration(format!("'{id}' has no aligned outputs to evaluate")))
}

