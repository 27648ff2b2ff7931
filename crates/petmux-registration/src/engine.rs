//! Registration engine.
//!
//! Runs the rigid, affine and deformable stages of one moving volume against
//! a fixed volume. Each stage writes its own artifact into the request's
//! artifact directory and is skipped when that artifact already exists.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RegistrationError, Result};
use crate::greedy::{Greedy, LinearModel, Masks};
use crate::schedule::{IterationSchedule, SimilarityMetric};
use crate::tool::{run_checked, ExitPolicy, ToolRunner};
use crate::transform_store::{TransformKind, TransformSet, TransformStore};

/// How far along the transform chain to register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationMode {
    Rigid,
    Affine,
    #[default]
    Deformable,
}

/// Registration settings shared by every moving volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationSettings {
    /// Greedy-compatible executable.
    pub greedy: PathBuf,
    pub mode: RegistrationMode,
    pub schedule: IterationSchedule,
    pub linear_metric: SimilarityMetric,
    pub deformable_metric: SimilarityMetric,
    pub exit_policy: ExitPolicy,
    /// Threads per invocation; the tool decides when unset.
    pub threads: Option<usize>,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            greedy: PathBuf::from("greedy"),
            mode: RegistrationMode::default(),
            schedule: IterationSchedule::default(),
            linear_metric: SimilarityMetric::Nmi,
            deformable_metric: SimilarityMetric::Ncc { radius: [2, 2, 2] },
            exit_policy: ExitPolicy::default(),
            threads: None,
        }
    }
}

impl RegistrationSettings {
    pub fn greedy(&self) -> Greedy {
        Greedy::new(&self.greedy).with_threads(self.threads)
    }
}

/// One moving volume to register against a fixed volume.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub fixed: PathBuf,
    pub moving: PathBuf,
    pub fixed_mask: Option<PathBuf>,
    pub moving_mask: Option<PathBuf>,
    /// Prefix of every artifact written for this moving volume.
    pub moving_id: String,
    pub artifact_dir: PathBuf,
}

impl RegistrationRequest {
    pub fn new(
        fixed: impl Into<PathBuf>,
        moving: impl Into<PathBuf>,
        moving_id: impl Into<String>,
        artifact_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fixed: fixed.into(),
            moving: moving.into(),
            fixed_mask: None,
            moving_mask: None,
            moving_id: moving_id.into(),
            artifact_dir: artifact_dir.into(),
        }
    }

    pub fn with_masks(mut self, fixed_mask: Option<PathBuf>, moving_mask: Option<PathBuf>) -> Self {
        self.fixed_mask = fixed_mask;
        self.moving_mask = moving_mask;
        self
    }

    fn masks(&self) -> Masks<'_> {
        Masks {
            fixed: self.fixed_mask.as_deref(),
            moving: self.moving_mask.as_deref(),
        }
    }
}

/// Drives the external registration tool.
pub struct RegistrationEngine {
    runner: Arc<dyn ToolRunner>,
    settings: RegistrationSettings,
}

impl RegistrationEngine {
    pub fn new(runner: Arc<dyn ToolRunner>, settings: RegistrationSettings) -> Self {
        Self { runner, settings }
    }

    pub fn settings(&self) -> &RegistrationSettings {
        &self.settings
    }

    /// Run the stages selected by the configured mode.
    pub fn register(&self, request: &RegistrationRequest) -> Result<TransformSet> {
        match self.settings.mode {
            RegistrationMode::Rigid => {
                let mut set = TransformSet::default();
                set.insert(TransformKind::Rigid, self.rigid(request)?);
                Ok(set)
            }
            RegistrationMode::Affine => {
                let mut set = TransformSet::default();
                set.insert(TransformKind::Affine, self.affine(request)?);
                Ok(set)
            }
            RegistrationMode::Deformable => self.deformable(request),
        }
    }

    /// Six degree-of-freedom registration.
    pub fn rigid(&self, request: &RegistrationRequest) -> Result<PathBuf> {
        self.linear(request, LinearModel::Rigid, TransformKind::Rigid)
    }

    /// Twelve degree-of-freedom registration.
    pub fn affine(&self, request: &RegistrationRequest) -> Result<PathBuf> {
        self.linear(request, LinearModel::Affine, TransformKind::Affine)
    }

    /// Affine followed by a deformable stage; keeps the inverse warp.
    pub fn deformable(&self, request: &RegistrationRequest) -> Result<TransformSet> {
        let store = TransformStore::open(&request.artifact_dir)?;
        let affine = self.affine(request)?;

        let warp = store.path_for(&request.moving_id, TransformKind::ForwardWarp);
        let inverse = store.path_for(&request.moving_id, TransformKind::InverseWarp);

        if warp.exists() && inverse.exists() {
            debug!(moving = %request.moving_id, "Deformable registration already done");
        } else {
            let invocation = self.settings.greedy().deformable(
                &request.fixed,
                &request.moving,
                request.masks(),
                &affine,
                &self.settings.deformable_metric,
                &self.settings.schedule,
                &warp,
                &inverse,
            );
            info!(moving = %request.moving_id, "Deformable registration");
            let output = run_checked(
                self.runner.as_ref(),
                &invocation,
                self.settings.exit_policy,
                "deformable registration",
                &[warp.as_path(), inverse.as_path()],
            )?;
            debug!(elapsed_ms = output.elapsed.as_millis() as u64, "Deformable stage done");
        }

        let mut set = store.existing(&request.moving_id);
        set.insert(TransformKind::Affine, affine);
        set.insert(TransformKind::ForwardWarp, warp);
        set.insert(TransformKind::InverseWarp, inverse);
        Ok(set)
    }

    fn linear(&self, request: &RegistrationRequest, model: LinearModel, kind: TransformKind) -> Result<PathBuf> {
        Self::require_input(&request.fixed)?;
        Self::require_input(&request.moving)?;

        let store = TransformStore::open(&request.artifact_dir)?;
        let output = store.path_for(&request.moving_id, kind);
        if output.exists() {
            debug!(moving = %request.moving_id, path = %output.display(), "Transform exists, skipping");
            return Ok(output);
        }

        let invocation = self.settings.greedy().linear(
            model,
            &request.fixed,
            &request.moving,
            request.masks(),
            &self.settings.linear_metric,
            &self.settings.schedule,
            &output,
        );
        let step = match model {
            LinearModel::Rigid => "rigid registration",
            LinearModel::Affine => "affine registration",
        };
        info!(moving = %request.moving_id, dof = model.dof(), "Linear registration");
        run_checked(
            self.runner.as_ref(),
            &invocation,
            self.settings.exit_policy,
            step,
            &[output.as_path()],
        )?;
        Ok(output)
    }

    fn require_input(path: &Path) -> Result<()> {
        if path.exists() {
            Ok(())
        } else {
            Err(RegistrationError::invalid_configuration(format!(
                "registration input {} does not exist",
                path.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;
    use std::fs;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, RegistrationRequest) {
        let dir = tempdir().unwrap();
        let fixed = dir.path().join("fixed.nii.gz");
        let moving = dir.path().join("moving.nii.gz");
        fs::write(&fixed, b"f").unwrap();
        fs::write(&moving, b"m").unwrap();
        let request = RegistrationRequest::new(fixed, moving, "PSMA", dir.path().join("transforms"));
        (dir, request)
    }

    #[test]
    fn test_deformable_runs_affine_then_warp() {
        let (_dir, request) = setup();
        let runner = Arc::new(RecordingRunner::new());
        let engine = RegistrationEngine::new(runner.clone(), RegistrationSettings::default());

        let set = engine.deformable(&request).unwrap();
        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 2);
        assert!(invocations[0].arguments().contains(&"-a".to_string()));
        assert!(invocations[1].arguments().contains(&"-sv".to_string()));

        assert!(set.affine.as_ref().unwrap().ends_with("PSMA_affine.mat"));
        assert!(set.forward_warp.as_ref().unwrap().ends_with("PSMA_warp.nii.gz"));
        assert!(set.inverse_warp.as_ref().unwrap().exists());
        assert_eq!(set.chain().len(), 2);
    }

    #[test]
    fn test_existing_artifacts_are_not_recomputed() {
        let (_dir, request) = setup();
        let runner = Arc::new(RecordingRunner::new());
        let engine = RegistrationEngine::new(runner.clone(), RegistrationSettings::default());

        engine.deformable(&request).unwrap();
        engine.deformable(&request).unwrap();
        assert_eq!(runner.invocations().len(), 2);
    }

    #[test]
    fn test_masks_are_forwarded() {
        let (dir, request) = setup();
        let request = request.with_masks(Some(dir.path().join("fm.nii.gz")), None);
        let runner = Arc::new(RecordingRunner::new());
        let engine = RegistrationEngine::new(runner.clone(), RegistrationSettings::default());

        engine.affine(&request).unwrap();
        assert_eq!(runner.count_with("-gm"), 1);
        assert_eq!(runner.count_with("-mm"), 0);
    }

    #[test]
    fn test_strict_failure_is_typed() {
        let (_dir, request) = setup();
        let runner = Arc::new(RecordingRunner::new().with_status(1));
        let engine = RegistrationEngine::new(runner, RegistrationSettings::default());

        let err = engine.rigid(&request).unwrap_err();
        assert!(matches!(err, RegistrationError::ExternalTool { status: Some(1), .. }));
    }

    #[test]
    fn test_silent_failure_is_caught_at_the_step() {
        let (_dir, request) = setup();
        let runner = Arc::new(RecordingRunner::new().without_outputs());
        let engine = RegistrationEngine::new(runner, RegistrationSettings::default());

        let err = engine.deformable(&request).unwrap_err();
        assert!(matches!(err, RegistrationError::MissingArtifact { ref step, .. } if step == "affine registration"));
    }

    #[test]
    fn test_mode_selects_stages() {
        let (_dir, request) = setup();
        let runner = Arc::new(RecordingRunner::new());
        let settings = RegistrationSettings {
            mode: RegistrationMode::Rigid,
            ..RegistrationSettings::default()
        };
        let engine = RegistrationEngine::new(runner.clone(), settings);

        let set = engine.register(&request).unwrap();
        assert!(set.rigid.is_some());
        assert!(set.affine.is_none());
        assert_eq!(runner.count_with("6"), 1);
    }

    #[test]
    fn test_missing_input_is_rejected() {
        let dir = tempdir().unwrap();
        let request = RegistrationRequest::new(
            dir.path().join("nope.nii"),
            dir.path().join("nope2.nii"),
            "x",
            dir.path(),
        );
        let engine = RegistrationEngine::new(Arc::new(RecordingRunner::new()), RegistrationSettings::default());
        assert!(matches!(
            engine.affine(&request),
            Err(RegistrationError::InvalidConfiguration(_))
        ));
    }
}
