//! Replaying transform chains onto volumes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use petmux_core::VolumeKind;
use tracing::{debug, info};

use crate::engine::RegistrationSettings;
use crate::error::{RegistrationError, Result};
use crate::tool::{run_checked, ToolRunner};
use crate::transform_store::TransformSet;

/// A volume to reslice and where to write it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResampleVolume {
    pub kind: VolumeKind,
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Volumes resliced into one reference grid with one transform chain.
#[derive(Debug, Clone)]
pub struct ResampleJob {
    reference: PathBuf,
    volumes: Vec<ResampleVolume>,
}

impl ResampleJob {
    pub fn new(reference: impl Into<PathBuf>) -> Self {
        Self {
            reference: reference.into(),
            volumes: Vec::new(),
        }
    }

    pub fn volume(mut self, kind: VolumeKind, input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        self.volumes.push(ResampleVolume {
            kind,
            input: input.into(),
            output: output.into(),
        });
        self
    }

    pub fn reference(&self) -> &Path {
        &self.reference
    }

    pub fn volumes(&self) -> &[ResampleVolume] {
        &self.volumes
    }
}

/// Applies transform sets through the external tool.
pub struct Resampler {
    runner: Arc<dyn ToolRunner>,
    settings: RegistrationSettings,
}

impl Resampler {
    pub fn new(runner: Arc<dyn ToolRunner>, settings: RegistrationSettings) -> Self {
        Self { runner, settings }
    }

    /// Reslice every volume of `job` through `set`, unchanged for each.
    ///
    /// Volumes whose output already exists are skipped. Returns the output
    /// paths in job order.
    pub fn apply(&self, job: &ResampleJob, set: &TransformSet) -> Result<Vec<PathBuf>> {
        let chain = set.chain();
        if chain.is_empty() {
            return Err(RegistrationError::invalid_configuration(format!(
                "no transforms to reslice into {}",
                job.reference().display()
            )));
        }

        let pending: Vec<&ResampleVolume> = job.volumes().iter().filter(|v| !v.output.exists()).collect();
        if pending.is_empty() {
            debug!(reference = %job.reference().display(), "All resampled outputs exist, skipping");
        } else {
            let volumes: Vec<(VolumeKind, &Path, &Path)> = pending
                .iter()
                .map(|v| (v.kind, v.input.as_path(), v.output.as_path()))
                .collect();
            let invocation = self.settings.greedy().reslice(job.reference(), &volumes, &chain);
            let expected: Vec<&Path> = pending.iter().map(|v| v.output.as_path()).collect();

            info!(volumes = pending.len(), transforms = chain.len(), "Reslicing through transform chain");
            run_checked(
                self.runner.as_ref(),
                &invocation,
                self.settings.exit_policy,
                "reslicing",
                &expected,
            )?;
        }

        Ok(job.volumes().iter().map(|v| v.output.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;
    use crate::transform_store::TransformKind;
    use std::fs;
    use tempfile::tempdir;

    fn deformable_set(dir: &Path) -> TransformSet {
        let mut set = TransformSet::default();
        set.insert(TransformKind::Affine, dir.join("m_affine.mat"));
        set.insert(TransformKind::ForwardWarp, dir.join("m_warp.nii.gz"));
        set.insert(TransformKind::InverseWarp, dir.join("m_inverse_warp.nii.gz"));
        set
    }

    #[test]
    fn test_companions_share_one_chain() {
        let dir = tempdir().unwrap();
        for name in ["ref.nii.gz", "seg.nii.gz", "ct.nii.gz", "pt.nii.gz"] {
            fs::write(dir.path().join(name), name).unwrap();
        }
        let runner = Arc::new(RecordingRunner::new());
        let resampler = Resampler::new(runner.clone(), RegistrationSettings::default());
        let set = deformable_set(dir.path());

        let job = ResampleJob::new(dir.path().join("ref.nii.gz"))
            .volume(VolumeKind::Label, dir.path().join("seg.nii.gz"), dir.path().join("out/seg.nii.gz"))
            .volume(VolumeKind::Intensity, dir.path().join("ct.nii.gz"), dir.path().join("out/ct.nii.gz"))
            .volume(VolumeKind::Intensity, dir.path().join("pt.nii.gz"), dir.path().join("out/pt.nii.gz"));
        let outputs = resampler.apply(&job, &set).unwrap();
        assert_eq!(outputs.len(), 3);
        assert!(outputs.iter().all(|p| p.exists()));

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        let chain = invocations[0].values_after("-r", 2);
        assert!(chain[0][0].ends_with("m_warp.nii.gz"));
        assert!(chain[0][1].ends_with("m_affine.mat"));
        assert_eq!(runner.count_with("LABEL"), 1);

        // second run finds every output
        resampler.apply(&job, &set).unwrap();
        assert_eq!(runner.invocations().len(), 1);
    }

    #[test]
    fn test_empty_chain_is_rejected() {
        let runner = Arc::new(RecordingRunner::new());
        let resampler = Resampler::new(runner, RegistrationSettings::default());
        let job = ResampleJob::new("ref.nii.gz").volume(VolumeKind::Label, "a", "b");
        assert!(matches!(
            resampler.apply(&job, &TransformSet::default()),
            Err(RegistrationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_unwritten_output_is_reported() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new().without_outputs());
        let resampler = Resampler::new(runner, RegistrationSettings::default());
        let job = ResampleJob::new(dir.path().join("ref.nii.gz")).volume(
            VolumeKind::Intensity,
            dir.path().join("pt.nii.gz"),
            dir.path().join("aligned_pt.nii.gz"),
        );
        let err = resampler.apply(&job, &deformable_set(dir.path())).unwrap_err();
        assert!(matches!(err, RegistrationError::MissingArtifact { ref step, .. } if step == "reslicing"));
    }
}
