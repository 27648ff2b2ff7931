//! External segmentation models.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use petmux_io::nifti_io::is_nifti_path;
use petmux_registration::tool::run_checked;
use petmux_registration::{ExitPolicy, RegistrationError, ToolInvocation, ToolRunner};
use tracing::info;

use crate::config::SegmentationSettings;
use crate::error::{PipelineError, Result};

/// Produces one label volume from the anatomical volume in `input_dir`.
pub trait SegmentationModel: Send + Sync {
    /// Run `model` and return the label volume written into `output_dir`.
    fn segment(&self, model: &str, input_dir: &Path, output_dir: &Path) -> Result<PathBuf>;
}

/// The single NIfTI file in `dir`, if any.
///
/// More than one candidate is an error, since the output would be ambiguous.
pub fn find_label_volume(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| PipelineError::io(dir, e))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_nifti_path(path))
        .collect();
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        n => Err(PipelineError::configuration(format!(
            "{} holds {n} label volumes, expected one",
            dir.display()
        ))),
    }
}

/// Segmentation through an external executable.
pub struct ExternalSegmenter {
    runner: Arc<dyn ToolRunner>,
    settings: SegmentationSettings,
    exit_policy: ExitPolicy,
}

impl ExternalSegmenter {
    pub fn new(runner: Arc<dyn ToolRunner>, settings: SegmentationSettings) -> Self {
        Self {
            runner,
            settings,
            exit_policy: ExitPolicy::Strict,
        }
    }

    pub fn with_exit_policy(mut self, policy: ExitPolicy) -> Self {
        self.exit_policy = policy;
        self
    }

    pub fn invocation(&self, model: &str, input_dir: &Path, output_dir: &Path) -> ToolInvocation {
        ToolInvocation::new(&self.settings.executable)
            .arg("-d")
            .path_arg(input_dir)
            .arg("-o")
            .path_arg(output_dir)
            .arg("-m")
            .arg(model)
            .arg("-dev")
            .arg(self.settings.accelerator.as_str())
    }
}

impl SegmentationModel for ExternalSegmenter {
    fn segment(&self, model: &str, input_dir: &Path, output_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(output_dir).map_err(|e| PipelineError::io(output_dir, e))?;
        let invocation = self.invocation(model, input_dir, output_dir);
        info!(model, input = %input_dir.display(), "Running segmentation model");
        run_checked(self.runner.as_ref(), &invocation, self.exit_policy, "segmentation", &[])?;

        find_label_volume(output_dir)?.ok_or_else(|| {
            RegistrationError::missing_artifact(output_dir.join(format!("<{model} label volume>")), "segmentation")
                .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petmux_registration::testing::RecordingRunner;
    use tempfile::tempdir;

    #[test]
    fn test_command_line() {
        let segmenter = ExternalSegmenter::new(Arc::new(RecordingRunner::new()), SegmentationSettings::default());
        let invocation = segmenter.invocation("clin_ct_body", Path::new("in"), Path::new("out"));
        assert_eq!(invocation.arguments().join(" "), "-d in -o out -m clin_ct_body -dev cuda");
    }

    #[test]
    fn test_missing_output_is_reported() {
        let dir = tempdir().unwrap();
        let segmenter = ExternalSegmenter::new(Arc::new(RecordingRunner::new()), SegmentationSettings::default());
        let err = segmenter
            .segment("clin_ct_body", dir.path(), &dir.path().join("body"))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Registration(RegistrationError::MissingArtifact { .. })
        ));
    }

    #[test]
    fn test_single_label_volume_is_found() {
        let dir = tempdir().unwrap();
        assert!(find_label_volume(&dir.path().join("absent")).unwrap().is_none());

        fs::write(dir.path().join("CT_Body_x.nii.gz"), b"").unwrap();
        fs::write(dir.path().join("log.txt"), b"").unwrap();
        let found = find_label_volume(dir.path()).unwrap().unwrap();
        assert!(found.ends_with("CT_Body_x.nii.gz"));

        fs::write(dir.path().join("second.nii"), b"").unwrap();
        assert!(find_label_volume(dir.path()).is_err());
    }
}
