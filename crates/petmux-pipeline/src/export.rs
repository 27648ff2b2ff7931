//! DICOM re-export of aligned outputs through an external converter.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use petmux_registration::tool::run_checked;
use petmux_registration::{ExitPolicy, ToolInvocation, ToolRunner};
use tracing::info;

use crate::acquisition::file_name;
use crate::error::{PipelineError, Result};
use crate::preprocess::create_dir;
use crate::progress::{ProgressTracker, Stage};

pub const DICOM_FOLDER: &str = "dicom";

pub struct DicomExporter {
    runner: Arc<dyn ToolRunner>,
    program: PathBuf,
}

impl DicomExporter {
    pub fn new(runner: Arc<dyn ToolRunner>, program: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    /// Convert each directory into `<output_root>/dicom/<directory name>`.
    pub fn export(&self, dirs: &[&Path], output_root: &Path, progress: &ProgressTracker) -> Result<Vec<PathBuf>> {
        let root = output_root.join(DICOM_FOLDER);
        create_dir(&root)?;

        let stage = progress.start(Stage::DicomExport, Some(dirs.len()));
        let mut outputs = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let name = file_name(dir);
            if name.is_empty() {
                return Err(PipelineError::configuration(format!(
                    "cannot export unnamed directory {}",
                    dir.display()
                )));
            }
            let output = root.join(&name);
            let invocation = ToolInvocation::new(&self.program).path_arg(dir).path_arg(&output);
            info!(input = %dir.display(), output = %output.display(), "Exporting to DICOM");
            stage.check(run_checked(
                self.runner.as_ref(),
                &invocation,
                ExitPolicy::Strict,
                "DICOM export",
                &[output.as_path()],
            ))?;
            stage.item(name);
            outputs.push(output);
        }
        stage.complete();
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petmux_registration::testing::RecordingRunner;
    use petmux_registration::RegistrationError;
    use std::fs;
    use tempfile::tempdir;

    /// Creates the output directory named last on the command line.
    struct MkdirRunner;

    impl ToolRunner for MkdirRunner {
        fn run(&self, invocation: &ToolInvocation) -> petmux_registration::Result<petmux_registration::ToolOutput> {
            let output = invocation.arguments().last().unwrap();
            fs::create_dir_all(output).unwrap();
            Ok(petmux_registration::ToolOutput {
                status: Some(0),
                stdout: String::new(),
                stderr: String::new(),
                elapsed: std::time::Duration::ZERO,
            })
        }
    }

    #[test]
    fn test_one_call_per_directory() {
        let dir = tempdir().unwrap();
        let aligned = dir.path().join("aligned_PT");
        fs::create_dir_all(&aligned).unwrap();

        let exporter = DicomExporter::new(Arc::new(MkdirRunner), "nifti2dicom");
        let outputs = exporter
            .export(&[aligned.as_path()], dir.path(), &ProgressTracker::new())
            .unwrap();
        assert_eq!(outputs, vec![dir.path().join("dicom/aligned_PT")]);
    }

    #[test]
    fn test_missing_output_fails() {
        let dir = tempdir().unwrap();
        let exporter = DicomExporter::new(Arc::new(RecordingRunner::new()), "nifti2dicom");
        let err = exporter
            .export(&[dir.path().join("aligned_CT").as_path()], dir.path(), &ProgressTracker::new())
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Registration(RegistrationError::MissingArtifact { .. })
        ));
    }
}
