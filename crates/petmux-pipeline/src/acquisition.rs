//! Tracer acquisitions and the input compliance check.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use petmux_io::nifti_io::is_nifti_path;
use tracing::{info, warn};

use crate::config::NamingConvention;
use crate::error::{PipelineError, Result};

/// Role of a volume within an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Anatomical,
    Functional,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Anatomical => f.write_str("anatomical"),
            Modality::Functional => f.write_str("functional"),
        }
    }
}

/// One tracer session: an anatomical and a functional volume of one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    /// Directory name, unique within the subject.
    pub id: String,
    pub dir: PathBuf,
    pub anatomical: PathBuf,
    pub functional: PathBuf,
}

/// Why a directory was not accepted as an acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceIssue {
    pub dir: PathBuf,
    pub reason: String,
}

impl fmt::Display for ComplianceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.dir.display(), self.reason)
    }
}

impl Acquisition {
    /// Inspect `dir`; it must hold exactly one NIfTI volume of each modality.
    pub fn from_dir(dir: &Path, naming: &NamingConvention) -> std::result::Result<Self, ComplianceIssue> {
        let issue = |reason: String| ComplianceIssue {
            dir: dir.to_path_buf(),
            reason,
        };

        let id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| issue("directory has no name".to_string()))?;
        let entries = fs::read_dir(dir).map_err(|e| issue(format!("cannot be read: {e}")))?;

        let mut anatomical = Vec::new();
        let mut functional = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || !is_nifti_path(&path) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if naming.is_anatomical(&name) {
                anatomical.push(path);
            } else if naming.is_functional(&name) {
                functional.push(path);
            }
        }

        let anatomical = Self::single(anatomical, Modality::Anatomical, &naming.anatomical_prefixes).map_err(issue)?;
        let functional = Self::single(functional, Modality::Functional, &naming.functional_prefixes).map_err(issue)?;
        Ok(Self {
            id,
            dir: dir.to_path_buf(),
            anatomical,
            functional,
        })
    }

    fn single(mut found: Vec<PathBuf>, modality: Modality, prefixes: &[String]) -> std::result::Result<PathBuf, String> {
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(format!("no {modality} volume (prefix {})", prefixes.join(" or "))),
            n => Err(format!("{n} {modality} volumes, expected exactly one")),
        }
    }

    pub fn anatomical_name(&self) -> String {
        file_name(&self.anatomical)
    }

    pub fn functional_name(&self) -> String {
        file_name(&self.functional)
    }
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Sorted subdirectories of `subject_dir`, the working folder excluded.
pub fn list_acquisition_dirs(subject_dir: &Path, naming: &NamingConvention) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(subject_dir)
        .map_err(|e| PipelineError::io(subject_dir, e))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && file_name(path) != naming.working_folder)
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Keep the compliant directories, sorted by id.
///
/// Every issue is logged; the run only fails when nothing is left.
pub fn select_compliant<P: AsRef<Path>>(dirs: &[P], naming: &NamingConvention) -> Result<Vec<Acquisition>> {
    let mut acquisitions = Vec::new();
    let mut issues = Vec::new();
    for dir in dirs {
        match Acquisition::from_dir(dir.as_ref(), naming) {
            Ok(acquisition) => acquisitions.push(acquisition),
            Err(issue) => {
                warn!("Skipping non-compliant acquisition {issue}");
                issues.push(issue);
            }
        }
    }

    if acquisitions.is_empty() {
        return Err(PipelineError::Compliance(issues.iter().map(ToString::to_string).collect()));
    }
    acquisitions.sort_by(|a, b| a.id.cmp(&b.id));
    info!(
        compliant = acquisitions.len(),
        skipped = issues.len(),
        "Compliance check finished"
    );
    Ok(acquisitions)
}
