//! In-memory record of every artifact produced during a run.
//!
//! Stages look artifacts up here by acquisition id instead of matching file
//! names. The registry is ordered by id, so the first entry is the reference.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use petmux_core::mask::RegionSelection;
use petmux_registration::{IterationSchedule, RegistrationMode, RegistrationSettings, SimilarityMetric, TransformSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Aligned volumes of one acquisition in the reference frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignedOutputs {
    pub mask: PathBuf,
    pub anatomical: PathBuf,
    pub functional: PathBuf,
}

/// Artifacts of one acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionArtifacts {
    pub source_dir: PathBuf,
    /// Anatomical volume resliced into the functional grid.
    pub anatomical: PathBuf,
    pub functional: PathBuf,
    pub region_mask: PathBuf,
    pub body_mask: PathBuf,
    pub guidance_mask: PathBuf,
    /// Empty for the reference.
    #[serde(default)]
    pub transforms: TransformSet,
    #[serde(default)]
    pub aligned: Option<AlignedOutputs>,
}

/// Inputs that transforms and aligned volumes depend on.
///
/// Artifacts on disk are reused only when the run that wrote them had the
/// same provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentProvenance {
    pub reference: String,
    /// Every acquisition of the run; the common field of view depends on all of them.
    pub acquisitions: BTreeSet<String>,
    /// Region ids left out of the guidance masks.
    pub ignored_regions: BTreeSet<u8>,
    pub mode: RegistrationMode,
    pub schedule: IterationSchedule,
    pub linear_metric: SimilarityMetric,
    pub deformable_metric: SimilarityMetric,
}

impl AlignmentProvenance {
    pub fn new(registry: &ArtifactRegistry, regions: &RegionSelection, settings: &RegistrationSettings) -> Option<Self> {
        let (reference, _) = registry.reference()?;
        Some(Self {
            reference: reference.to_string(),
            acquisitions: registry.ids().map(str::to_string).collect(),
            ignored_regions: regions.ignored().collect(),
            mode: settings.mode,
            schedule: settings.schedule.clone(),
            linear_metric: settings.linear_metric,
            deformable_metric: settings.deformable_metric,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRegistry {
    #[serde(default)]
    provenance: Option<AlignmentProvenance>,
    entries: BTreeMap<String, AcquisitionArtifacts>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, artifacts: AcquisitionArtifacts) {
        self.entries.insert(id.into(), artifacts);
    }

    pub fn get(&self, id: &str) -> Option<&AcquisitionArtifacts> {
        self.entries.get(id)
    }

    /// Entry of `id`, or a configuration error naming it.
    pub fn require(&self, id: &str) -> Result<&AcquisitionArtifacts> {
        self.get(id)
            .ok_or_else(|| PipelineError::configuration(format!("no artifacts recorded for '{id}'")))
    }

    pub fn provenance(&self) -> Option<&AlignmentProvenance> {
        self.provenance.as_ref()
    }

    pub fn set_provenance(&mut self, provenance: AlignmentProvenance) {
        self.provenance = Some(provenance);
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut AcquisitionArtifacts> {
        self.entries.get_mut(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AcquisitionArtifacts)> {
        self.entries.iter().map(|(id, a)| (id.as_str(), a))
    }

    /// First id in sorted order.
    pub fn reference(&self) -> Option<(&str, &AcquisitionArtifacts)> {
        self.iter().next()
    }

    /// Every entry after the reference.
    pub fn moving(&self) -> impl Iterator<Item = (&str, &AcquisitionArtifacts)> {
        self.iter().skip(1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::configuration(format!("registry serialisation: {e}")))?;
        fs::write(path, json).map_err(|e| PipelineError::io(path, e))?;
        debug!(path = %path.display(), entries = self.len(), "Wrote artifact registry");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| PipelineError::configuration(format!("{}: {e}", path.display())))
    }
}
