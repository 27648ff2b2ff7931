//! Pipeline configuration and per-run options.
//!
//! [`PipelineConfig`] is built once, from defaults or a partial JSON file,
//! and handed to every stage by reference. [`RunOptions`] holds the choices
//! of one invocation and is validated into a [`RunPlan`] before any volume
//! is touched.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use petmux_core::mask::{LabelIndex, RegionSelection};
use petmux_core::multiplex::{Channel, ChannelAssignment, LumaWeights};
use petmux_registration::RegistrationSettings;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// External segmentation model settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationSettings {
    pub executable: PathBuf,
    /// Model producing the body-extent mask.
    pub body_model: String,
    /// Model producing the multi-region mask.
    pub region_model: String,
    /// Accelerator hint passed to the model, such as `cuda` or `cpu`.
    pub accelerator: String,
}

impl Default for SegmentationSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("moosez"),
            body_model: "clin_ct_body".to_string(),
            region_model: "clin_ct_PUMA".to_string(),
            accelerator: "cuda".to_string(),
        }
    }
}

/// File and folder names used on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConvention {
    pub anatomical_prefixes: Vec<String>,
    pub functional_prefixes: Vec<String>,
    pub resampled_prefix: String,
    pub aligned_prefix: String,
    /// Working directory created under the subject directory.
    pub working_folder: String,
    pub anatomical_folder: String,
    pub functional_folder: String,
    pub region_mask_folder: String,
    pub body_mask_folder: String,
    pub guidance_mask_folder: String,
    pub common_fov_folder: String,
    pub transforms_folder: String,
    /// Per-acquisition segmentation output, inside the acquisition directory.
    pub segmentation_folder: String,
    pub composite_file: String,
    pub grayscale_file: String,
    /// Per-label agreement report, in the working folder.
    pub evaluation_file: String,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self {
            anatomical_prefixes: vec!["CT".to_string()],
            functional_prefixes: vec!["PT".to_string(), "PET".to_string()],
            resampled_prefix: "resampled_".to_string(),
            aligned_prefix: "aligned_".to_string(),
            working_folder: "petmux".to_string(),
            anatomical_folder: "CT".to_string(),
            functional_folder: "PT".to_string(),
            region_mask_folder: "MASK".to_string(),
            body_mask_folder: "body_masks".to_string(),
            guidance_mask_folder: "guidance_masks".to_string(),
            common_fov_folder: "common_fov_masks".to_string(),
            transforms_folder: "transforms".to_string(),
            segmentation_folder: "segmentations".to_string(),
            composite_file: "multiplexed_composite_image.nii.gz".to_string(),
            grayscale_file: "multiplexed_grayscale_image.nii.gz".to_string(),
            evaluation_file: "label_metrics.json".to_string(),
        }
    }
}

impl NamingConvention {
    fn has_prefix(prefixes: &[String], file_name: &str) -> bool {
        prefixes.iter().any(|prefix| {
            file_name
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_alphanumeric()))
        })
    }

    /// `CT_abdomen.nii.gz` is anatomical, `CTX.nii` is not.
    pub fn is_anatomical(&self, file_name: &str) -> bool {
        Self::has_prefix(&self.anatomical_prefixes, file_name)
    }

    pub fn is_functional(&self, file_name: &str) -> bool {
        Self::has_prefix(&self.functional_prefixes, file_name)
    }

    /// `<aligned_prefix><folder>`, such as `aligned_PT`.
    pub fn aligned_folder(&self, folder: &str) -> String {
        format!("{}{}", self.aligned_prefix, folder)
    }
}

/// Immutable configuration shared by every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub registration: RegistrationSettings,
    pub segmentation: SegmentationSettings,
    /// NIfTI to DICOM converter, invoked as `<exporter> <input> <output>`.
    pub dicom_exporter: Option<PathBuf>,
    pub labels: LabelIndex,
    /// Label given to body voxels the region model left unlabelled.
    pub filler_label: u8,
    pub naming: NamingConvention,
    pub luma: LumaWeights,
    /// Compute pool size; available parallelism when unset.
    pub workers: Option<usize>,
    pub io_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            registration: RegistrationSettings::default(),
            segmentation: SegmentationSettings::default(),
            dicom_exporter: None,
            labels: LabelIndex::default(),
            filler_label: 2,
            naming: NamingConvention::default(),
            luma: LumaWeights::default(),
            workers: None,
            io_workers: 4,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON file; absent keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| PipelineError::configuration(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded pipeline configuration");
        Ok(config)
    }

    pub fn compute_workers(&self) -> usize {
        self.workers
            .unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1)
    }

    pub fn io_workers(&self) -> usize {
        self.io_workers.max(1)
    }
}

/// Choices of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Region names left out of registration guidance, or `none`.
    pub ignore_regions: Vec<String>,
    pub multiplex: bool,
    /// Explicit `tracer:colour` pairs; channels are chosen per run when empty.
    pub channel_map: Vec<(String, String)>,
    pub dicom_export: bool,
    /// Compare every aligned mask with the reference mask.
    pub evaluate: bool,
}

/// [`RunOptions`] after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub regions: RegionSelection,
    pub multiplex: bool,
    pub channels: Option<ChannelAssignment>,
    pub dicom_export: bool,
    pub evaluate: bool,
}

impl RunOptions {
    /// Parse `"FDG:red,PSMA:g"` into tracer/colour pairs.
    pub fn parse_channel_map(text: &str) -> Result<Vec<(String, String)>> {
        text.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| match item.split_once(':') {
                Some((tracer, colour)) if !tracer.trim().is_empty() => {
                    Ok((tracer.trim().to_string(), colour.trim().to_string()))
                }
                _ => Err(PipelineError::configuration(format!(
                    "channel map entry '{item}' is not of the form tracer:colour"
                ))),
            })
            .collect()
    }

    /// Reject inconsistent options before any heavy work starts.
    pub fn validate(&self, config: &PipelineConfig) -> Result<RunPlan> {
        let regions = RegionSelection::parse(&self.ignore_regions, &config.labels)?;

        let channels = if self.channel_map.is_empty() {
            None
        } else {
            if !self.multiplex {
                return Err(PipelineError::configuration(
                    "a channel map was given without multiplexing",
                ));
            }
            let entries = self
                .channel_map
                .iter()
                .map(|(tracer, colour)| Ok((tracer.clone(), colour.parse::<Channel>()?)))
                .collect::<Result<Vec<_>>>()?;
            Some(ChannelAssignment::new(entries)?)
        };

        if self.dicom_export && config.dicom_exporter.is_none() {
            return Err(PipelineError::configuration(
                "DICOM export requested but no exporter is configured",
            ));
        }

        Ok(RunPlan {
            regions,
            multiplex: self.multiplex,
            channels,
            dicom_export: self.dicom_export,
            evaluate: self.evaluate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petmux_core::CoreError;
    use tempfile::tempdir;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "io_workers": 2, "registration": { "schedule": "50x10" }, "naming": { "working_folder": "work" } }"#,
        )
        .unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.io_workers(), 2);
        assert_eq!(config.registration.schedule.to_string(), "50x10");
        assert_eq!(config.naming.working_folder, "work");
        assert_eq!(config.naming.functional_prefixes, vec!["PT", "PET"]);
        assert_eq!(config.filler_label, 2);
        assert_eq!(config.segmentation.region_model, "clin_ct_PUMA");
    }

    #[test]
    fn test_bad_json_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "registration": { "schedule": "0x0" } }"#).unwrap();
        assert!(matches!(
            PipelineConfig::from_file(&path),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_prefix_matching() {
        let naming = NamingConvention::default();
        assert!(naming.is_anatomical("CT_thorax.nii.gz"));
        assert!(naming.is_functional("PT_FDG.nii.gz"));
        assert!(naming.is_functional("PET_PSMA.nii"));
        assert!(!naming.is_anatomical("CTA.nii"));
        assert!(!naming.is_functional("CT_x.nii"));
    }

    #[test]
    fn test_channel_map_parsing() {
        let pairs = RunOptions::parse_channel_map("FDG:red, PSMA:g").unwrap();
        assert_eq!(pairs[1], ("PSMA".to_string(), "g".to_string()));
        assert!(RunOptions::parse_channel_map("FDG").is_err());
    }

    #[test]
    fn test_validation_rejects_inconsistent_options() {
        let config = PipelineConfig::default();

        let unknown_region = RunOptions {
            ignore_regions: vec!["tail".to_string()],
            ..RunOptions::default()
        };
        assert!(matches!(
            unknown_region.validate(&config),
            Err(PipelineError::Core(CoreError::UnknownRegion { .. }))
        ));

        let map_without_multiplex = RunOptions {
            channel_map: vec![("FDG".to_string(), "red".to_string())],
            ..RunOptions::default()
        };
        assert!(matches!(
            map_without_multiplex.validate(&config),
            Err(PipelineError::Configuration(_))
        ));

        let reused = RunOptions {
            multiplex: true,
            channel_map: vec![
                ("FDG".to_string(), "red".to_string()),
                ("PSMA".to_string(), "r".to_string()),
            ],
            ..RunOptions::default()
        };
        assert!(matches!(
            reused.validate(&config),
            Err(PipelineError::Core(CoreError::DuplicateChannel(Channel::Red)))
        ));

        let export = RunOptions {
            dicom_export: true,
            ..RunOptions::default()
        };
        assert!(export.validate(&config).is_err());
    }

    #[test]
    fn test_valid_plan() {
        let options = RunOptions {
            ignore_regions: vec!["arms".to_string(), "head".to_string()],
            multiplex: true,
            channel_map: vec![("FDG".to_string(), "blue".to_string())],
            dicom_export: false,
            evaluate: true,
        };
        let plan = options.validate(&PipelineConfig::default()).unwrap();
        assert!(plan.evaluate);
        assert!(plan.regions.is_ignored(4));
        assert!(plan.regions.is_ignored(3));
        assert!(!plan.regions.is_ignored(1));
        assert_eq!(plan.channels.unwrap().channel_of("FDG"), Some(Channel::Blue));
    }
}
