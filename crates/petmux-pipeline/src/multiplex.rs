//! Multiplexing of aligned functional volumes into one RGB composite.

use std::fs;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use petmux_core::multiplex::{compose, Channel, ChannelAssignment};
use petmux_core::Image;
use petmux_io::nifti_io::nifti_stem;
use petmux_io::{read_nifti, write_nifti, write_rgb_nifti};
use tracing::info;

use crate::acquisition::file_name;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::preprocess::WorkingLayout;
use crate::progress::{ProgressTracker, Stage};
use crate::registry::ArtifactRegistry;

/// Decides which tracers go on which channel.
pub trait ChannelChooser {
    /// Assign channels to up to three of `tracers`.
    fn choose(&self, tracers: &[String]) -> Result<ChannelAssignment>;
}

/// Red, green, blue in tracer order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialChooser;

impl ChannelChooser for SequentialChooser {
    fn choose(&self, tracers: &[String]) -> Result<ChannelAssignment> {
        Ok(ChannelAssignment::sequential(tracers)?)
    }
}

/// A fixed assignment given up front.
#[derive(Debug, Clone)]
pub struct ExplicitChooser(pub ChannelAssignment);

impl ChannelChooser for ExplicitChooser {
    fn choose(&self, _tracers: &[String]) -> Result<ChannelAssignment> {
        Ok(self.0.clone())
    }
}

/// Files written by the multiplexing stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiplexOutputs {
    pub composite: PathBuf,
    pub grayscale: PathBuf,
    /// Channel-tagged copy of each input volume.
    pub channels: Vec<(String, Channel, PathBuf)>,
}

pub struct Multiplexer<'a, B: Backend> {
    config: &'a PipelineConfig,
    progress: &'a ProgressTracker,
    device: B::Device,
}

impl<'a, B: Backend> Multiplexer<'a, B> {
    pub fn new(config: &'a PipelineConfig, progress: &'a ProgressTracker, device: B::Device) -> Self {
        Self {
            config,
            progress,
            device,
        }
    }

    /// Compose the aligned functional volumes recorded in `registry`.
    ///
    /// The assignment is validated against the aligned tracers before
    /// anything is read or written.
    pub fn run(
        &self,
        layout: &WorkingLayout,
        registry: &ArtifactRegistry,
        chooser: &dyn ChannelChooser,
    ) -> Result<MultiplexOutputs> {
        let aligned: Vec<(String, PathBuf)> = registry
            .iter()
            .filter_map(|(id, artifacts)| {
                artifacts
                    .aligned
                    .as_ref()
                    .map(|outputs| (id.to_string(), outputs.functional.clone()))
            })
            .collect();
        let tracers: Vec<String> = aligned.iter().map(|(id, _)| id.clone()).collect();

        let assignment = chooser.choose(&tracers)?;
        let inputs = assignment
            .entries()
            .iter()
            .map(|(tracer, _)| {
                aligned
                    .iter()
                    .find(|(id, _)| id == tracer)
                    .map(|(_, path)| path.clone())
                    .ok_or_else(|| {
                        PipelineError::configuration(format!(
                            "tracer '{tracer}' has no aligned volume (aligned: {})",
                            tracers.join(", ")
                        ))
                    })
            })
            .collect::<Result<Vec<PathBuf>>>()?;

        let stage = self.progress.start(Stage::Multiplexing, Some(inputs.len()));
        let volumes = inputs
            .iter()
            .map(|path| read_nifti::<B, _>(path, &self.device))
            .collect::<anyhow::Result<Vec<Image<B>>>>()?;
        let composite = stage.check(compose(&volumes, &assignment))?;

        let dir = &layout.aligned_functional;
        let composite_path = dir.join(&self.config.naming.composite_file);
        write_rgb_nifti(&composite_path, &composite)?;
        let grayscale_path = dir.join(&self.config.naming.grayscale_file);
        write_nifti(&grayscale_path, &composite.luminance(&self.config.luma)?)?;

        let mut channels = Vec::with_capacity(inputs.len());
        for ((tracer, channel), input) in assignment.entries().iter().zip(&inputs) {
            let tagged = dir.join(channel_tagged_name(input, *channel));
            fs::copy(input, &tagged).map_err(|e| PipelineError::io(&tagged, e))?;
            info!(tracer = %tracer, channel = %channel, "Tracer assigned to channel");
            stage.item(tracer.as_str());
            channels.push((tracer.clone(), *channel, tagged));
        }
        stage.complete();

        Ok(MultiplexOutputs {
            composite: composite_path,
            grayscale: grayscale_path,
            channels,
        })
    }
}

/// `aligned_FDG_PT.nii.gz` on red becomes `aligned_FDG_PT_R.nii.gz`.
pub fn channel_tagged_name(input: &Path, channel: Channel) -> String {
    let name = file_name(input);
    match nifti_stem(input) {
        Some(stem) => {
            let extension = &name[stem.len()..];
            format!("{stem}_{}{extension}", channel.suffix())
        }
        None => format!("{name}_{}", channel.suffix()),
    }
}
