//! Command lines for the Greedy registration tool.

use std::path::{Path, PathBuf};

use petmux_core::VolumeKind;

use crate::schedule::{IterationSchedule, SimilarityMetric};
use crate::tool::ToolInvocation;

/// Degrees of freedom of a linear registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearModel {
    Rigid,
    Affine,
}

impl LinearModel {
    pub fn dof(self) -> u32 {
        match self {
            LinearModel::Rigid => 6,
            LinearModel::Affine => 12,
        }
    }
}

/// Optional registration masks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Masks<'a> {
    pub fixed: Option<&'a Path>,
    pub moving: Option<&'a Path>,
}

/// Builds invocations of a Greedy-compatible executable.
#[derive(Debug, Clone)]
pub struct Greedy {
    program: PathBuf,
    threads: Option<usize>,
}

impl Greedy {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            threads: None,
        }
    }

    /// Cap the threads used by each invocation.
    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    fn base(&self) -> ToolInvocation {
        let invocation = ToolInvocation::new(&self.program).args(["-d", "3"]);
        match self.threads {
            Some(n) => invocation.arg("-threads").arg(n.to_string()),
            None => invocation,
        }
    }

    fn with_masks(invocation: ToolInvocation, masks: Masks<'_>) -> ToolInvocation {
        let invocation = match masks.fixed {
            Some(mask) => invocation.arg("-gm").path_arg(mask),
            None => invocation,
        };
        match masks.moving {
            Some(mask) => invocation.arg("-mm").path_arg(mask),
            None => invocation,
        }
    }

    /// Linear registration initialised by aligning the image centres.
    #[allow(clippy::too_many_arguments)]
    pub fn linear(
        &self,
        model: LinearModel,
        fixed: &Path,
        moving: &Path,
        masks: Masks<'_>,
        metric: &SimilarityMetric,
        schedule: &IterationSchedule,
        output: &Path,
    ) -> ToolInvocation {
        let invocation = self
            .base()
            .arg("-a")
            .arg("-i")
            .path_arg(fixed)
            .path_arg(moving)
            .arg("-ia-image-centers")
            .arg("-dof")
            .arg(model.dof().to_string())
            .arg("-o")
            .path_arg(output)
            .arg("-n")
            .arg(schedule.to_string())
            .arg("-m")
            .args(metric.greedy_args());
        Self::with_masks(invocation, masks)
    }

    /// Deformable registration starting from an affine transform.
    #[allow(clippy::too_many_arguments)]
    pub fn deformable(
        &self,
        fixed: &Path,
        moving: &Path,
        masks: Masks<'_>,
        affine: &Path,
        metric: &SimilarityMetric,
        schedule: &IterationSchedule,
        warp: &Path,
        inverse_warp: &Path,
    ) -> ToolInvocation {
        let invocation = self
            .base()
            .arg("-m")
            .args(metric.greedy_args())
            .arg("-i")
            .path_arg(fixed)
            .path_arg(moving)
            .arg("-it")
            .path_arg(affine)
            .arg("-o")
            .path_arg(warp)
            .arg("-oinv")
            .path_arg(inverse_warp)
            .arg("-sv")
            .arg("-n")
            .arg(schedule.to_string());
        Self::with_masks(invocation, masks)
    }

    /// Reslice volumes into `reference` through `transforms` (newest first).
    ///
    /// Intensity volumes use linear interpolation, label volumes majority
    /// voting over a 0.2 voxel neighbourhood.
    pub fn reslice(&self, reference: &Path, volumes: &[(VolumeKind, &Path, &Path)], transforms: &[&Path]) -> ToolInvocation {
        let mut invocation = self.base().arg("-rf").path_arg(reference);
        for (kind, input, output) in volumes {
            invocation = match kind {
                VolumeKind::Intensity => invocation.args(["-ri", "LINEAR"]),
                VolumeKind::Label => invocation.args(["-ri", "LABEL", "0.2vox"]),
            };
            invocation = invocation.arg("-rm").path_arg(input).path_arg(output);
        }
        invocation = invocation.arg("-r");
        for transform in transforms {
            invocation = invocation.path_arg(transform);
        }
        invocation
    }
}
