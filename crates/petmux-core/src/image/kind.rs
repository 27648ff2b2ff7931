//! Volume kinds.

use serde::{Deserialize, Serialize};

/// How the voxel values of a volume may be interpolated.
///
/// Intensity volumes (CT, PET) are continuous and resampled linearly. Label
/// volumes hold discrete region ids and must never be blended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeKind {
    Intensity,
    Label,
}
