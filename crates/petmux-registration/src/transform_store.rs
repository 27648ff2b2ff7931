//! Transform artifacts on disk.
//!
//! Each moving acquisition owns one file per registration stage, named
//! `<moving_id><suffix>`. Files are written once; a stage whose file already
//! exists is not recomputed.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, Result};

/// Registration stage that produced a transform artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Rigid,
    Affine,
    ForwardWarp,
    InverseWarp,
}

impl TransformKind {
    pub const ALL: [TransformKind; 4] = [
        TransformKind::Rigid,
        TransformKind::Affine,
        TransformKind::ForwardWarp,
        TransformKind::InverseWarp,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            TransformKind::Rigid => "_rigid.mat",
            TransformKind::Affine => "_affine.mat",
            TransformKind::ForwardWarp => "_warp.nii.gz",
            TransformKind::InverseWarp => "_inverse_warp.nii.gz",
        }
    }
}

/// Transform artifacts of one moving acquisition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSet {
    pub rigid: Option<PathBuf>,
    pub affine: Option<PathBuf>,
    pub forward_warp: Option<PathBuf>,
    /// Kept alongside the forward warp; nothing in the pipeline consumes it.
    pub inverse_warp: Option<PathBuf>,
}

impl TransformSet {
    pub fn get(&self, kind: TransformKind) -> Option<&Path> {
        match kind {
            TransformKind::Rigid => self.rigid.as_deref(),
            TransformKind::Affine => self.affine.as_deref(),
            TransformKind::ForwardWarp => self.forward_warp.as_deref(),
            TransformKind::InverseWarp => self.inverse_warp.as_deref(),
        }
    }

    /// Record an artifact; an already recorded stage keeps its first path.
    pub fn insert(&mut self, kind: TransformKind, path: PathBuf) {
        let slot = match kind {
            TransformKind::Rigid => &mut self.rigid,
            TransformKind::Affine => &mut self.affine,
            TransformKind::ForwardWarp => &mut self.forward_warp,
            TransformKind::InverseWarp => &mut self.inverse_warp,
        };
        slot.get_or_insert(path);
    }

    /// Transforms to apply when reslicing, newest first.
    ///
    /// `[warp, affine]` for a deformable chain, otherwise the affine or the
    /// rigid transform alone.
    pub fn chain(&self) -> Vec<&Path> {
        match (self.forward_warp.as_deref(), self.affine.as_deref(), self.rigid.as_deref()) {
            (Some(warp), Some(affine), _) => vec![warp, affine],
            (Some(warp), None, Some(rigid)) => vec![warp, rigid],
            (Some(warp), None, None) => vec![warp],
            (None, Some(affine), _) => vec![affine],
            (None, None, Some(rigid)) => vec![rigid],
            (None, None, None) => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chain().is_empty()
    }

    /// Every recorded artifact.
    pub fn artifacts(&self) -> impl Iterator<Item = (TransformKind, &Path)> {
        TransformKind::ALL
            .into_iter()
            .filter_map(move |kind| self.get(kind).map(|path| (kind, path)))
    }
}

/// Directory holding transform artifacts.
#[derive(Debug, Clone)]
pub struct TransformStore {
    dir: PathBuf,
}

impl TransformStore {
    /// Open (and create if needed) the artifact directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| RegistrationError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, moving_id: &str, kind: TransformKind) -> PathBuf {
        self.dir.join(format!("{moving_id}{}", kind.suffix()))
    }

    /// Artifacts already present on disk for `moving_id`.
    pub fn existing(&self, moving_id: &str) -> TransformSet {
        let mut set = TransformSet::default();
        for kind in TransformKind::ALL {
            let path = self.path_for(moving_id, kind);
            if path.exists() {
                set.insert(kind, path);
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_chain_order() {
        let mut set = TransformSet::default();
        assert!(set.is_empty());

        set.insert(TransformKind::Rigid, PathBuf::from("m_rigid.mat"));
        assert_eq!(set.chain(), vec![Path::new("m_rigid.mat")]);

        set.insert(TransformKind::Affine, PathBuf::from("m_affine.mat"));
        assert_eq!(set.chain(), vec![Path::new("m_affine.mat")]);

        set.insert(TransformKind::ForwardWarp, PathBuf::from("m_warp.nii.gz"));
        assert_eq!(
            set.chain(),
            vec![Path::new("m_warp.nii.gz"), Path::new("m_affine.mat")]
        );
    }

    #[test]
    fn test_insert_is_append_only() {
        let mut set = TransformSet::default();
        set.insert(TransformKind::Affine, PathBuf::from("first.mat"));
        set.insert(TransformKind::Affine, PathBuf::from("second.mat"));
        assert_eq!(set.affine.as_deref(), Some(Path::new("first.mat")));
    }

    #[test]
    fn test_store_naming_and_existing() {
        let dir = tempdir().unwrap();
        let store = TransformStore::open(dir.path().join("transforms")).unwrap();
        let affine = store.path_for("PSMA", TransformKind::Affine);
        assert!(affine.ends_with("PSMA_affine.mat"));
        assert!(store
            .path_for("PSMA", TransformKind::InverseWarp)
            .ends_with("PSMA_inverse_warp.nii.gz"));

        assert!(store.existing("PSMA").is_empty());
        fs::write(&affine, "1 0 0 0").unwrap();
        let existing = store.existing("PSMA");
        assert_eq!(existing.affine.as_deref(), Some(affine.as_path()));
        assert_eq!(existing.artifacts().count(), 1);
    }
}
