//! Region label volumes.
//!
//! Fine multi-region segmentations carry one id per anatomical region; coarse
//! body segmentations only mark the body extent. These helpers reconcile the
//! two and derive masks from selected regions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::image::Image;

/// Sentinel region name meaning "ignore nothing".
pub const NO_REGIONS: &str = "none";

/// Ordered map from label id to region name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelIndex(BTreeMap<u8, String>);

impl Default for LabelIndex {
    fn default() -> Self {
        Self::new([(1, "legs"), (2, "body"), (3, "head"), (4, "arms")])
    }
}

impl LabelIndex {
    pub fn new<'a>(entries: impl IntoIterator<Item = (u8, &'a str)>) -> Self {
        Self(entries.into_iter().map(|(id, name)| (id, name.to_string())).collect())
    }

    /// Id of a region name, case insensitive.
    pub fn id_of(&self, name: &str) -> Option<u8> {
        self.0
            .iter()
            .find(|(_, region)| region.eq_ignore_ascii_case(name))
            .map(|(&id, _)| id)
    }

    pub fn name_of(&self, id: u8) -> Option<&str> {
        self.0.get(&id).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
        self.0.iter().map(|(&id, name)| (id, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for LabelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.values().map(String::as_str).collect();
        write!(f, "{}", names.join(", "))
    }
}

/// Regions to leave out of the registration guidance mask.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegionSelection {
    #[default]
    IncludeAll,
    Ignore(BTreeSet<u8>),
}

impl RegionSelection {
    /// Parse region names against `index`.
    ///
    /// A single `none` (or no names at all) keeps every region.
    pub fn parse<S: AsRef<str>>(names: &[S], index: &LabelIndex) -> Result<Self> {
        if names.is_empty() || (names.len() == 1 && names[0].as_ref().eq_ignore_ascii_case(NO_REGIONS)) {
            return Ok(Self::IncludeAll);
        }

        let mut ignored = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            let id = index.id_of(name).ok_or_else(|| CoreError::UnknownRegion {
                name: name.to_string(),
                known: index.to_string(),
            })?;
            ignored.insert(id);
        }
        Ok(Self::Ignore(ignored))
    }

    pub fn ignored(&self) -> impl Iterator<Item = u8> + '_ {
        let ids = match self {
            Self::IncludeAll => None,
            Self::Ignore(ids) => Some(ids.iter().copied()),
        };
        ids.into_iter().flatten()
    }

    pub fn is_ignored(&self, id: u8) -> bool {
        matches!(self, Self::Ignore(ids) if ids.contains(&id))
    }
}

/// Give unsegmented body voxels the filler label.
///
/// Voxels labelled in `fine` keep their label; voxels unlabelled in `fine`
/// but inside `coarse` take `filler`; the rest are 0.
pub fn fill_against_body<B: Backend>(fine: &Image<B>, coarse: &Image<B>, filler: u8) -> Result<Image<B>> {
    if fine.shape() != coarse.shape() {
        return Err(CoreError::shape_mismatch(fine.shape(), coarse.shape()));
    }
    let fine_data = fine.data().clone().round();
    let labelled = fine_data.clone().greater_elem(0.0).float();
    let body = coarse.data().clone().greater_elem(0.0).float();

    let unlabelled = labelled.clone().neg() + 1.0;
    let filled = fine_data * labelled + unlabelled * body * filler as f32;
    fine.with_data(filled)
}

/// Zero every voxel whose id is ignored by `selection`; others keep their id.
pub fn exclude_regions<B: Backend>(mask: &Image<B>, selection: &RegionSelection) -> Result<Image<B>> {
    let mut data = mask.data().clone().round();
    for id in selection.ignored() {
        let keep = data.clone().equal_elem(id as f32).float().neg() + 1.0;
        data = data * keep;
    }
    mask.with_data(data)
}

/// Non-zero voxels become 1.
pub fn binarize<B: Backend>(mask: &Image<B>) -> Result<Image<B>> {
    mask.with_data(mask.data().clone().greater_elem(0.0).float())
}

/// Distinct non-zero label ids present in `mask`.
pub fn label_values<B: Backend>(mask: &Image<B>) -> Result<BTreeSet<u8>> {
    Ok(mask
        .to_voxels()?
        .into_iter()
        .map(|v| v.round())
        .filter(|&v| v > 0.0)
        .map(|v| v.min(u8::MAX as f32) as u8)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageGeometry;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn volume(voxels: Vec<f32>) -> Image<TestBackend> {
        let geometry = ImageGeometry::with_size([voxels.len(), 1, 1]);
        Image::from_voxels(voxels, geometry, &Default::default()).unwrap()
    }

    #[test]
    fn test_label_index_lookup() {
        let index = LabelIndex::default();
        assert_eq!(index.id_of("Head"), Some(3));
        assert_eq!(index.name_of(4), Some("arms"));
        assert_eq!(index.id_of("tail"), None);
        assert_eq!(index.to_string(), "legs, body, head, arms");
    }

    #[test]
    fn test_region_selection_parse() {
        let index = LabelIndex::default();
        assert_eq!(RegionSelection::parse(&["none"], &index).unwrap(), RegionSelection::IncludeAll);
        assert_eq!(
            RegionSelection::parse::<&str>(&[], &index).unwrap(),
            RegionSelection::IncludeAll
        );

        let selection = RegionSelection::parse(&["head", "arms"], &index).unwrap();
        assert!(selection.is_ignored(3));
        assert!(selection.is_ignored(4));
        assert!(!selection.is_ignored(1));

        let err = RegionSelection::parse(&["head", "tail"], &index).unwrap_err();
        assert!(matches!(err, CoreError::UnknownRegion { ref name, .. } if name == "tail"));
    }

    #[test]
    fn test_fill_against_body() {
        let fine = volume(vec![0.0, 1.0, 0.0, 3.0, 0.0]);
        let coarse = volume(vec![0.0, 1.0, 1.0, 1.0, 0.0]);
        let filled = fill_against_body(&fine, &coarse, 2).unwrap();
        assert_eq!(filled.to_voxels().unwrap(), vec![0.0, 1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_fill_against_body_shape_mismatch() {
        let fine = volume(vec![0.0, 1.0]);
        let coarse = volume(vec![0.0, 1.0, 1.0]);
        assert!(matches!(
            fill_against_body(&fine, &coarse, 2),
            Err(CoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_exclusion_preserves_identity_and_binarize_collapses() {
        let index = LabelIndex::default();
        let mask = volume(vec![0.0, 1.0, 2.0, 3.0, 4.0, 3.0]);
        let selection = RegionSelection::parse(&["head"], &index).unwrap();

        let excluded = exclude_regions(&mask, &selection).unwrap();
        assert_eq!(excluded.to_voxels().unwrap(), vec![0.0, 1.0, 2.0, 0.0, 4.0, 0.0]);
        assert_eq!(label_values(&excluded).unwrap(), BTreeSet::from([1, 2, 4]));

        let binary = binarize(&excluded).unwrap();
        assert_eq!(binary.to_voxels().unwrap(), vec![0.0, 1.0, 1.0, 0.0, 1.0, 0.0]);
        assert_eq!(label_values(&binary).unwrap(), BTreeSet::from([1]));
    }

    #[test]
    fn test_include_all_keeps_every_region() {
        let mask = volume(vec![1.0, 2.0, 3.0, 4.0]);
        let kept = exclude_regions(&mask, &RegionSelection::IncludeAll).unwrap();
        assert_eq!(kept.to_voxels().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }
}
