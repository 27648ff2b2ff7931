//! Mask algebra: bounding boxes, the common field of view, region labels
//! and per-label agreement.

pub mod bounding_box;
pub mod common_fov;
pub mod labels;
pub mod overlap;

pub use bounding_box::BoundingBox;
pub use common_fov::{common_fov, CommonFovBuilder};
pub use labels::{binarize, exclude_regions, fill_against_body, label_values, LabelIndex, RegionSelection};
pub use overlap::{evaluate_label, evaluate_labels, hausdorff_distance, LabelMetrics};
