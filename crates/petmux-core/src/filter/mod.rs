//! Image filters.

pub mod resample;
pub mod reslice;

pub use resample::ResampleImageFilter;
pub use reslice::{reslice_identity, ResliceAlignment};
