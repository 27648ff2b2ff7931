//! Spatial transforms used by in-process reslicing.

pub mod trait_;
pub mod translation;

pub use trait_::{IdentityTransform, Transform};
pub use translation::TranslationTransform;
