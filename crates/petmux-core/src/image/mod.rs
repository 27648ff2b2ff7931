//! Volumes with physical metadata.

pub mod geometry;
pub mod grid;
pub mod image;
pub mod kind;

pub use geometry::ImageGeometry;
pub use image::Image;
pub use kind::VolumeKind;
