//! Core volume operations for multi-tracer PET/CT alignment.
//!
//! This crate provides:
//! - [`Image`]: 3-D volumes with physical geometry, backed by burn tensors
//! - Interpolation, transforms and reslicing between grids
//! - Mask algebra: bounding boxes, common field of view, region labels
//! - The multiplexing compositor that maps tracers onto RGB channels

pub mod error;
pub mod filter;
pub mod image;
pub mod interpolation;
pub mod mask;
pub mod multiplex;
pub mod spatial;
pub mod transform;

pub use error::{CoreError, Result};
pub use image::{Image, ImageGeometry, VolumeKind};
