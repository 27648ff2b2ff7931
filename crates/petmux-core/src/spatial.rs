//! Spatial types for physical coordinates.
//!
//! Thin aliases over nalgebra. Index-space vectors are ordered (x, y, z),
//! while tensor shapes are ordered [z, y, x].

use nalgebra::{Matrix3, Point3 as NaPoint3, Vector3 as NaVector3};

pub type Point3 = NaPoint3<f64>;
pub type Vector3 = NaVector3<f64>;
pub type Spacing3 = NaVector3<f64>;
pub type Direction3 = Matrix3<f64>;

/// Tolerance used when comparing geometries read from different files.
pub const GEOMETRY_TOLERANCE: f64 = 1e-4;
