//! Registration through an external Greedy-compatible executable.
//!
//! This crate drives the registration tool as an opaque subprocess:
//! - [`tool`]: subprocess execution with typed failures
//! - [`greedy`]: command lines for registration and reslicing
//! - [`engine`]: rigid, affine and deformable registration stages
//! - [`transform_store`]: on-disk transform artifacts per moving volume
//! - [`resampler`]: replaying a transform chain onto companion volumes

pub mod engine;
pub mod error;
pub mod greedy;
pub mod resampler;
pub mod schedule;
pub mod tool;
pub mod transform_store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{RegistrationEngine, RegistrationMode, RegistrationRequest, RegistrationSettings};
pub use error::{RegistrationError, Result};
pub use resampler::{ResampleJob, ResampleVolume, Resampler};
pub use schedule::{IterationSchedule, SimilarityMetric};
pub use tool::{ExitPolicy, ProcessRunner, ToolInvocation, ToolOutput, ToolRunner};
pub use transform_store::{TransformKind, TransformSet, TransformStore};
