//! Multi-tracer alignment pipeline.
//!
//! Stages, in run order:
//! - [`acquisition`]: compliance check of the input directories
//! - [`preprocess`]: intra-acquisition reslicing, segmentation, consolidation
//! - [`fov`]: common field of view across body masks
//! - [`align`]: registration of every acquisition to the reference
//! - [`evaluate`]: optional label agreement with the reference
//! - [`multiplex`]: RGB composite of the aligned functional volumes
//! - [`export`]: optional DICOM re-export
//!
//! [`pipeline::Pipeline`] chains them; [`registry::ArtifactRegistry`]
//! carries every artifact path from one stage to the next.

pub mod acquisition;
pub mod align;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod export;
pub mod fov;
pub mod multiplex;
pub mod pipeline;
pub mod preprocess;
pub mod progress;
pub mod registry;
pub mod segmentation;

pub use acquisition::{list_acquisition_dirs, select_compliant, Acquisition, ComplianceIssue, Modality};
pub use align::{Aligner, AlignmentStage, AlignmentSummary};
pub use config::{NamingConvention, PipelineConfig, RunOptions, RunPlan, SegmentationSettings};
pub use error::{PipelineError, Result};
pub use evaluate::{AcquisitionEvaluation, EvaluationReport, Evaluator};
pub use multiplex::{ChannelChooser, ExplicitChooser, MultiplexOutputs, Multiplexer, SequentialChooser};
pub use pipeline::{Pipeline, RunReport};
pub use preprocess::{Preprocessor, WorkingLayout};
pub use progress::{ConsoleProgressCallback, HistoryCallback, ProgressCallback, ProgressTracker, Stage};
pub use registry::{AcquisitionArtifacts, AlignedOutputs, AlignmentProvenance, ArtifactRegistry};
pub use segmentation::{ExternalSegmenter, SegmentationModel};
