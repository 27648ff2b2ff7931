//! Error types for pipeline stages.

use std::path::PathBuf;

use petmux_core::CoreError;
use petmux_registration::RegistrationError;
use thiserror::Error;

/// Main error type for `petmux-pipeline`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// No acquisition passed the compliance check.
    #[error("No compliant acquisitions:\n{}", .0.join("\n"))]
    Compliance(Vec<String>),

    /// Invalid configuration or run options.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A volume could not be read or written.
    #[error("Image I/O failed: {0:#}")]
    ImageIo(anyhow::Error),

    /// A worker pool could not be built.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        Self::ImageIo(err)
    }
}

impl From<rayon::ThreadPoolBuildError> for PipelineError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool(err.to_string())
    }
}
