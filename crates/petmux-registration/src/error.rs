//! Error types for registration operations.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// An external tool ran but reported failure.
    #[error("External tool '{tool}' failed ({}): {stderr}", describe_status(.status))]
    ExternalTool {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },

    /// An external tool could not be started.
    #[error("Failed to start '{tool}': {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// A step finished without producing its output file.
    #[error("Expected artifact {} is missing after {step}", .path.display())]
    MissingArtifact { path: PathBuf, step: String },

    /// Iteration schedule did not parse.
    #[error("Invalid iteration schedule: {0}")]
    InvalidSchedule(String),

    /// Similarity metric did not parse.
    #[error("Invalid similarity metric: {0}")]
    InvalidMetric(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Filesystem error around an artifact.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create a missing artifact error.
    pub fn missing_artifact(path: impl Into<PathBuf>, step: impl Into<String>) -> Self {
        Self::MissingArtifact {
            path: path.into(),
            step: step.into(),
        }
    }

    /// Create an invalid schedule error.
    pub fn invalid_schedule(msg: impl Into<String>) -> Self {
        Self::InvalidSchedule(msg.into())
    }

    /// Create an invalid metric error.
    pub fn invalid_metric(msg: impl Into<String>) -> Self {
        Self::InvalidMetric(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_tool_display() {
        let err = RegistrationError::ExternalTool {
            tool: "greedy".to_string(),
            status: Some(3),
            stderr: "cannot read image".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "External tool 'greedy' failed (exit code 3): cannot read image"
        );
    }

    #[test]
    fn test_signal_display() {
        let err = RegistrationError::ExternalTool {
            tool: "greedy".to_string(),
            status: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("terminated by signal"));
    }

    #[test]
    fn test_missing_artifact() {
        let err = RegistrationError::missing_artifact("/tmp/x_affine.mat", "affine registration");
        assert!(matches!(err, RegistrationError::MissingArtifact { .. }));
        assert_eq!(
            err.to_string(),
            "Expected artifact /tmp/x_affine.mat is missing after affine registration"
        );
    }
}
