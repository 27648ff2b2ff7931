//! Error types for volume, mask and multiplexing operations.

use thiserror::Error;

use crate::multiplex::Channel;

/// Main error type for `petmux-core`.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Tensor data could not be read back from the backend.
    #[error("Tensor data error: {0}")]
    TensorData(String),

    /// Two volumes were expected to share a shape.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A direction matrix could not be inverted.
    #[error("Direction matrix is singular")]
    SingularDirection,

    /// An operation over a set of masks was given none.
    #[error("No masks were provided")]
    NoMasks,

    /// A mask has no foreground voxels.
    #[error("Mask is empty: {0}")]
    EmptyMask(String),

    /// The running field-of-view intersection became empty.
    #[error("Common field of view is empty after intersecting {masks} masks")]
    EmptyIntersection { masks: usize },

    /// Multiplexing requires between one and three volumes.
    #[error("Multiplexing takes 1 to 3 volumes, got {0}")]
    ChannelCount(usize),

    /// A colour channel was assigned to more than one tracer.
    #[error("Channel {0} is assigned more than once")]
    DuplicateChannel(Channel),

    /// A tracer was assigned to more than one channel.
    #[error("Tracer '{0}' is assigned more than once")]
    DuplicateTracer(String),

    /// A colour name did not parse.
    #[error("Unknown channel '{0}' (expected red, green or blue)")]
    UnknownChannel(String),

    /// A region name is not part of the label index.
    #[error("Unknown region '{name}' (known regions: {known})")]
    UnknownRegion { name: String, known: String },
}

/// Result type for `petmux-core` operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a tensor data error.
    pub fn tensor_data(msg: impl Into<String>) -> Self {
        Self::TensorData(msg.into())
    }

    /// Create an empty mask error.
    pub fn empty_mask(msg: impl Into<String>) -> Self {
        Self::EmptyMask(msg.into())
    }

    /// Create a shape mismatch error from two volume shapes.
    pub fn shape_mismatch(expected: [usize; 3], actual: [usize; 3]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::ChannelCount(4);
        assert_eq!(err.to_string(), "Multiplexing takes 1 to 3 volumes, got 4");
    }

    #[test]
    fn test_shape_mismatch() {
        let err = CoreError::shape_mismatch([2, 2, 2], [3, 3, 3]);
        let err_str = err.to_string();
        assert!(err_str.contains("expected [2, 2, 2]"));
        assert!(err_str.contains("got [3, 3, 3]"));
    }

    #[test]
    fn test_duplicate_channel_names_channel() {
        let err = CoreError::DuplicateChannel(Channel::Green);
        assert_eq!(err.to_string(), "Channel green is assigned more than once");
    }
}
