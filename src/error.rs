//! Error types for multi-state data.

use ndarray::ShapeError;
use thiserror::Error;

/// Result type alias for multi-state data operations.
pub type Result<T> = std::result::Result<T, MultiStateError>;

/// Errors that can occur while building or converting multi-state data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MultiStateError {
    /// The states together hold no observations.
    #[error("Arrays should have non-zero length")]
    EmptyData,
    /// Lookup of an unknown state key or an out-of-range state index.
    #[error("Key not found: {0}")]
    KeyNotFound(String),
    /// Shape mismatch in arrays.
    #[error("Shape mismatch: expected {expected_shape}, got {actual_shape}")]
    ShapeMismatch {
        expected_shape: String,
        actual_shape: String,
    },
    /// Invalid parameter value.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl From<ShapeError> for MultiStateError {
    fn from(err: ShapeError) -> Self {
        MultiStateError::ShapeMismatch {
            expected_shape: "unknown".to_string(),
            actual_shape: err.to_string(),
        }
    }
}
