//! Input validation error types.
//!
//! Everything here is raised synchronously, before a request frame is built.

use crate::common::ErrorSeverity;

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Session id does not decode through the scene table
    #[error("Invalid session id {id:#06x}: {reason}")]
    InvalidSessionId {
        /// Raw session id
        id: u16,
        /// Reason for rejection
        reason: String,
    },

    /// Sample format or codec the scene cannot carry
    #[error("Unsupported format for '{field}': {reason}")]
    UnsupportedFormat {
        /// Field name
        field: String,
        /// Reason for rejection
        reason: String,
    },

    /// Value out of range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Field name
        field: String,
        /// The invalid value
        value: String,
        /// Minimum allowed value
        min: String,
        /// Maximum allowed value
        max: String,
    },

    /// Value is required but missing
    #[error("Required field '{0}' is missing")]
    Required(String),

    /// Payload does not fit in one frame
    #[error("Payload of {len} bytes exceeds the frame limit of {max}")]
    PayloadTooLarge {
        /// Payload length
        len: usize,
        /// Maximum payload length
        max: usize,
    },

    /// Operation not offered by this scene
    #[error("Scene {scene} does not support '{op}'")]
    UnsupportedByScene {
        /// Scene name
        scene: &'static str,
        /// Operation name
        op: &'static str,
    },
}

impl ValidationError {
    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Warning
    }

    /// Create an invalid session id error.
    pub fn invalid_session_id(id: u16, reason: impl Into<String>) -> Self {
        ValidationError::InvalidSessionId {
            id,
            reason: reason.into(),
        }
    }

    /// Create an unsupported format error.
    pub fn unsupported_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::UnsupportedFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an out of range error.
    pub fn out_of_range<T: ToString>(field: impl Into<String>, value: T, min: T, max: T) -> Self {
        ValidationError::OutOfRange {
            field: field.into(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    /// Create a required field error.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required(field.into())
    }
}
