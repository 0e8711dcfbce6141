//! Error types for record parsing, decoding, and transport.

use thiserror::Error;

/// Result type alias for record operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors that can occur while reading, interpreting, or patching the record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The record does not have the nested structure required at `path`.
    #[error("unexpected record shape at {path}: {reason}")]
    Shape { path: String, reason: String },

    /// A scale rule or scale event field is present but malformed.
    #[error("decode error: {reason}")]
    Decode { reason: String },

    /// The underlying read or patch call failed.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialize(String),
}

impl RecordError {
    pub(crate) fn shape(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Shape {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }
}
