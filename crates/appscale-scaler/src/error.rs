//! Error types for the scaler.

use std::time::Duration;

use appscale_record::RecordError;
use thiserror::Error;

pub type ScalerResult<T> = Result<T, ScalerError>;

#[derive(Debug, Error)]
pub enum ScalerError {
    /// Shape, decode, or transport failure from the record layer.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// The awaited condition was not observed before the deadline.
    #[error("timed out after {waited:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        waited: Duration,
    },

    /// The caller's cancellation signal fired while waiting.
    #[error("cancelled while waiting for {operation}")]
    Cancelled { operation: &'static str },

    #[error("invalid configuration: {0}")]
    Config(String),
}
