//! Error types for frame timing estimation.

use thiserror::Error;

/// Frame timing error types.
#[derive(Error, Debug)]
pub enum FrameRateError {
    /// Invalid frame rate or time base specified.
    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(String),

    /// Invalid estimator parameters.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Core library error.
    #[error("Core error: {0}")]
    Core(#[from] transcode_core::Error),
}

/// Result type for frame timing operations.
pub type Result<T> = std::result::Result<T, FrameRateError>;

impl FrameRateError {
    /// Create an invalid frame rate error.
    pub fn invalid_frame_rate(msg: impl Into<String>) -> Self {
        Self::InvalidFrameRate(msg.into())
    }

    /// Create an invalid parameters error.
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }
}
