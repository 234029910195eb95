//! Error types for the timing core.
//!
//! Structural invariant violations (a desynchronised reorder heap, a segment
//! count mismatch) are not represented here: correct callers cannot trigger
//! them, so they are assertions.

use thiserror::Error;

/// Main error type for the core crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameter provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Unsupported feature or layout.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A queue was closed while an operation was pending.
    #[error("Queue closed")]
    Closed,

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// End of stream reached.
    #[error("End of stream")]
    EndOfStream,

    /// A decoder rejected a unit of input.
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Buffer too small for operation.
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid parameter error.
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }

    /// Check if this is an end-of-stream error.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }

    /// Check if this error is recoverable (processing continues with the
    /// next unit).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Decode(_) | Error::BufferTooSmall { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidParameter("capacity".into());
        assert_eq!(err.to_string(), "Invalid parameter: capacity");
        assert_eq!(Error::Closed.to_string(), "Queue closed");
    }

    #[test]
    fn test_is_eof() {
        assert!(Error::EndOfStream.is_eof());
        assert!(!Error::Cancelled.is_eof());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::decode("corrupt slice").is_recoverable());
        assert!(!Error::Closed.is_recoverable());
        assert!(!Error::EndOfStream.is_recoverable());
    }
}
