//! Error types for deinterlacing operations.

use thiserror::Error;

/// Error type for deinterlacing operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeinterlaceError {
    /// Invalid frame dimensions for deinterlacing.
    #[error("Invalid frame dimensions: {width}x{height} (minimum 4x4 required)")]
    InvalidDimensions { width: usize, height: usize },

    /// Unsupported plane layout for the deinterlacer.
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// Frame mismatch in the temporal window (different plane geometry).
    #[error("Frame mismatch: expected {expected_width}x{expected_height}, got {actual_width}x{actual_height}")]
    FrameMismatch {
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    /// Invalid filter settings.
    #[error("Invalid settings: {message}")]
    InvalidSettings { message: String },

    /// A segment worker thread could not be started.
    #[error("Failed to spawn worker thread: {message}")]
    ThreadSpawn { message: String },
}

/// Result type for deinterlacing operations.
pub type Result<T> = std::result::Result<T, DeinterlaceError>;

impl DeinterlaceError {
    /// Create an invalid dimensions error.
    pub fn invalid_dimensions(width: usize, height: usize) -> Self {
        Self::InvalidDimensions { width, height }
    }

    /// Create an unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Create a frame mismatch error.
    pub fn frame_mismatch(
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    ) -> Self {
        Self::FrameMismatch {
            expected_width,
            expected_height,
            actual_width,
            actual_height,
        }
    }

    /// Create an invalid settings error.
    pub fn invalid_settings(message: impl Into<String>) -> Self {
        Self::InvalidSettings {
            message: message.into(),
        }
    }

    /// Create a thread spawn error.
    pub fn thread_spawn(message: impl Into<String>) -> Self {
        Self::ThreadSpawn {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeinterlaceError::invalid_dimensions(100, 1);
        assert!(err.to_string().contains("100x1"));

        let err = DeinterlaceError::unsupported_format("4 planes");
        assert!(err.to_string().contains("4 planes"));

        let err = DeinterlaceError::invalid_settings("mode 'x'");
        assert_eq!(err.to_string(), "Invalid settings: mode 'x'");
    }

    #[test]
    fn test_error_equality() {
        let err1 = DeinterlaceError::frame_mismatch(16, 16, 32, 32);
        let err2 = DeinterlaceError::frame_mismatch(16, 16, 32, 32);
        let err3 = DeinterlaceError::frame_mismatch(16, 16, 8, 8);

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
