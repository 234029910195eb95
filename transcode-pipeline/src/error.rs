//! Pipeline error types.

use thiserror::Error;
use transcode_core::Error as CoreError;
use transcode_deinterlace::DeinterlaceError;
use transcode_framerate::FrameRateError;

/// Kind of an output track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineTrackType {
    Video,
    Audio,
    Subtitle,
}

impl std::fmt::Display for PipelineTrackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
        };
        f.write_str(name)
    }
}

/// Pipeline error type.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Deinterlacer error.
    #[error("Deinterlace error: {0}")]
    Deinterlace(#[from] DeinterlaceError),

    /// Frame rate estimation error.
    #[error("Frame rate error: {0}")]
    FrameRate(#[from] FrameRateError),

    /// A decoder rejected its input. Counted and skipped by the decode
    /// stages, never fatal.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The output writer failed.
    #[error("Writer error: {0}")]
    Writer(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A stage thread failed.
    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },

    /// Pipeline aborted.
    #[error("Pipeline aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    /// Create a writer error.
    pub fn writer(msg: impl Into<String>) -> Self {
        Self::Writer(msg.into())
    }

    /// Create a stage failure.
    pub fn stage_failed(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Whether processing can continue past this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Decode(_) => true,
            Self::Core(e) => e.is_recoverable(),
            _ => false,
        }
    }
}

/// Pipeline result type.
pub type Result<T> = std::result::Result<T, PipelineError>;
