//! # Transcode Frame Rate
//!
//! Frame timing inference for decoded video.
//!
//! - **Duration estimation**: picks a representative frame duration from
//!   container and codec timing, rejecting implausible rates
//! - **Cadence tracking**: watches per-picture field order and reports
//!   switches between film and video material
//!
//! ## Quick Start
//!
//! ```rust
//! use transcode_core::Rational;
//! use transcode_framerate::{DurationEstimator, StreamTiming};
//!
//! // MPEG-2 style field-rate time base
//! let timing = StreamTiming::from_codec(Rational::new(1001, 60000), 2);
//! let mut estimator = DurationEstimator::new(timing)?;
//! let duration = estimator.estimate();
//! assert!(duration.confirmed);
//! assert_eq!(duration.frame.round() as i64, 3003);
//! # Ok::<(), transcode_framerate::FrameRateError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cadence;
pub mod duration;
pub mod error;

// Re-export main types
pub use cadence::{CadenceTracker, CadenceTransition, FieldCode, CADENCE_HISTORY};
pub use duration::{
    compute_frame_duration, ContainerTiming, DurationEstimator, FrameDuration, StreamTiming,
    DEFAULT_FRAME_DURATION,
};
pub use error::{FrameRateError, Result};
