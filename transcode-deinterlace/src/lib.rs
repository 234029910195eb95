//! # transcode-deinterlace
//!
//! Multithreaded YADIF deinterlacing for the transcode pipeline.
//!
//! ## Overview
//!
//! Interlaced video carries two fields per frame, captured at slightly
//! different times. The deinterlacer keeps one field and rebuilds the other
//! from a spatial estimate clamped by the neighbouring frames. The work is
//! split into horizontal segments processed by persistent worker threads.
//!
//! ## Modes
//!
//! | Setting | Effect |
//! |---------|--------|
//! | `FilterMode::SpatialTemporal` | YADIF with a 3-frame window (one frame of latency) |
//! | `FilterMode::Spatial` | Edge-directed interpolation only, no latency |
//! | `OutputRate::Bob` | One output per field, half duration each |
//! | `refine` | Motion-compensated post-filter (filters both fields) |
//!
//! ## Quick Start
//!
//! ```no_run
//! use transcode_deinterlace::{DeinterlaceConfig, Deinterlacer, YadifDeinterlacer};
//! use transcode_core::{Buffer, PixelLayout};
//!
//! let config = DeinterlaceConfig::from_settings("3:-1")?;
//! let mut deint = YadifDeinterlacer::new(config)?;
//!
//! let out = deint.process(Buffer::picture(PixelLayout::Yuv420p, 720, 480))?;
//! assert!(out.is_empty()); // first frame primes the window
//!
//! let remaining = deint.flush()?;
//! # Ok::<(), transcode_deinterlace::DeinterlaceError>(())
//! ```

pub mod config;
pub mod error;
pub mod refine;
pub mod taskset;
pub mod yadif;

// Re-export main types
pub use config::{DeinterlaceConfig, FilterMode, OutputRate, Parity, RefineConfig};
pub use error::{DeinterlaceError, Result};
pub use refine::MotionRefiner;
pub use taskset::Taskset;
pub use yadif::{segment_rows, DeinterlaceStats, YadifDeinterlacer};

use transcode_core::{Buffer, BufferList};

/// Deinterlacer trait for common interface.
pub trait Deinterlacer: Send {
    /// Process a frame and return deinterlaced output.
    ///
    /// For temporal filters, this may return empty until enough context is available.
    fn process(&mut self, frame: Buffer) -> Result<BufferList>;

    /// Flush any buffered frames.
    fn flush(&mut self) -> Result<BufferList>;

    /// Reset the deinterlacer state.
    fn reset(&mut self);
}

impl Deinterlacer for YadifDeinterlacer {
    fn process(&mut self, frame: Buffer) -> Result<BufferList> {
        self.push_frame(frame)
    }

    fn flush(&mut self) -> Result<BufferList> {
        YadifDeinterlacer::flush(self)
    }

    fn reset(&mut self) {
        YadifDeinterlacer::reset(self)
    }
}

/// Create a boxed deinterlacer from a configuration.
pub fn create_deinterlacer(config: DeinterlaceConfig) -> Result<Box<dyn Deinterlacer>> {
    Ok(Box::new(YadifDeinterlacer::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use transcode_core::{BufferFlags, PixelLayout};

    fn create_test_frame(width: u32, height: u32) -> Buffer {
        let mut frame = Buffer::picture(PixelLayout::Yuv420p, width, height);
        frame.flags = BufferFlags::TOP_FIELD_FIRST;
        if let Some(y_plane) = frame.plane_mut(0) {
            for y in 0..y_plane.height {
                let value = if y % 2 == 0 { 100u8 } else { 200u8 };
                y_plane.row_mut(y).fill(value);
            }
        }
        frame
    }

    #[test]
    fn test_deinterlacer_trait_yadif() {
        let mut deint = create_deinterlacer(DeinterlaceConfig::default().with_segments(3)).unwrap();

        let r1 = deint.process(create_test_frame(32, 32)).unwrap();
        assert!(r1.is_empty()); // Need more context

        let r2 = deint.process(create_test_frame(32, 32)).unwrap();
        assert_eq!(r2.len(), 1);

        let flush = deint.flush().unwrap();
        assert_eq!(flush.len(), 1);

        deint.reset();
        assert!(deint.flush().unwrap().is_empty());
    }

    #[test]
    fn test_settings_to_deinterlacer() {
        let config = DeinterlaceConfig::from_settings("9:0").unwrap().with_segments(2);
        let mut deint = create_deinterlacer(config).unwrap();
        deint.process(create_test_frame(16, 16)).unwrap();
        assert_eq!(deint.process(create_test_frame(16, 16)).unwrap().len(), 2);
    }
}
