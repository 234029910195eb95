//! Field cadence tracking.
//!
//! Tracks the field order reported for recent pictures and detects
//! switches between video (interlaced, two fields) and film (progressive,
//! often with pulldown) material. Purely diagnostic: nothing here affects
//! buffer timing or ordering.

use std::fmt;
use tracing::info;
use transcode_core::{ticks_to_seconds, BufferFlags};

/// Number of pictures remembered.
pub const CADENCE_HISTORY: usize = 12;

/// Field order of one displayed picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FieldCode {
    /// Interlaced, top field first.
    TopBottom = 8,
    /// Interlaced, bottom field first.
    BottomTop = 16,
    /// Progressive, bottom first, two fields displayed.
    BottomTopProgressive = 32,
    /// Progressive, bottom first, three fields displayed.
    BottomTopBottomProgressive = 64,
    /// Progressive, top first, two fields displayed.
    TopBottomProgressive = 128,
    /// Progressive, top first, three fields displayed.
    TopBottomTopProgressive = 256,
}

impl FieldCode {
    /// Classify picture flags.
    pub fn from_flags(flags: BufferFlags) -> Self {
        let top = flags.contains(BufferFlags::TOP_FIELD_FIRST);
        let repeat = flags.contains(BufferFlags::REPEAT_FIRST_FIELD);
        if !flags.contains(BufferFlags::PROGRESSIVE) {
            return if top { Self::TopBottom } else { Self::BottomTop };
        }
        match (top, repeat) {
            (false, false) => Self::BottomTopProgressive,
            (false, true) => Self::BottomTopBottomProgressive,
            (true, false) => Self::TopBottomProgressive,
            (true, true) => Self::TopBottomTopProgressive,
        }
    }

    /// Numeric code.
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// A detected cadence switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceTransition {
    /// Interlaced material gave way to progressive.
    VideoToFilm,
    /// Progressive material gave way to interlaced.
    FilmToVideo,
}

impl fmt::Display for CadenceTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VideoToFilm => write!(f, "Video -> Film"),
            Self::FilmToVideo => write!(f, "Film -> Video"),
        }
    }
}

/// Rolling history of field codes, newest first.
#[derive(Debug, Clone, Default)]
pub struct CadenceTracker {
    history: [Option<FieldCode>; CADENCE_HISTORY],
}

/// Empty slots count as video. Bottom-first interlaced frames count as
/// video too, so a bottom-first source never reads as film.
fn is_video(code: Option<FieldCode>) -> bool {
    matches!(
        code,
        None | Some(FieldCode::TopBottom) | Some(FieldCode::BottomTop)
    )
}

impl CadenceTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the flags of the next emitted picture, starting at `start`.
    ///
    /// Transitions are only reported once the history is full.
    pub fn observe(&mut self, flags: BufferFlags, start: i64) -> Option<CadenceTransition> {
        self.history.rotate_right(1);
        self.history[0] = Some(FieldCode::from_flags(flags));

        let [c0, c1, c2, ..] = self.history;
        if self.history[CADENCE_HISTORY - 1].is_none() {
            return None;
        }

        let transition = if is_video(c2) && is_video(c1) && !is_video(c0) {
            CadenceTransition::VideoToFilm
        } else if !is_video(c2) && is_video(c1) && is_video(c0) {
            CadenceTransition::FilmToVideo
        } else {
            return None;
        };
        info!("{:.6}s: {}", ticks_to_seconds(start), transition);
        Some(transition)
    }

    /// Recorded codes, newest first.
    pub fn history(&self) -> &[Option<FieldCode>] {
        &self.history
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        self.history = [None; CADENCE_HISTORY];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO: BufferFlags = BufferFlags::TOP_FIELD_FIRST;

    fn film() -> BufferFlags {
        BufferFlags::PROGRESSIVE | BufferFlags::TOP_FIELD_FIRST
    }

    #[test]
    fn test_codes() {
        assert_eq!(FieldCode::from_flags(BufferFlags::empty()), FieldCode::BottomTop);
        assert_eq!(FieldCode::from_flags(VIDEO).code(), 8);
        assert_eq!(
            FieldCode::from_flags(film() | BufferFlags::REPEAT_FIRST_FIELD),
            FieldCode::TopBottomTopProgressive
        );
        assert_eq!(
            FieldCode::from_flags(BufferFlags::PROGRESSIVE | BufferFlags::REPEAT_FIRST_FIELD),
            FieldCode::BottomTopBottomProgressive
        );
    }

    #[test]
    fn test_no_report_until_history_full() {
        let mut tracker = CadenceTracker::new();
        tracker.observe(VIDEO, 0);
        tracker.observe(VIDEO, 0);
        assert_eq!(tracker.observe(film(), 0), None);
    }

    #[test]
    fn test_video_to_film_and_back() {
        let mut tracker = CadenceTracker::new();
        for i in 0..CADENCE_HISTORY {
            assert_eq!(tracker.observe(VIDEO, i as i64 * 3003), None);
        }
        assert_eq!(
            tracker.observe(film(), 90000),
            Some(CadenceTransition::VideoToFilm)
        );
        assert_eq!(tracker.observe(film(), 93003), None);
        assert_eq!(tracker.observe(VIDEO, 96006), None);
        assert_eq!(
            tracker.observe(VIDEO, 99009),
            Some(CadenceTransition::FilmToVideo)
        );
    }

    #[test]
    fn test_bottom_first_video_is_video() {
        let mut tracker = CadenceTracker::new();
        for _ in 0..CADENCE_HISTORY {
            tracker.observe(VIDEO, 0);
        }
        // switching field order is not a film transition
        assert_eq!(tracker.observe(BufferFlags::empty(), 0), None);
        assert_eq!(tracker.observe(BufferFlags::empty(), 0), None);
        assert_eq!(tracker.history()[0], Some(FieldCode::BottomTop));
    }

    #[test]
    fn test_transition_display() {
        assert_eq!(CadenceTransition::FilmToVideo.to_string(), "Film -> Video");
    }
}
