//! Frame duration estimation.
//!
//! Decoders hand back pictures with best-effort timestamps, and some
//! pictures have none at all. To fill the gaps the decode stage needs a
//! representative frame duration, chosen from whatever timing information
//! the demuxer and decoder report. Rates reported by containers are often
//! wrong, so every candidate rate is only accepted inside a plausible
//! 8..64 frames per second band.

use crate::error::{FrameRateError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use transcode_core::{Rational, CLOCK_RATE};

/// Slowest plausible frame rate.
pub const MIN_PLAUSIBLE_FPS: i64 = 8;

/// Fastest plausible frame rate.
pub const MAX_PLAUSIBLE_FPS: i64 = 64;

/// Frame duration used when nothing plausible is reported (23.976 fps).
pub const DEFAULT_FRAME_DURATION: Rational = Rational::unchecked(1001, 24000);

/// Timing information collected by a demuxer for one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerTiming {
    /// Total stream duration in `time_base` units (0 = unknown).
    pub duration: i64,
    /// Total frame count (0 = unknown).
    pub nb_frames: i64,
    /// Stream time base.
    pub time_base: Rational,
    /// Average frame rate.
    pub avg_frame_rate: Rational,
    /// Lowest frame rate that represents all timestamps exactly.
    pub r_frame_rate: Rational,
}

/// Everything the estimator may use to pick a frame duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamTiming {
    /// Demuxer-level information, when the demuxer collected any.
    pub container: Option<ContainerTiming>,
    /// Time base reported by the decoder. May count fields, not frames.
    pub codec_time_base: Rational,
    /// Codec time base ticks per frame (2 for field-rate time bases).
    pub ticks_per_frame: i64,
}

impl Default for StreamTiming {
    fn default() -> Self {
        Self {
            container: None,
            codec_time_base: Rational::zero(),
            ticks_per_frame: 1,
        }
    }
}

impl StreamTiming {
    /// Timing with only a codec time base.
    pub fn from_codec(time_base: Rational, ticks_per_frame: i64) -> Self {
        Self {
            container: None,
            codec_time_base: time_base,
            ticks_per_frame,
        }
    }

    /// Attach demuxer timing.
    pub fn with_container(mut self, container: ContainerTiming) -> Self {
        self.container = Some(container);
        self
    }

    /// Validate the timing description.
    pub fn validate(&self) -> Result<()> {
        if self.ticks_per_frame < 1 {
            return Err(FrameRateError::invalid_params(format!(
                "ticks_per_frame must be >= 1, got {}",
                self.ticks_per_frame
            )));
        }
        if let Some(c) = &self.container {
            if c.duration < 0 || c.nb_frames < 0 {
                return Err(FrameRateError::invalid_params(
                    "negative container duration or frame count",
                ));
            }
        }
        Ok(())
    }
}

/// A chosen frame duration, in 90 kHz ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameDuration {
    /// Duration of one frame.
    pub frame: f64,
    /// Duration of one field (equal to `frame` for frame-rate time bases).
    pub field: f64,
    /// Derived from stream information rather than the default.
    pub confirmed: bool,
}

impl FrameDuration {
    /// Duration of a frame that repeats `repeat_pict` extra fields.
    pub fn with_repeats(&self, repeat_pict: u32) -> f64 {
        self.frame + f64::from(repeat_pict) * self.field
    }
}

/// `num/den` frames per second lies inside `(8, max_fps)`.
fn rate_plausible(rate: Rational, max_fps: i64) -> bool {
    let (num, den) = (rate.num as i128, rate.den as i128);
    den * max_fps as i128 > num && num > den * MIN_PLAUSIBLE_FPS as i128
}

/// `num/den` seconds per frame lies inside `(1/max_fps, 1/8)`.
fn period_plausible(period: Rational, max_fps: i64) -> bool {
    rate_plausible(period.recip(), max_fps)
}

/// Pick a frame duration, highest-priority source first:
///
/// 1. container duration divided by container frame count
/// 2. average frame rate, stream time base, then real frame rate
/// 3. codec time base, converted from fields to frames when needed
/// 4. [`DEFAULT_FRAME_DURATION`]
pub fn compute_frame_duration(timing: &StreamTiming) -> FrameDuration {
    let ticks_per_frame = timing.ticks_per_frame.max(1);

    // the codec time base may count fields, so allow field-rate values
    let max_fields = MAX_PLAUSIBLE_FPS * ticks_per_frame;

    let mut seconds = 0.0;
    if let Some(c) = &timing.container {
        if c.nb_frames > 0 && c.duration > 0 && c.time_base.is_valid() {
            seconds = (c.duration as f64 * c.time_base.num as f64)
                / (c.nb_frames as f64 * c.time_base.den as f64);
        } else if c.avg_frame_rate.is_valid()
            && rate_plausible(c.avg_frame_rate, MAX_PLAUSIBLE_FPS)
        {
            seconds = c.avg_frame_rate.recip().to_f64();
        } else if c.time_base.is_valid() && period_plausible(c.time_base, MAX_PLAUSIBLE_FPS) {
            seconds = c.time_base.to_f64();
        } else if c.r_frame_rate.is_valid() && rate_plausible(c.r_frame_rate, MAX_PLAUSIBLE_FPS)
        {
            seconds = c.r_frame_rate.recip().to_f64();
        }
    }

    let tb = timing.codec_time_base;
    if seconds == 0.0 && tb.is_valid() && period_plausible(tb, max_fields) {
        seconds = tb.to_f64() * ticks_per_frame as f64;
    }

    let confirmed = seconds != 0.0;
    if !confirmed {
        seconds = DEFAULT_FRAME_DURATION.to_f64();
    }

    let frame = seconds * CLOCK_RATE as f64;
    FrameDuration {
        frame,
        field: frame / ticks_per_frame as f64,
        confirmed,
    }
}

/// Caches a frame duration once it is confirmed by stream information.
///
/// Until then the estimate is recomputed on every request, so timing the
/// decoder only reports after its first picture still gets picked up.
#[derive(Debug, Clone)]
pub struct DurationEstimator {
    timing: StreamTiming,
    current: FrameDuration,
}

impl DurationEstimator {
    /// Create an estimator for a stream.
    pub fn new(timing: StreamTiming) -> Result<Self> {
        timing.validate()?;
        Ok(Self {
            timing,
            current: compute_frame_duration(&timing),
        })
    }

    /// Replace the stream timing. Ignored once the duration is confirmed.
    pub fn update_timing(&mut self, timing: StreamTiming) -> Result<()> {
        timing.validate()?;
        self.timing = timing;
        Ok(())
    }

    /// The current estimate.
    pub fn estimate(&mut self) -> FrameDuration {
        if !self.current.confirmed {
            self.current = compute_frame_duration(&self.timing);
            if self.current.confirmed {
                debug!(
                    frame = self.current.frame,
                    field = self.current.field,
                    "frame duration confirmed"
                );
            }
        }
        self.current
    }

    /// Whether stream information produced the estimate.
    pub fn is_confirmed(&self) -> bool {
        self.current.confirmed
    }

    /// The stream timing in use.
    pub fn timing(&self) -> &StreamTiming {
        &self.timing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn container() -> ContainerTiming {
        ContainerTiming {
            time_base: Rational::new(1, 90000),
            ..Default::default()
        }
    }

    #[test]
    fn test_container_average_wins() {
        let timing = StreamTiming::from_codec(Rational::new(1, 25), 1).with_container(
            ContainerTiming {
                duration: 1001 * 100,
                nb_frames: 100,
                time_base: Rational::new(1, 24000),
                avg_frame_rate: Rational::new(25, 1),
                ..Default::default()
            },
        );
        let d = compute_frame_duration(&timing);
        assert!(d.confirmed);
        assert!(approx(d.frame, 3753.75));
    }

    #[test]
    fn test_avg_frame_rate() {
        let timing = StreamTiming::default().with_container(ContainerTiming {
            avg_frame_rate: Rational::new(30000, 1001),
            ..container()
        });
        let d = compute_frame_duration(&timing);
        assert!(approx(d.frame, 3003.0));
    }

    #[test]
    fn test_out_of_band_rate_falls_through() {
        // 1000 fps average is implausible; 1/25 stream time base is not
        let timing = StreamTiming::default().with_container(ContainerTiming {
            avg_frame_rate: Rational::new(1000, 1),
            time_base: Rational::new(1, 25),
            ..Default::default()
        });
        let d = compute_frame_duration(&timing);
        assert!(approx(d.frame, 3600.0));
    }

    #[test]
    fn test_real_frame_rate_last_container_choice() {
        let timing = StreamTiming::default().with_container(ContainerTiming {
            r_frame_rate: Rational::new(50, 1),
            ..container()
        });
        assert!(approx(compute_frame_duration(&timing).frame, 1800.0));
    }

    #[test]
    fn test_field_rate_codec_time_base() {
        let timing = StreamTiming::from_codec(Rational::new(1001, 60000), 2);
        let d = compute_frame_duration(&timing);
        assert!(d.confirmed);
        assert!(approx(d.frame, 3003.0));
        assert!(approx(d.field, 1501.5));
        assert!(approx(d.with_repeats(1), 4504.5));
    }

    #[test]
    fn test_default_when_implausible() {
        let timing = StreamTiming::from_codec(Rational::new(1, 90000), 1);
        let d = compute_frame_duration(&timing);
        assert!(!d.confirmed);
        assert!(approx(d.frame, 3753.75));
    }

    #[test]
    fn test_estimator_confirms_later() {
        let mut est = DurationEstimator::new(StreamTiming::default()).unwrap();
        assert!(!est.estimate().confirmed);

        est.update_timing(StreamTiming::from_codec(Rational::new(1, 25), 1))
            .unwrap();
        assert!(approx(est.estimate().frame, 3600.0));
        assert!(est.is_confirmed());

        // confirmed estimates stick
        est.update_timing(StreamTiming::from_codec(Rational::new(1, 50), 1))
            .unwrap();
        assert!(approx(est.estimate().frame, 3600.0));
    }

    #[test]
    fn test_invalid_ticks_per_frame() {
        let timing = StreamTiming::from_codec(Rational::new(1, 25), 0);
        assert!(DurationEstimator::new(timing).is_err());
    }
}
