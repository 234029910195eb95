//! Time base handling for the 90 kHz pipeline clock.
//!
//! Every timestamp carried by a [`Buffer`](crate::Buffer) is an `i64` count
//! of 90 kHz ticks. Container and codec rates arrive in their own time bases
//! and are converted here.

use crate::rational::Rational;
use std::fmt;

/// Ticks per second of the pipeline clock.
pub const CLOCK_RATE: i64 = 90_000;

/// A time base for converting between timestamp units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeBase(pub Rational);

impl TimeBase {
    /// The pipeline clock (1/90000).
    pub const MPEG: Self = Self(Rational::unchecked(1, CLOCK_RATE));

    /// Millisecond time base (1/1000).
    pub const MILLISECONDS: Self = Self(Rational::unchecked(1, 1000));

    /// Create a new time base from numerator and denominator.
    pub fn new(num: i64, den: i64) -> Self {
        Self(Rational::new(num, den))
    }

    /// Convert a value in this time base to another, truncating.
    pub fn convert(&self, value: i64, target: TimeBase) -> i64 {
        let num = value as i128 * self.0.num as i128 * target.0.den as i128;
        let den = self.0.den as i128 * target.0.num as i128;
        (num / den) as i64
    }

    /// Convert a value in this time base to pipeline ticks.
    pub fn to_ticks(&self, value: i64) -> i64 {
        self.convert(value, Self::MPEG)
    }

    /// Convert to seconds as f64.
    pub fn to_seconds(&self, value: i64) -> f64 {
        value as f64 * self.0.to_f64()
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::MPEG
    }
}

impl From<Rational> for TimeBase {
    fn from(r: Rational) -> Self {
        Self(r)
    }
}

/// Seconds represented by a tick count.
pub fn ticks_to_seconds(ticks: i64) -> f64 {
    ticks as f64 / CLOCK_RATE as f64
}

/// Display adapter printing a tick count as `hh:mm:ss.mmm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime(pub i64);

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = ticks_to_seconds(self.0);
        let sign = if secs < 0.0 { "-" } else { "" };
        let secs = secs.abs();
        let hours = (secs / 3600.0) as u32;
        let mins = ((secs % 3600.0) / 60.0) as u32;
        let secs = secs % 60.0;
        write!(f, "{}{:02}:{:02}:{:06.3}", sign, hours, mins, secs)
    }
}
