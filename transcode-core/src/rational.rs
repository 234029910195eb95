//! Rational numbers for frame rates and stream time bases.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A rational number represented as a numerator and denominator.
///
/// Frame rates (`24000/1001`) and time bases (`1/90000`) as reported by
/// containers and decoders. A zero denominator is allowed on construction
/// through [`Rational::unchecked`] because containers do report `0/0` rates;
/// such values are never plausible and callers test with [`is_valid`].
///
/// [`is_valid`]: Rational::is_valid
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    /// Numerator
    pub num: i64,
    /// Denominator
    pub den: i64,
}

impl Rational {
    /// Create a new rational number with a normalised sign.
    ///
    /// # Panics
    ///
    /// Panics if denominator is zero.
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den != 0, "Denominator cannot be zero");
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        Self { num, den }
    }

    /// Create a rational exactly as reported, without validation.
    pub const fn unchecked(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    /// Create a zero rational.
    pub const fn zero() -> Self {
        Self { num: 0, den: 1 }
    }

    /// Both terms are strictly positive.
    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }

    /// Reduce the rational to its simplest form.
    pub fn reduce(&self) -> Self {
        if self.num == 0 || self.den == 0 {
            return *self;
        }
        let g = gcd(self.num.unsigned_abs(), self.den.unsigned_abs()) as i64;
        Self {
            num: self.num / g,
            den: self.den / g,
        }
    }

    /// Convert to f64. Returns 0.0 for a zero denominator.
    pub fn to_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// The reciprocal (`den/num`), e.g. frame duration from a frame rate.
    pub fn recip(&self) -> Self {
        Self::unchecked(self.den, self.num)
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rational({}/{})", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as i128 * other.den as i128;
        let rhs = other.num as i128 * self.den as i128;
        lhs.cmp(&rhs)
    }
}

impl From<(i64, i64)> for Rational {
    fn from((num, den): (i64, i64)) -> Self {
        Self::new(num, den)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_negative_den() {
        let r = Rational::new(1, -2);
        assert_eq!(r.num, -1);
        assert_eq!(r.den, 2);
    }

    #[test]
    fn test_rational_reduce() {
        let r = Rational::new(48000, 2002).reduce();
        assert_eq!(r, Rational::new(24000, 1001));
    }

    #[test]
    fn test_unchecked_zero_den() {
        let r = Rational::unchecked(0, 0);
        assert!(!r.is_valid());
        assert_eq!(r.to_f64(), 0.0);
    }

    #[test]
    fn test_recip() {
        let rate = Rational::new(30000, 1001);
        assert_eq!(rate.recip(), Rational::new(1001, 30000));
    }

    #[test]
    fn test_rational_ord() {
        assert!(Rational::new(30000, 1001) > Rational::new(24000, 1001));
    }
}
