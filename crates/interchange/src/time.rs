//! Exact rational time values.
//!
//! Edit rates and times are kept as integer numerator/denominator pairs so
//! timecode arithmetic never drifts through floating point.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A rational number with 32-bit numerator and denominator.
///
/// Equality is structural: `48/2` and `24/1` are different values. Use
/// [`Rational::reduced`] before comparing if that matters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    /// Create a rational without normalizing it.
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Whole-number rational (`n/1`).
    pub const fn whole(num: i32) -> Self {
        Self { num, den: 1 }
    }

    /// True when the denominator is non-zero.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.den != 0
    }

    /// True when the value is strictly positive.
    #[inline]
    pub fn is_positive(&self) -> bool {
        self.den != 0 && (self.num > 0) == (self.den > 0) && self.num != 0
    }

    /// Approximate value as f64.
    pub fn to_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// Reduce to lowest terms with a positive denominator.
    pub fn reduced(&self) -> Self {
        if self.den == 0 {
            return *self;
        }
        let g = gcd(self.num.unsigned_abs() as u64, self.den.unsigned_abs() as u64).max(1) as i64;
        let mut num = self.num as i64 / g;
        let mut den = self.den as i64 / g;
        if den < 0 {
            num = -num;
            den = -den;
        }
        Self::new(num as i32, den as i32)
    }

    /// Value equality independent of representation.
    pub fn same_value(&self, other: &Rational) -> bool {
        (self.num as i64) * (other.den as i64) == (other.num as i64) * (self.den as i64)
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Error parsing a rational from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRationalError(pub String);

impl fmt::Display for ParseRationalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid rational: {}", self.0)
    }
}

impl std::error::Error for ParseRationalError {}

impl FromStr for Rational {
    type Err = ParseRationalError;

    /// Accepts `"num/den"` or a plain integer.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseRationalError(s.to_string());
        match s.split_once('/') {
            Some((n, d)) => {
                let num = n.trim().parse().map_err(|_| err())?;
                let den: i32 = d.trim().parse().map_err(|_| err())?;
                if den == 0 {
                    return Err(err());
                }
                Ok(Self::new(num, den))
            }
            None => Ok(Self::whole(s.parse().map_err(|_| err())?)),
        }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// A point in time counted in integer units of `rate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RationalTime {
    pub value: i64,
    pub rate: Rational,
}

impl RationalTime {
    /// Create a time of `value` units at `rate`.
    pub const fn new(value: i64, rate: Rational) -> Self {
        Self { value, rate }
    }

    /// Zero at the given rate.
    pub const fn zero(rate: Rational) -> Self {
        Self { value: 0, rate }
    }

    /// Time in seconds.
    pub fn to_seconds(&self) -> f64 {
        let r = self.rate.to_f64();
        if r == 0.0 {
            return 0.0;
        }
        self.value as f64 / r
    }

    /// Convert to another rate, rounding to the nearest unit.
    pub fn rescaled_to(&self, rate: Rational) -> RationalTime {
        if self.rate == rate || !self.rate.is_valid() || !rate.is_valid() {
            return RationalTime::new(self.value, rate);
        }
        // value * (rate / self.rate) = value * rate.num * self.rate.den / (rate.den * self.rate.num)
        let num = self.value as i128 * rate.num as i128 * self.rate.den as i128;
        let den = rate.den as i128 * self.rate.num as i128;
        if den == 0 {
            return RationalTime::new(0, rate);
        }
        let q = num.div_euclid(den);
        let r = num.rem_euclid(den);
        let rounded = if r * 2 >= den.abs() { q + 1 } else { q };
        RationalTime::new(rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64, rate)
    }

    /// Convert to another rate only if no precision is lost.
    pub fn rescaled_exact(&self, rate: Rational) -> Option<RationalTime> {
        if self.rate == rate {
            return Some(*self);
        }
        let num = self.value as i128 * rate.num as i128 * self.rate.den as i128;
        let den = rate.den as i128 * self.rate.num as i128;
        if den == 0 || num % den != 0 {
            return None;
        }
        i64::try_from(num / den).ok().map(|v| RationalTime::new(v, rate))
    }

    /// Sum, expressed in `self`'s rate. Saturates at the bounds of `i64`.
    pub fn add(&self, other: RationalTime) -> RationalTime {
        RationalTime::new(self.value.saturating_add(other.rescaled_to(self.rate).value), self.rate)
    }

    /// Difference, expressed in `self`'s rate. Saturates at the bounds of `i64`.
    pub fn sub(&self, other: RationalTime) -> RationalTime {
        RationalTime::new(self.value.saturating_sub(other.rescaled_to(self.rate).value), self.rate)
    }

    /// Sum, or `None` on overflow.
    pub fn checked_add(&self, other: RationalTime) -> Option<RationalTime> {
        let value = self.value.checked_add(other.rescaled_to(self.rate).value)?;
        Some(RationalTime::new(value, self.rate))
    }

    /// Difference, or `None` on overflow.
    pub fn checked_sub(&self, other: RationalTime) -> Option<RationalTime> {
        let value = self.value.checked_sub(other.rescaled_to(self.rate).value)?;
        Some(RationalTime::new(value, self.rate))
    }
}

impl fmt::Display for RationalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.value, self.rate)
    }
}

/// A half-open range `[start_time, start_time + duration)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeRange {
    pub start_time: RationalTime,
    pub duration: RationalTime,
}

impl TimeRange {
    pub const fn new(start_time: RationalTime, duration: RationalTime) -> Self {
        Self { start_time, duration }
    }

    /// Range of `duration` units starting at `start`, both at `rate`.
    pub const fn from_units(start: i64, duration: i64, rate: Rational) -> Self {
        Self {
            start_time: RationalTime::new(start, rate),
            duration: RationalTime::new(duration, rate),
        }
    }

    /// Exclusive end, in the start time's rate.
    pub fn end_time_exclusive(&self) -> RationalTime {
        self.start_time.add(self.duration)
    }

    /// True if `t` lies within `[start, end)`.
    pub fn contains(&self, t: RationalTime) -> bool {
        let t = t.rescaled_to(self.start_time.rate).value;
        t >= self.start_time.value && t < self.end_time_exclusive().value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_parse() {
        assert_eq!("24/1".parse::<Rational>().unwrap(), Rational::new(24, 1));
        assert_eq!("25".parse::<Rational>().unwrap(), Rational::new(25, 1));
        assert_eq!(" 30000 / 1001 ".parse::<Rational>().unwrap(), Rational::new(30000, 1001));
        assert!("1/0".parse::<Rational>().is_err());
        assert!("abc".parse::<Rational>().is_err());
    }

    #[test]
    fn test_rational_reduce() {
        assert_eq!(Rational::new(48, 2).reduced(), Rational::new(24, 1));
        assert_eq!(Rational::new(3, -6).reduced(), Rational::new(-1, 2));
        assert!(Rational::new(48, 2).same_value(&Rational::new(24, 1)));
    }

    #[test]
    fn test_rescale() {
        let t = RationalTime::new(48, Rational::new(48, 1));
        assert_eq!(t.rescaled_to(Rational::new(24, 1)).value, 24);
        assert_eq!(t.rescaled_exact(Rational::new(24, 1)).map(|t| t.value), Some(24));

        let odd = RationalTime::new(1, Rational::new(48, 1));
        assert_eq!(odd.rescaled_exact(Rational::new(24, 1)), None);
        assert_eq!(odd.rescaled_to(Rational::new(24, 1)).value, 1);
    }

    #[test]
    fn test_ntsc_rescale() {
        let ntsc = Rational::new(30000, 1001);
        let one_sec_ntsc = RationalTime::new(30, ntsc);
        let at_60 = one_sec_ntsc.rescaled_to(Rational::new(60000, 1001));
        assert_eq!(at_60.value, 60);
    }

    #[test]
    fn test_range_contains() {
        let r = TimeRange::from_units(10, 5, Rational::whole(24));
        assert!(r.contains(RationalTime::new(10, Rational::whole(24))));
        assert!(r.contains(RationalTime::new(14, Rational::whole(24))));
        assert!(!r.contains(RationalTime::new(15, Rational::whole(24))));
        assert_eq!(r.end_time_exclusive().value, 15);
    }

    #[test]
    fn test_overflow() {
        let rate = Rational::whole(24);
        let big = RationalTime::new(i64::MAX - 1, rate);
        let two = RationalTime::new(2, rate);
        assert_eq!(big.checked_add(two), None);
        assert_eq!(big.add(two).value, i64::MAX);
        assert_eq!(RationalTime::new(i64::MIN, rate).checked_sub(two), None);
        assert_eq!(big.checked_sub(two).map(|t| t.value), Some(i64::MAX - 3));

        let huge = RationalTime::new(i64::MAX, Rational::whole(1));
        assert_eq!(huge.rescaled_to(rate).value, i64::MAX);
    }
}
