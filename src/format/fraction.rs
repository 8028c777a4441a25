//! Exact rational arithmetic for aspect ratios.
//!
//! Display and pixel aspect ratios are kept as reduced `i32` fractions, the
//! same range a caps string can express. Intermediate products are computed
//! in `i64`/`i128` and only narrowed after reduction, so no precision is lost
//! and overflow is reported instead of wrapped.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A reduced fraction with a positive denominator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fraction {
    num: i32,
    den: i32,
}

impl Fraction {
    /// 1/1.
    pub const ONE: Fraction = Fraction { num: 1, den: 1 };

    /// Smallest positive aspect ratio a caps string can carry.
    pub const MIN_POSITIVE: Fraction = Fraction {
        num: 1,
        den: i32::MAX,
    };

    /// Largest aspect ratio a caps string can carry.
    pub const MAX: Fraction = Fraction {
        num: i32::MAX,
        den: 1,
    };

    /// Create a fraction, reducing it. Returns `None` for a zero denominator.
    pub fn new(num: i32, den: i32) -> Option<Self> {
        Self::from_i64(num as i64, den as i64)
    }

    /// Reduce an `i64` ratio, returning `None` on a zero denominator or when
    /// the reduced terms do not fit in `i32`.
    pub fn from_i64(num: i64, den: i64) -> Option<Self> {
        Self::from_i128(num as i128, den as i128)
    }

    fn from_i128(mut num: i128, mut den: i128) -> Option<Self> {
        if den == 0 {
            return None;
        }
        if den < 0 {
            num = -num;
            den = -den;
        }
        let g = gcd(num.unsigned_abs(), den.unsigned_abs()).max(1) as i128;
        let num = i32::try_from(num / g).ok()?;
        let den = i32::try_from(den / g).ok()?;
        Some(Self { num, den })
    }

    /// Numerator.
    #[inline]
    pub fn numer(&self) -> i32 {
        self.num
    }

    /// Denominator (always positive).
    #[inline]
    pub fn denom(&self) -> i32 {
        self.den
    }

    /// Exact product, or `None` if the reduced result overflows `i32`.
    pub fn multiply(self, other: Fraction) -> Option<Fraction> {
        Self::from_i128(
            self.num as i128 * other.num as i128,
            self.den as i128 * other.den as i128,
        )
    }

    /// Exact quotient, or `None` when dividing by zero or on overflow.
    pub fn divide(self, other: Fraction) -> Option<Fraction> {
        self.multiply(other.inverse()?)
    }

    /// Reciprocal; `None` for zero.
    pub fn inverse(self) -> Option<Fraction> {
        Self::new(self.den, self.num)
    }

    /// True when `self` is strictly nearer to `target` than `other` is.
    pub fn closer_than(&self, other: &Fraction, target: &Fraction) -> bool {
        // |a - t| = |a.n*t.d - t.n*a.d| / (a.d*t.d); compare by cross-multiplying.
        let dist = |a: &Fraction| {
            let n = (a.num as i128 * target.den as i128 - target.num as i128 * a.den as i128).abs();
            let d = a.den as i128 * target.den as i128;
            (n, d)
        };
        let (n1, d1) = dist(self);
        let (n2, d2) = dist(other);
        n1 * d2 < n2 * d1
    }

    /// Approximate value, for logging only.
    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Default for Fraction {
    fn default() -> Self {
        Self::ONE
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as i64 * other.den as i64;
        let rhs = other.num as i64 * self.den as i64;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for Fraction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (num, den) = match s.split_once('/') {
            Some((n, d)) => (n.trim(), d.trim()),
            None => (s, "1"),
        };
        let num: i32 = num.parse().map_err(|_| format!("bad numerator in {s:?}"))?;
        let den: i32 = den.parse().map_err(|_| format!("bad denominator in {s:?}"))?;
        Fraction::new(num, den).ok_or_else(|| format!("zero denominator in {s:?}"))
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Display aspect ratio of a `width`×`height` frame with the given PAR.
///
/// Computed as `(width / height) * par`, exactly. Returns `None` for a zero
/// height or when the reduced ratio does not fit in `i32` terms.
pub fn display_aspect_ratio(width: u32, height: u32, par: Fraction) -> Option<Fraction> {
    Fraction::from_i128(
        width as i128 * par.num as i128,
        height as i128 * par.den as i128,
    )
}

/// `value * num / den` rounded to the nearest integer.
///
/// Returns `None` for a non-positive ratio or a result outside `1..=i32::MAX`.
pub fn scale_round(value: u32, num: i32, den: i32) -> Option<u32> {
    if num <= 0 || den <= 0 {
        return None;
    }
    let n = value as u128 * num as u128;
    let d = den as u128;
    let scaled = (n + d / 2) / d;
    u32::try_from(scaled)
        .ok()
        .filter(|v| *v >= 1 && *v <= i32::MAX as u32)
}

/// `value * num / den` only when the division is exact.
pub fn scale_exact(value: u32, num: i32, den: i32) -> Option<u32> {
    if num <= 0 || den <= 0 {
        return None;
    }
    let n = value as u128 * num as u128;
    let d = den as u128;
    if n % d != 0 {
        return None;
    }
    u32::try_from(n / d)
        .ok()
        .filter(|v| *v >= 1 && *v <= i32::MAX as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frac(n: i32, d: i32) -> Fraction {
        Fraction::new(n, d).unwrap()
    }

    #[test]
    fn test_reduction_and_sign() {
        assert_eq!(frac(4, 2), frac(2, 1));
        assert_eq!(frac(3, -6), frac(-1, 2));
        assert_eq!(frac(-1, 2).denom(), 2);
        assert!(Fraction::new(1, 0).is_none());
    }

    #[test]
    fn test_dar_invariant_under_equivalent_par() {
        for (w, h) in [(1920, 1080), (720, 576), (1, 1), (4096, 2160), (33, 17)] {
            let a = display_aspect_ratio(w, h, frac(2, 1)).unwrap();
            let b = display_aspect_ratio(w, h, Fraction::new(4, 2).unwrap()).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_dar_values() {
        assert_eq!(
            display_aspect_ratio(1920, 1080, Fraction::ONE).unwrap(),
            frac(16, 9)
        );
        assert_eq!(
            display_aspect_ratio(720, 576, frac(16, 15)).unwrap(),
            frac(4, 3)
        );
        assert!(display_aspect_ratio(10, 0, Fraction::ONE).is_none());
    }

    #[test]
    fn test_multiply_overflow_is_reported() {
        let big = frac(i32::MAX, 1);
        assert!(big.multiply(frac(2, 1)).is_none());
        assert_eq!(big.multiply(frac(1, i32::MAX)).unwrap(), Fraction::ONE);
    }

    #[test]
    fn test_ordering() {
        assert!(frac(1, 3) < frac(1, 2));
        assert!(frac(16, 9) > frac(4, 3));
        assert!(Fraction::MIN_POSITIVE < Fraction::ONE);
        assert!(Fraction::MAX > frac(1000, 1));
    }

    #[test]
    fn test_closer_than() {
        let target = frac(3, 2);
        assert!(frac(4, 3).closer_than(&frac(2, 1), &target));
        assert!(!frac(2, 1).closer_than(&frac(1, 1), &target));
    }

    #[test]
    fn test_scale() {
        assert_eq!(scale_round(640, 9, 16), Some(360));
        assert_eq!(scale_round(641, 9, 16), Some(361));
        assert_eq!(scale_exact(640, 9, 16), Some(360));
        assert_eq!(scale_exact(641, 9, 16), None);
        assert_eq!(scale_round(1, 1, 4), None);
    }

    #[test]
    fn test_parse_display() {
        assert_eq!("16/9".parse::<Fraction>().unwrap(), frac(16, 9));
        assert_eq!("2".parse::<Fraction>().unwrap(), frac(2, 1));
        assert!("1/0".parse::<Fraction>().is_err());
        assert_eq!(frac(32, 18).to_string(), "16/9");
    }
}
