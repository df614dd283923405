use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Exact non-negative fraction used for rates, thresholds and slash fractions.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: u64,
    pub denominator: u64,
}

impl Ratio {
    pub const fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub const fn zero() -> Self {
        Self::new(0, 1)
    }

    pub const fn one() -> Self {
        Self::new(1, 1)
    }

    pub const fn permille(value: u64) -> Self {
        Self::new(value, 1000)
    }

    pub fn is_zero(&self) -> bool {
        self.numerator == 0
    }

    /// Denominator must be positive.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.denominator == 0 {
            return Err(TypeError::InvalidRatio("zero denominator".into()));
        }
        Ok(())
    }

    /// Validate and require the ratio to lie in `[0, 1]`.
    pub fn validate_fraction(&self) -> Result<(), TypeError> {
        self.validate()?;
        if self.numerator > self.denominator {
            return Err(TypeError::InvalidRatio(format!("{self} exceeds 1")));
        }
        Ok(())
    }

    /// `floor(amount * self)`.
    pub fn mul_floor(&self, amount: u128) -> u128 {
        if self.denominator == 0 {
            return 0;
        }
        mul_div_floor(amount, self.numerator as u128, self.denominator as u128).unwrap_or(u128::MAX)
    }
}

/// `floor(a * b / c)` without intermediate overflow.
///
/// Returns `None` when `c` is zero or the quotient does not fit in `u128`.
pub fn mul_div_floor(a: u128, b: u128, c: u128) -> Option<u128> {
    if c == 0 {
        return None;
    }
    if let Some(product) = a.checked_mul(b) {
        return Some(product / c);
    }
    let (hi, lo) = widening_mul(a, b);
    if hi >= c {
        return None;
    }
    let mut rem = hi;
    let mut quotient: u128 = 0;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= c {
            rem = rem.wrapping_sub(c);
            quotient |= 1;
        }
    }
    Some(quotient)
}

fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    let mask = u64::MAX as u128;
    let (a1, a0) = (a >> 64, a & mask);
    let (b1, b0) = (b >> 64, b & mask);
    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;
    let mid = (p00 >> 64) + (p01 & mask) + (p10 & mask);
    let lo = (p00 & mask) | (mid << 64);
    let hi = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (hi, lo)
}

impl PartialEq for Ratio {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ratio {}

impl PartialOrd for Ratio {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ratio {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.numerator as u128 * other.denominator as u128;
        let rhs = other.numerator as u128 * self.denominator as u128;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Compare `part / whole` against a ratio without division.
pub fn fraction_exceeds(part: u128, whole: u128, threshold: &Ratio) -> bool {
    if whole == 0 {
        return false;
    }
    part.saturating_mul(threshold.denominator as u128)
        > whole.saturating_mul(threshold.numerator as u128)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_value() {
        assert_eq!(Ratio::new(1, 2), Ratio::new(500, 1000));
        assert!(Ratio::new(1, 3) < Ratio::new(1, 2));
    }

    #[test]
    fn mul_floor_truncates() {
        assert_eq!(Ratio::new(1, 3).mul_floor(10), 3);
        assert_eq!(Ratio::permille(50).mul_floor(1000), 50);
    }

    #[test]
    fn mul_div_handles_wide_products() {
        let big = 10u128.pow(30);
        assert_eq!(mul_div_floor(big, big, big), Some(big));
        assert_eq!(mul_div_floor(u128::MAX, 3, 4), Some(u128::MAX / 4 * 3 + 2));
        assert_eq!(mul_div_floor(u128::MAX, 2, 1), None);
        assert_eq!(mul_div_floor(1, 1, 0), None);
    }

    #[test]
    fn fraction_validation() {
        assert!(Ratio::new(1, 0).validate().is_err());
        assert!(Ratio::new(3, 2).validate_fraction().is_err());
        assert!(Ratio::one().validate_fraction().is_ok());
    }

    #[test]
    fn fraction_exceeds_threshold() {
        let half = Ratio::new(1, 2);
        assert!(fraction_exceeds(6, 10, &half));
        assert!(!fraction_exceeds(5, 10, &half));
        assert!(!fraction_exceeds(1, 0, &half));
    }
}
