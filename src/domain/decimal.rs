//! Lossless decimal numeric type backed by rust_decimal.
//!
//! Strikes, quantities, prices and commissions all flow through this type so that strike
//! matching and P&L sums never pick up floating-point drift.

use rust_decimal::{Decimal as RustDecimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lossless decimal numeric type for financial calculations.
///
/// Serializes to a JSON number (not string).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Decimal {
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse a Decimal from a string losslessly.
    ///
    /// Accepts thousands separators and surrounding whitespace, which broker exports
    /// commonly contain. Scientific notation falls back to `from_scientific`.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
        RustDecimal::from_str(&cleaned)
            .or_else(|_| RustDecimal::from_scientific(&cleaned))
            .map(Decimal)
    }

    pub fn from_i64(value: i64) -> Self {
        Decimal(RustDecimal::from(value))
    }

    /// Format without exponent notation and without trailing zeros.
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    pub fn one() -> Self {
        Decimal(RustDecimal::ONE)
    }

    pub fn hundred() -> Self {
        Decimal(RustDecimal::ONE_HUNDRED)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the value is > 0.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// Returns true if the value is < 0.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    pub fn abs(&self) -> Self {
        Decimal(self.0.abs())
    }

    /// Round half away from zero to `dp` decimal places.
    pub fn round_dp(&self, dp: u32) -> Self {
        Decimal(
            self.0
                .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// `|self - other| <= tolerance`.
    pub fn within(&self, other: Decimal, tolerance: Decimal) -> bool {
        (*self - other).abs() <= tolerance
    }

    pub fn max(self, other: Decimal) -> Decimal {
        if other > self {
            other
        } else {
            self
        }
    }

    pub fn min(self, other: Decimal) -> Decimal {
        if other < self {
            other
        } else {
            self
        }
    }

    /// Division that yields None instead of panicking on a zero divisor.
    pub fn checked_div(&self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_div(rhs.0).map(Decimal)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal::from_i64(value)
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Decimal {
    fn add_assign(&mut self, rhs: Decimal) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl std::iter::Sum for Decimal {
    fn sum<I: Iterator<Item = Decimal>>(iter: I) -> Decimal {
        iter.fold(Decimal::zero(), |acc, d| acc + d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_decimal_parse_broker_formats() {
        assert_eq!(d("1,250.50"), d("1250.5"));
        assert_eq!(d("  42 "), d("42"));
        assert_eq!(d("1e2"), d("100"));
        assert!(Decimal::from_str_canonical("abc").is_err());
    }

    #[test]
    fn test_decimal_canonical_no_trailing_zeros() {
        assert_eq!(d("105.000").to_canonical_string(), "105");
        assert_eq!(d("0.0500").to_canonical_string(), "0.05");
    }

    #[test]
    fn test_round_dp_half_away_from_zero() {
        assert_eq!(d("100.005").round_dp(2), d("100.01"));
        assert_eq!(d("-2.345").round_dp(2), d("-2.35"));
        assert_eq!(d("99.994").round_dp(2), d("99.99"));
    }

    #[test]
    fn test_within_tolerance() {
        assert!(d("100.04").within(d("100"), d("0.05")));
        assert!(d("99.95").within(d("100"), d("0.05")));
        assert!(!d("100.06").within(d("100"), d("0.05")));
    }

    #[test]
    fn test_decimal_arithmetic_and_sum() {
        let total: Decimal = vec![d("10.5"), d("-2.5"), d("1")].into_iter().sum();
        assert_eq!(total, d("9"));
        assert_eq!((d("10.5") * d("2")).to_canonical_string(), "21");
        assert_eq!(d("1").checked_div(Decimal::zero()), None);
    }

    #[test]
    fn test_decimal_json_serialization() {
        let json = serde_json::to_value(d("123.456")).unwrap();
        assert!(json.is_number());
        assert_eq!(json.to_string(), "123.456");
    }

    #[test]
    fn test_min_max() {
        assert_eq!(d("5").min(d("3")), d("3"));
        assert_eq!(d("5").max(d("3")), d("5"));
    }
}
