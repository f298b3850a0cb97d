//! # Quantity Module
//!
//! Provides the `Quantity` type for on-hand stock and line quantities.
//!
//! ## Why Fixed Point?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE SAME PROBLEM AS MONEY                                              │
//! │                                                                         │
//! │  Stock is sold by the piece, but also by weight and volume:            │
//! │    1.25 kg rice, 0.5 l oil                                             │
//! │                                                                         │
//! │  With floats the ledger drifts:                                        │
//! │    0.1 + 0.2 - 0.3 = 0.00000000000000005  ❌ not zero                   │
//! │                                                                         │
//! │  OUR SOLUTION: integer thousandths ("milli-units")                     │
//! │    1.25 kg = 1250, 0.5 l = 500, 12 pcs = 12000                         │
//! │    Σ movements == stock quantity holds exactly                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::quantity::Quantity;
//!
//! let case = Quantity::from_units(12);
//! let loose: Quantity = "0.5".parse().unwrap();
//!
//! assert_eq!((case + loose).milli(), 12_500);
//! assert_eq!((case + loose).to_string(), "12.5");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

/// Number of milli-units in one whole unit.
pub const QUANTITY_SCALE: i64 = 1000;

/// A stock quantity in thousandths of a unit.
///
/// Signed: movement quantities are negative for decreases.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    /// Creates a quantity from milli-units.
    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Quantity(milli)
    }

    /// Creates a quantity from whole units.
    ///
    /// ```rust
    /// use stockroom_core::quantity::Quantity;
    /// assert_eq!(Quantity::from_units(3).milli(), 3000);
    /// ```
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * QUANTITY_SCALE)
    }

    /// Returns the raw value in milli-units.
    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    /// Zero quantity.
    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Quantity(self.0.abs())
    }

    /// Ratio `self / other` as a quantity (e.g. 12 units per case).
    ///
    /// Rounds half away from zero to the nearest milli-unit.
    /// Returns `None` when `other` is zero.
    pub fn ratio_to(&self, other: Quantity) -> Option<Quantity> {
        if other.0 == 0 {
            return None;
        }
        let num = self.0 as i128 * QUANTITY_SCALE as i128;
        let den = other.0 as i128;
        let quotient = num / den;
        let remainder = num % den;
        let rounded = if 2 * remainder.abs() >= den.abs() {
            quotient + num.signum() * den.signum()
        } else {
            quotient
        };
        Some(Quantity(rounded as i64))
    }
}

// =============================================================================
// Parsing & Display
// =============================================================================

/// Parses a decimal literal with at most three fractional digits.
///
/// `"12"`, `"1.5"`, `"-0.250"` are accepted; `"1.2345"`, `"abc"`, `""` are not.
impl FromStr for Quantity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "quantity".to_string(),
            reason: reason.to_string(),
        };

        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::required("quantity"));
        }

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (whole, fraction) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("no digits"));
        }
        if fraction.len() > 3 {
            return Err(invalid("at most 3 decimal places"));
        }
        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if !all_digits(whole) || !all_digits(fraction) {
            return Err(invalid("must be a decimal number"));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("too large"))?
        };
        let fraction_milli: i64 = if fraction.is_empty() {
            0
        } else {
            format!("{:0<3}", fraction)
                .parse()
                .map_err(|_| invalid("must be a decimal number"))?
        };

        let milli = whole
            .checked_mul(QUANTITY_SCALE)
            .and_then(|w| w.checked_add(fraction_milli))
            .ok_or_else(|| invalid("too large"))?;

        Ok(Quantity(if negative { -milli } else { milli }))
    }
}

/// Shows the shortest exact decimal: `12`, `1.5`, `-0.25`.
impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / QUANTITY_SCALE as u64;
        let fraction = abs % QUANTITY_SCALE as u64;

        if fraction == 0 {
            write!(f, "{}{}", sign, whole)
        } else {
            let fraction = format!("{:03}", fraction);
            write!(f, "{}{}.{}", sign, whole, fraction.trim_end_matches('0'))
        }
    }
}

// =============================================================================
// Arithmetic
// =============================================================================

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Quantity(self.0 - other.0)
    }
}

impl SubAssign for Quantity {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Quantity {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Quantity(-self.0)
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), |acc, q| acc + q)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("12".parse::<Quantity>().unwrap().milli(), 12_000);
        assert_eq!("1.5".parse::<Quantity>().unwrap().milli(), 1_500);
        assert_eq!("0.25".parse::<Quantity>().unwrap().milli(), 250);
        assert_eq!(".5".parse::<Quantity>().unwrap().milli(), 500);
        assert_eq!("-3".parse::<Quantity>().unwrap().milli(), -3_000);

        assert!("".parse::<Quantity>().is_err());
        assert!("1.2345".parse::<Quantity>().is_err());
        assert!("1,5".parse::<Quantity>().is_err());
        assert!("abc".parse::<Quantity>().is_err());
        assert!("-".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Quantity::from_units(47).to_string(), "47");
        assert_eq!(Quantity::from_milli(1_500).to_string(), "1.5");
        assert_eq!(Quantity::from_milli(-250).to_string(), "-0.25");
        assert_eq!(Quantity::from_milli(1_005).to_string(), "1.005");
        assert_eq!(Quantity::zero().to_string(), "0");
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Quantity::from_units(20);
        let b = Quantity::from_units(5);
        assert_eq!(a - b, Quantity::from_units(15));
        assert_eq!(-b, Quantity::from_units(-5));

        let total: Quantity = vec![a, -b, Quantity::from_milli(500)].into_iter().sum();
        assert_eq!(total.milli(), 15_500);
    }

    #[test]
    fn test_ratio() {
        let case = Quantity::from_units(1);
        let units = Quantity::from_units(12);
        assert_eq!(units.ratio_to(case), Some(Quantity::from_units(12)));

        // 1 / 3 = 0.333
        assert_eq!(
            Quantity::from_units(1).ratio_to(Quantity::from_units(3)),
            Some(Quantity::from_milli(333))
        );
        // 2 / 3 = 0.667 (half away from zero)
        assert_eq!(
            Quantity::from_units(2).ratio_to(Quantity::from_units(3)),
            Some(Quantity::from_milli(667))
        );
        assert_eq!(units.ratio_to(Quantity::zero()), None);
    }
}
