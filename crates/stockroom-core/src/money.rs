//! # Money Module
//!
//! Provides the `Money` type and store-level rounding rules.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A cash drawer variance of 0.00000000004 is still "non-zero" and       │
//! │  would send a perfectly balanced session to the approval queue.        │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units                                     │
//! │    Every amount is an i64 count of the currency's smallest unit.       │
//! │    Expected cash, actual cash and variance are exact.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::money::Money;
//! use stockroom_core::quantity::Quantity;
//!
//! let price = Money::from_minor(1000);
//! let line = price.checked_times(Quantity::from_units(3)).unwrap();
//! assert_eq!(line.minor(), 3000);
//!
//! // Overflow is reported, never wrapped
//! assert_eq!(Money::from_minor(i64::MAX).checked_add(price), None);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::quantity::{Quantity, QUANTITY_SCALE};
use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: variance and rounding adjustments can be negative
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **No currency field**: a deployment runs in one currency
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  CartLine.unit_price ──► line subtotal ──► cart subtotal               │
/// │                                               │                         │
/// │                                  discount ──► tax ──► rounding ──► total│
/// │                                                                         │
/// │  payments ──► change ──► cash kept ──► session expected cash            │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use stockroom_core::money::Money;
    ///
    /// let price = Money::from_minor(1099);
    /// assert_eq!(price.minor(), 1099);
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Creates a Money value from major and minor units (two decimals).
    ///
    /// For negative amounts, only the major unit should be negative:
    /// `from_major_minor(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
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

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    #[inline]
    pub const fn checked_add(self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Money(sum)),
            None => None,
        }
    }

    #[inline]
    pub const fn checked_sub(self, other: Money) -> Option<Money> {
        match self.0.checked_sub(other.0) {
            Some(difference) => Some(Money(difference)),
            None => None,
        }
    }

    /// Sums amounts, `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, amount| acc.checked_add(amount))
    }

    /// Multiplies a unit price by a (possibly fractional) quantity.
    ///
    /// Rounds half away from zero to the nearest minor unit. `None` when the
    /// result does not fit.
    ///
    /// ## Example
    /// ```rust
    /// use stockroom_core::money::Money;
    /// use stockroom_core::quantity::Quantity;
    ///
    /// let per_kg = Money::from_minor(12_000);
    /// let line = per_kg.checked_times(Quantity::from_milli(1_250)).unwrap(); // 1.25 kg
    /// assert_eq!(line.minor(), 15_000);
    ///
    /// assert_eq!(Money::from_minor(1 << 62).checked_times(Quantity::from_units(4)), None);
    /// ```
    pub fn checked_times(&self, quantity: Quantity) -> Option<Money> {
        let product = self.0 as i128 * quantity.milli() as i128;
        narrow(div_round_half_away(product, QUANTITY_SCALE as i128))
    }

    /// Calculates tax added on top of this amount (exclusive tax).
    ///
    /// ## Implementation
    /// Integer math: `amount * bps / 10000`, rounded half up.
    ///
    /// ```rust
    /// use stockroom_core::money::Money;
    /// use stockroom_core::types::TaxRate;
    ///
    /// let tax = Money::from_minor(1000).calculate_tax(TaxRate::from_bps(825));
    /// assert_eq!(tax, Some(Money::from_minor(83)));
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Option<Money> {
        let tax = self.0 as i128 * rate.bps() as i128;
        narrow(div_round_half_away(tax, 10_000))
    }

    /// Calculates the tax already contained in this amount (inclusive tax).
    ///
    /// `tax = amount - amount * 10000 / (10000 + bps)`
    ///
    /// ```rust
    /// use stockroom_core::money::Money;
    /// use stockroom_core::types::TaxRate;
    ///
    /// // 11000 including 10% tax contains 1000 tax
    /// let tax = Money::from_minor(11_000).included_tax(TaxRate::from_bps(1000));
    /// assert_eq!(tax, Some(Money::from_minor(1000)));
    /// ```
    pub fn included_tax(&self, rate: TaxRate) -> Option<Money> {
        if rate.is_zero() {
            return Some(Money::zero());
        }
        let net = div_round_half_away(self.0 as i128 * 10_000, 10_000 + rate.bps() as i128);
        narrow(self.0 as i128 - net)
    }

    /// Applies a percentage in basis points and returns that share.
    ///
    /// ```rust
    /// use stockroom_core::money::Money;
    ///
    /// let share = Money::from_minor(10_000).percentage(1000); // 10%
    /// assert_eq!(share, Some(Money::from_minor(1000)));
    /// ```
    pub fn percentage(&self, bps: u32) -> Option<Money> {
        narrow(div_round_half_away(self.0 as i128 * bps as i128, 10_000))
    }
}

fn narrow(minor: i128) -> Option<Money> {
    i64::try_from(minor).ok().map(Money)
}

/// Integer division rounding half away from zero.
fn div_round_half_away(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if 2 * remainder.abs() >= denominator.abs() {
        quotient + numerator.signum() * denominator.signum()
    } else {
        quotient
    }
}

// =============================================================================
// Rounding
// =============================================================================

/// How a store rounds the payable total.
///
/// Cash-heavy markets do not circulate the smallest coins, so totals are
/// rounded to a unit such as 100 before payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum RoundingMode {
    /// Totals are charged exactly.
    #[default]
    None,
    /// Round to the nearest unit, halves up.
    Nearest,
    /// Always round up to the next unit.
    Up,
    /// Always round down to the previous unit.
    Down,
}

/// A rounding mode together with its unit in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RoundingRule {
    pub mode: RoundingMode,
    /// Rounding unit in minor units (e.g. 100). Values below 2 disable rounding.
    pub unit: i64,
}

impl RoundingRule {
    pub const fn new(mode: RoundingMode, unit: i64) -> Self {
        RoundingRule { mode, unit }
    }

    /// Exact totals, no rounding.
    pub const fn none() -> Self {
        RoundingRule {
            mode: RoundingMode::None,
            unit: 1,
        }
    }

    /// Applies the rule to a (non-negative) amount.
    ///
    /// Saturates at `i64::MAX`; callers bound the result.
    ///
    /// ```rust
    /// use stockroom_core::money::{Money, RoundingMode, RoundingRule};
    ///
    /// let rule = RoundingRule::new(RoundingMode::Nearest, 100);
    /// assert_eq!(rule.apply(Money::from_minor(12_349)).minor(), 12_300);
    /// assert_eq!(rule.apply(Money::from_minor(12_350)).minor(), 12_400);
    /// ```
    pub fn apply(&self, amount: Money) -> Money {
        let unit = self.unit;
        if unit < 2 {
            return amount;
        }

        let value = amount.minor();
        let floor = value.div_euclid(unit) * unit;
        let remainder = value.rem_euclid(unit);

        let rounded = match self.mode {
            RoundingMode::None => value,
            RoundingMode::Down => floor,
            RoundingMode::Up if remainder == 0 => value,
            RoundingMode::Up => floor.saturating_add(unit),
            RoundingMode::Nearest if remainder >= unit - remainder => floor.saturating_add(unit),
            RoundingMode::Nearest => floor,
        };

        Money::from_minor(rounded)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-oriented display with two decimals; the request layer localizes.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// Multiplication by a whole count.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, count: i64) -> Self {
        Money(self.0 * count)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).minor(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).minor(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_minor(1099).to_string(), "10.99");
        assert_eq!(Money::from_minor(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_times_fractional_quantity() {
        let per_kg = Money::from_minor(999);
        // 0.5 kg of 9.99 = 4.995 → 5.00
        assert_eq!(per_kg.checked_times(Quantity::from_milli(500)), Some(Money::from_minor(500)));
        assert_eq!(per_kg.checked_times(Quantity::from_units(3)), Some(Money::from_minor(2997)));
    }

    #[test]
    fn test_times_overflow_is_none() {
        // 4 x 2^62 is exactly 2^64, which used to wrap to 0
        let huge = Money::from_minor(1 << 62);
        assert_eq!(huge.checked_times(Quantity::from_units(4)), None);
        assert_eq!(
            Money::from_minor(i64::MIN).checked_times(Quantity::from_units(2)),
            None
        );
        assert!(huge.checked_times(Quantity::from_units(1)).is_some());
    }

    #[test]
    fn test_exclusive_tax() {
        let amount = Money::from_minor(1000);
        assert_eq!(amount.calculate_tax(TaxRate::from_bps(1000)), Some(Money::from_minor(100)));
        assert_eq!(amount.calculate_tax(TaxRate::from_bps(825)), Some(Money::from_minor(83)));
        assert_eq!(amount.calculate_tax(TaxRate::zero()), Some(Money::zero()));

        // A rate above 100% on a huge amount does not fit
        assert_eq!(
            Money::from_minor(i64::MAX).calculate_tax(TaxRate::from_bps(20_000)),
            None
        );
    }

    #[test]
    fn test_inclusive_tax() {
        // 111.00 including 11% contains 11.00 tax
        let gross = Money::from_minor(11_100);
        assert_eq!(gross.included_tax(TaxRate::from_bps(1100)), Some(Money::from_minor(1100)));
        assert_eq!(gross.included_tax(TaxRate::zero()), Some(Money::zero()));
        assert!(Money::from_minor(i64::MAX)
            .included_tax(TaxRate::from_bps(1100))
            .is_some());
    }

    #[test]
    fn test_rounding_rules() {
        let amount = Money::from_minor(12_301);
        assert_eq!(
            RoundingRule::new(RoundingMode::Up, 100).apply(amount).minor(),
            12_400
        );
        assert_eq!(
            RoundingRule::new(RoundingMode::Down, 100).apply(amount).minor(),
            12_300
        );
        assert_eq!(
            RoundingRule::new(RoundingMode::Nearest, 500).apply(amount).minor(),
            12_500
        );
        assert_eq!(RoundingRule::none().apply(amount).minor(), 12_301);

        // Exact multiples never move
        let exact = Money::from_minor(12_300);
        assert_eq!(RoundingRule::new(RoundingMode::Up, 100).apply(exact), exact);

        let near_max = Money::from_minor(i64::MAX - 1);
        assert_eq!(
            RoundingRule::new(RoundingMode::Up, 100).apply(near_max).minor(),
            i64::MAX
        );
    }

    #[test]
    fn test_sum() {
        let total: Money = [100, 250, -50]
            .into_iter()
            .map(Money::from_minor)
            .sum();
        assert_eq!(total.minor(), 300);
    }

    #[test]
    fn test_checked_sum() {
        let amounts = [100, 250].map(Money::from_minor);
        assert_eq!(Money::checked_sum(amounts), Some(Money::from_minor(350)));

        let overflowing = [i64::MAX, i64::MAX].map(Money::from_minor);
        assert_eq!(Money::checked_sum(overflowing), None);
        assert_eq!(Money::checked_sum([]), Some(Money::zero()));
        assert_eq!(Money::from_minor(i64::MIN).checked_sub(Money::from_minor(1)), None);
    }
}
