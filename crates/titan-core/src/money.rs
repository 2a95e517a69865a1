//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  On a printed receipt that shows up as "PHP 0.30000000000000004"       │
//! │  or as totals that do not add up after rounding.                       │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units (centavos)                          │
//! │    49900 centavos ──► "499.00", always two decimals                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use titan_core::money::Money;
//!
//! let price = Money::from_major(499);       // 499.00
//! let line = price * 2;                     // 998.00
//! assert_eq!(line.format_amount(), "998.00");
//! assert_eq!(Money::from_cents(123456).with_currency("PHP"), "PHP 1,234.56");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for refunds, discounts
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Serialized as an integer**: the wire never carries floats
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  ReceiptLineItem.unit_price ──► line_total ──► Receipt.subtotal        │
/// │                                                     │                   │
/// │                                     Receipt.discount ┤                   │
/// │                                                     ▼                   │
/// │                    Receipt.tendered ──► Receipt.total ──► change        │
/// │                                                                         │
/// │  Every amount on a printed receipt flows through format_amount()       │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units (centavos, cents).
    ///
    /// ## Example
    /// ```rust
    /// use titan_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // Represents 10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole major units.
    ///
    /// ## Example
    /// ```rust
    /// use titan_core::money::Money;
    ///
    /// assert_eq!(Money::from_major(499).cents(), 49900);
    /// ```
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Money(major * 100)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ## Note
    /// For negative amounts, only the major unit should be negative.
    /// `from_major_minor(-5, 50)` = -5.50, not -4.50
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
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use titan_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Formats the amount with exactly two decimals and thousands separators.
    ///
    /// ## Example
    /// ```rust
    /// use titan_core::money::Money;
    ///
    /// assert_eq!(Money::from_major(499).format_amount(), "499.00");
    /// assert_eq!(Money::from_cents(123456789).format_amount(), "1,234,567.89");
    /// assert_eq!(Money::from_cents(-550).format_amount(), "-5.50");
    /// ```
    pub fn format_amount(&self) -> String {
        let magnitude = self.0.unsigned_abs();
        let digits = (magnitude / 100).to_string();

        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, grouped, magnitude % 100)
    }

    /// Formats the amount prefixed with a currency code (`PHP 499.00`).
    pub fn with_currency(&self, currency: &str) -> String {
        format!("{} {}", currency, self.format_amount())
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows the two-decimal amount without a currency code.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_amount())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
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

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
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
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor_part(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_format_amount_two_decimals() {
        assert_eq!(Money::from_cents(0).format_amount(), "0.00");
        assert_eq!(Money::from_cents(5).format_amount(), "0.05");
        assert_eq!(Money::from_major(499).format_amount(), "499.00");
        assert_eq!(Money::from_cents(-550).format_amount(), "-5.50");
    }

    #[test]
    fn test_format_amount_groups_thousands() {
        assert_eq!(Money::from_major(1000).format_amount(), "1,000.00");
        assert_eq!(Money::from_cents(99_999_999).format_amount(), "999,999.99");
        assert_eq!(Money::from_major(1_234_567).format_amount(), "1,234,567.00");
        assert_eq!(Money::from_major(-12_000).format_amount(), "-12,000.00");
    }

    #[test]
    fn test_with_currency() {
        assert_eq!(Money::from_major(499).with_currency("PHP"), "PHP 499.00");
        assert_eq!(format!("{}", Money::from_cents(1099)), "10.99");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        let negative = Money::from_cents(-100);
        assert!(negative.is_negative());
        assert_eq!(negative.abs().cents(), 100);
    }

    #[test]
    fn test_serializes_as_integer_minor_units() {
        let json = serde_json::to_string(&Money::from_major(499)).unwrap();
        assert_eq!(json, "49900");
    }
}
