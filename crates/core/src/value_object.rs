//! Value objects: equality by value, not identity.

use core::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. To "modify"
/// one, build a new value.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Amount of money in the smallest currency unit (e.g. cents).
///
/// Single-currency by construction. Signed, because profit can be negative; prices
/// and costs are validated to be non-negative where they enter the domain.
///
/// `+`, `-` and [`Sum`](core::iter::Sum) saturate at [`Money::MIN`]/[`Money::MAX`];
/// use the `checked_*` methods where an overflow must be refused.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);
    pub const MAX: Money = Money(i64::MAX);
    pub const MIN: Money = Money(i64::MIN);

    /// Number of minor units in one major unit.
    pub const MINOR_PER_MAJOR: i64 = 100;

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// `self × quantity`, `None` on overflow.
    pub fn checked_mul_qty(self, quantity: u64) -> Option<Money> {
        let qty = i64::try_from(quantity).ok()?;
        self.0.checked_mul(qty).map(Money)
    }

    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// `self × quantity`, clamped to [`Money::MIN`]/[`Money::MAX`].
    pub fn saturating_mul_qty(self, quantity: u64) -> Money {
        self.checked_mul_qty(quantity).unwrap_or(match self.0.signum() {
            0 => Money::ZERO,
            -1 => Money::MIN,
            _ => Money::MAX,
        })
    }

    /// Exact decimal amount in minor units.
    pub fn to_decimal(self) -> Decimal {
        Decimal::from(self.0)
    }

    /// Round a decimal amount expressed in minor units half-up (away from zero) to a
    /// whole number of minor units.
    pub fn from_decimal_half_up(minor_units: Decimal) -> Option<Money> {
        minor_units
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Money)
    }

    /// Parse an amount written in major units ("12.50", "12,5", "7").
    ///
    /// Fractions below one minor unit are rounded half-up.
    pub fn parse_major(input: &str) -> Result<Money, DomainError> {
        let normalized = input.trim().replace(',', ".");
        let major = Decimal::from_str(&normalized)
            .map_err(|e| DomainError::validation(format!("invalid amount '{input}': {e}")))?;
        let minor = major
            .checked_mul(Decimal::from(Self::MINOR_PER_MAJOR))
            .ok_or_else(|| DomainError::validation(format!("amount '{input}' is too large")))?;
        Self::from_decimal_half_up(minor)
            .ok_or_else(|| DomainError::validation(format!("amount '{input}' is too large")))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = Self::MINOR_PER_MAJOR as u64;
        write!(f, "{sign}{}.{:02}", abs / per, abs % per)
    }
}

impl core::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        self.saturating_add(rhs)
    }
}

impl core::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        self.saturating_sub(rhs)
    }
}

impl core::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}
