//! Monetary amounts in integer minor units (pence).
//!
//! Every stored or compared amount in the system is a [`Money`] value.
//! Conversion to and from display units (`Decimal` with two fractional
//! digits) happens exactly once per boundary crossing: [`Money::from_major`]
//! where a human-entered or provider-reported decimal enters the system,
//! [`Money::to_major`] where an amount is rendered back to a caller.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// Number of minor units per major unit for the supported currency.
const MINOR_PER_MAJOR: i64 = 100;

/// An amount of money in integer minor units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Wrap an amount already expressed in minor units.
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// The raw minor-unit value, for persistence.
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Convert a decimal major-unit amount to minor units, rounding half-up
    /// to the nearest minor unit.
    pub fn from_major(amount: Decimal) -> Result<Self, ServiceError> {
        let minor = (amount * Decimal::from(MINOR_PER_MAJOR))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        minor
            .to_i64()
            .map(Money)
            .ok_or_else(|| ServiceError::ValidationError(format!("amount out of range: {amount}")))
    }

    /// Exact conversion back to major units (two fractional digits).
    pub fn to_major(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Line total: unit price times a quantity.
    pub fn checked_mul_quantity(self, quantity: i32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_major())
    }
}

/// Sum an iterator of amounts, failing on overflow.
pub fn sum_money<I: IntoIterator<Item = Money>>(amounts: I) -> Result<Money, ServiceError> {
    amounts
        .into_iter()
        .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
        .ok_or_else(|| ServiceError::ValidationError("amount overflow".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn from_major_rounds_half_up() {
        assert_eq!(Money::from_major(dec!(49.99)).unwrap().minor(), 4999);
        assert_eq!(Money::from_major(dec!(0.005)).unwrap().minor(), 1);
        assert_eq!(Money::from_major(dec!(0.004)).unwrap().minor(), 0);
        assert_eq!(Money::from_major(dec!(12.345)).unwrap().minor(), 1235);
    }

    #[test]
    fn to_major_is_exact_division() {
        assert_eq!(Money::from_minor(4999).to_major(), dec!(49.99));
        assert_eq!(Money::from_minor(0).to_major(), dec!(0.00));
        assert_eq!(Money::from_minor(5).to_major(), dec!(0.05));
    }

    #[test]
    fn arithmetic_stays_in_minor_units() {
        let unit = Money::from_minor(1250);
        let line = unit.checked_mul_quantity(3).unwrap();
        assert_eq!(line.minor(), 3750);
        let total = sum_money([line, Money::from_minor(395)]).unwrap();
        assert_eq!(total.minor(), 4145);
        assert_eq!(total.to_major(), dec!(41.45));
    }

    #[test]
    fn overflow_is_an_error() {
        assert!(Money::from_minor(i64::MAX)
            .checked_add(Money::from_minor(1))
            .is_none());
        assert!(sum_money([Money::from_minor(i64::MAX), Money::from_minor(1)]).is_err());
    }

    proptest! {
        // Round-trip holds for every representable two-decimal amount.
        #[test]
        fn major_minor_round_trip(units in -1_000_000_000i64..1_000_000_000i64) {
            let major = Decimal::new(units, 2);
            let money = Money::from_major(major).unwrap();
            prop_assert_eq!(money.to_major(), major);
        }

        #[test]
        fn from_major_never_loses_more_than_half_a_minor_unit(
            units in -1_000_000i64..1_000_000i64,
            extra in 0u32..10u32,
        ) {
            // Three decimal places: the third digit must round away cleanly.
            let major = Decimal::new(units * 10 + i64::from(extra), 3);
            let money = Money::from_major(major).unwrap();
            let diff = (money.to_major() - major).abs();
            prop_assert!(diff <= dec!(0.005));
        }
    }
}
