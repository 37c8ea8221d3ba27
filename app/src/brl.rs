//! Fiat (BRL) amount types. The PIX gateway wire format is integer cents;
//! user-facing amounts are 2-place decimals. Conversions always round to the
//! nearest cent so sub-cent drift never accumulates into a provider charge.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// An amount of BRL cents.
#[derive(Debug, Clone, Copy, Default, PartialOrd, Ord, PartialEq, Eq)]
pub struct Cents(pub i64);

impl Cents {
    /// Converts a 2-place BRL decimal into cents, rounding halves away from
    /// zero. Returns `None` if the amount does not fit an `i64`.
    pub fn from_decimal(amount: Decimal) -> Option<Self> {
        (round_centavos(amount) * Decimal::from(100)).to_i64().map(Self)
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }
}

/// Rounds a BRL decimal to whole centavos, halves away from zero.
pub fn round_centavos(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl Add for Cents {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Cents {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl SubAssign for Cents {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn converts_decimals_to_cents() {
        assert_eq!(Cents::from_decimal(dec!(10.10)), Some(Cents(1010)));
        assert_eq!(Cents::from_decimal(dec!(0.01)), Some(Cents(1)));
        assert_eq!(Cents::from_decimal(dec!(0)), Some(Cents(0)));
    }

    #[test]
    fn rounds_sub_cent_amounts_half_away_from_zero() {
        assert_eq!(Cents::from_decimal(dec!(10.101)), Some(Cents(1010)));
        assert_eq!(Cents::from_decimal(dec!(10.105)), Some(Cents(1011)));
        assert_eq!(Cents::from_decimal(dec!(10.109)), Some(Cents(1011)));
    }

    #[test]
    fn round_trips_through_decimal() {
        assert_eq!(Cents(1234).to_decimal(), dec!(12.34));
        assert_eq!(Cents::from_decimal(Cents(1234).to_decimal()), Some(Cents(1234)));
    }
}
