//! Bitcoin-denominated amount types.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::ops::{Add, AddAssign, Sub, SubAssign};

pub const SATS_PER_BTC: i64 = 100_000_000;

/// An amount of satoshis. All user balances and ledger rows are denominated
/// in whole sats.
#[derive(Debug, Clone, Copy, Default, PartialOrd, Ord, PartialEq, Eq)]
pub struct Sats(pub i64);

impl Sats {
    /// Renders the amount as a BTC decimal with 8 fractional places, the unit
    /// the Lightning gateway speaks on the wire.
    pub fn to_btc(self) -> Decimal {
        Decimal::new(self.0, 8)
    }

    /// Parses a BTC decimal back into whole sats, flooring any sub-satoshi
    /// remainder.
    pub fn from_btc(btc: Decimal) -> Option<Self> {
        (btc * Decimal::from(SATS_PER_BTC)).floor().to_i64().map(Self)
    }
}

impl Add for Sats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Sats {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Sats {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl SubAssign for Sats {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn renders_btc_with_eight_places() {
        assert_eq!(Sats(20_000).to_btc().to_string(), "0.00020000");
        assert_eq!(Sats(SATS_PER_BTC).to_btc(), dec!(1));
    }

    #[test]
    fn parses_btc_flooring_sub_satoshi_amounts() {
        assert_eq!(Sats::from_btc(dec!(0.00020000)), Some(Sats(20_000)));
        assert_eq!(Sats::from_btc(dec!(0.000000015)), Some(Sats(1)));
        assert_eq!(Sats::from_btc(dec!(0)), Some(Sats(0)));
    }
}
