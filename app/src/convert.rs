//! Pure fiat → satoshi conversion with layered fee and spread adjustment.
//! None of this touches the network; the BTC/BRL price comes in as an
//! argument so callers decide how fresh it has to be.

use crate::brl::{self, Cents};
use crate::btc::{Sats, SATS_PER_BTC};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("amount must be at least {min} BRL")]
    AmountTooLow { min: Decimal },
    #[error("amount can be at most {max} BRL")]
    AmountTooHigh { max: Decimal },
    #[error("amount is not representable")]
    InvalidAmount,
}

/// Per-transfer bounds, injected from configuration.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub min: Decimal,
    pub max: Decimal,
}

/// Fee and spread policy, injected from configuration.
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    /// The settlement provider's cut on every transfer, e.g. 0.01.
    pub fee_rate: Decimal,
    /// BTC/BRL spread between the quoted and executed rate, e.g. 0.05.
    pub spread_rate: Decimal,
    /// Multiplier applied to a balance shortfall when recommending a top-up,
    /// e.g. 1.05 to absorb price drift between quote and settlement.
    pub topup_margin: Decimal,
    pub limits: Limits,
}

/// Which way the money moves. Payouts carry the conversion spread on top of
/// the provider fee; deposits only carry the fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Deposit,
    Payout,
}

/// The result of validating and adjusting a fiat amount. `amount_cents` is
/// the face value; the adjusted figures are what the satoshi side must cover
/// once the provider fee (and, for payouts, the spread) is grossed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub amount_cents: Cents,
    pub adjusted_amount: Decimal,
    pub adjusted_amount_cents: Cents,
    pub adjusted_amount_sats: Sats,
}

/// Converts a BRL amount to satoshis at the given price, always flooring so
/// the satoshi side is never worth more than the fiat that backs it.
pub fn brl_to_sats(amount_brl: Decimal, price_brl_per_btc: Decimal) -> Sats {
    if price_brl_per_btc <= Decimal::ZERO || amount_brl <= Decimal::ZERO {
        return Sats(0);
    }
    let sats = amount_brl / price_brl_per_btc * Decimal::from(SATS_PER_BTC);
    Sats(sats.floor().to_i64().unwrap_or(i64::MAX))
}

/// Validates a fiat amount against the configured bounds and grosses it up
/// for the provider fee and, on the payout direction, the conversion spread.
/// Intermediate values are rounded to whole centavos before sats are derived.
pub fn quote(
    amount_brl: Decimal,
    price_brl_per_btc: Decimal,
    direction: Direction,
    policy: &Policy,
    override_limits: bool,
) -> Result<Quote, Error> {
    let amount_brl = brl::round_centavos(amount_brl);
    if amount_brl.is_sign_negative() {
        return Err(Error::InvalidAmount);
    }
    if !override_limits {
        if amount_brl < policy.limits.min {
            return Err(Error::AmountTooLow {
                min: policy.limits.min,
            });
        }
        if amount_brl > policy.limits.max {
            return Err(Error::AmountTooHigh {
                max: policy.limits.max,
            });
        }
    }
    let amount_cents = Cents::from_decimal(amount_brl).ok_or(Error::InvalidAmount)?;

    // Gross up so the provider's cut comes out of the adjusted amount, not
    // out of what the payee receives.
    let adjusted_amount = brl::round_centavos(amount_brl / (Decimal::ONE - policy.fee_rate));
    let adjusted_amount_cents = Cents::from_decimal(adjusted_amount).ok_or(Error::InvalidAmount)?;

    let sats_basis = match direction {
        Direction::Deposit => adjusted_amount,
        Direction::Payout => {
            brl::round_centavos(adjusted_amount / (Decimal::ONE - policy.spread_rate))
        }
    };

    Ok(Quote {
        amount_cents,
        adjusted_amount,
        adjusted_amount_cents,
        adjusted_amount_sats: brl_to_sats(sats_basis, price_brl_per_btc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn policy() -> Policy {
        Policy {
            fee_rate: dec!(0.01),
            spread_rate: dec!(0.05),
            topup_margin: dec!(1.05),
            limits: Limits {
                min: dec!(0.01),
                max: dec!(50),
            },
        }
    }

    #[test]
    fn converts_brl_to_sats_flooring() {
        assert_eq!(brl_to_sats(dec!(100), dec!(500000)), Sats(20_000));
        assert_eq!(brl_to_sats(dec!(0), dec!(500000)), Sats(0));
        // 0.07 / 600000 * 1e8 = 11.66... -> 11, not 12
        assert_eq!(brl_to_sats(dec!(0.07), dec!(600000)), Sats(11));
    }

    #[test]
    fn brl_to_sats_is_monotonic_in_amount() {
        let price = dec!(517234.19);
        let mut last = Sats(0);
        for cents in 0..500i64 {
            let sats = brl_to_sats(Decimal::new(cents, 2), price);
            assert!(sats >= last);
            last = sats;
        }
    }

    #[test]
    fn brl_to_sats_is_antitonic_in_price() {
        let amount = dec!(25.00);
        let mut last = Sats(i64::MAX);
        for step in 1..50i64 {
            let price = Decimal::from(step * 100_000);
            let sats = brl_to_sats(amount, price);
            assert!(sats <= last);
            last = sats;
        }
    }

    #[test]
    fn rejects_amounts_outside_the_bounds() {
        assert_eq!(
            quote(dec!(0.001), dec!(500000), Direction::Payout, &policy(), false),
            Err(Error::AmountTooLow { min: dec!(0.01) })
        );
        assert_eq!(
            quote(dec!(50.01), dec!(500000), Direction::Payout, &policy(), false),
            Err(Error::AmountTooHigh { max: dec!(50) })
        );
    }

    #[test]
    fn override_limits_admits_out_of_bounds_amounts() {
        let quote = quote(dec!(500), dec!(500000), Direction::Deposit, &policy(), true).unwrap();
        assert_eq!(quote.amount_cents, Cents(50_000));
    }

    #[test]
    fn grosses_up_the_provider_fee_to_the_nearest_cent() {
        let quote = quote(dec!(10.00), dec!(500000), Direction::Deposit, &policy(), false).unwrap();
        assert_eq!(quote.amount_cents, Cents(1000));
        // 10.00 / 0.99 = 10.1010... -> 10.10
        assert_eq!(quote.adjusted_amount, dec!(10.10));
        assert_eq!(quote.adjusted_amount_cents, Cents(1010));
        // Deposits carry no spread: sats are derived from 10.10 directly.
        assert_eq!(quote.adjusted_amount_sats, brl_to_sats(dec!(10.10), dec!(500000)));
    }

    #[test]
    fn payouts_additionally_cover_the_spread() {
        let quote = quote(dec!(10.00), dec!(500000), Direction::Payout, &policy(), false).unwrap();
        assert_eq!(quote.adjusted_amount_cents, Cents(1010));
        // 10.10 / 0.95 = 10.6315... -> 10.63 -> floor(10.63 / 500000 * 1e8)
        assert_eq!(quote.adjusted_amount_sats, Sats(2126));
    }
}
