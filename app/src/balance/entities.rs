//! Account balance arithmetic. Balances only change through credits (paid
//! deposits) and debits (settled payouts). Debits must never drive a balance
//! negative despite concurrent requests, so [`Balance`] carries the amount it
//! was loaded with alongside the working amount; the persistence layer turns
//! that pair into a compare-and-swap update and conflicting writers retry.

use crate::btc;
use crate::user;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Rejection carrying what the caller would need to deposit to make the
/// debit succeed. The recommendation pads the shortfall so a price move
/// between quoting and depositing does not leave the user short again.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("insufficient balance, short {shortfall:?}")]
pub struct InsufficientBalance {
    pub shortfall: btc::Sats,
    pub recommended_topup: btc::Sats,
}

#[derive(Debug, Clone, Default)]
pub struct Balance {
    user_id: user::Id,
    original_amount: btc::Sats,
    amount: btc::Sats,
}

impl Balance {
    pub fn new(user_id: user::Id, amount: btc::Sats) -> Self {
        Self {
            user_id,
            original_amount: amount,
            amount,
        }
    }

    pub fn user_id(&self) -> user::Id {
        self.user_id
    }

    pub fn original_amount(&self) -> btc::Sats {
        self.original_amount
    }

    pub fn amount(&self) -> btc::Sats {
        self.amount
    }

    pub fn changed(&self) -> bool {
        self.original_amount != self.amount
    }

    pub fn credit(&mut self, amount: btc::Sats) {
        self.amount += amount
    }

    /// Debits the balance, rejecting with the shortfall when funds don't
    /// cover the amount. `topup_margin` scales the recommended deposit
    /// (e.g. 1.05 recommends 5% over the shortfall), rounded up to a whole
    /// sat.
    pub fn debit(
        &mut self,
        amount: btc::Sats,
        topup_margin: Decimal,
    ) -> Result<(), InsufficientBalance> {
        if amount > self.amount {
            let shortfall = amount - self.amount;
            let recommended = (Decimal::from(shortfall.0) * topup_margin)
                .round_dp_with_strategy(0, RoundingStrategy::AwayFromZero)
                .to_i64()
                .unwrap_or(shortfall.0);
            return Err(InsufficientBalance {
                shortfall,
                recommended_topup: btc::Sats(recommended),
            });
        }
        self.amount -= amount;
        Ok(())
    }

    /// Debits funds the provider has already moved. The balance cannot be
    /// left negative, so at worst it clamps to zero; the returned amount is
    /// how many sats could not be collected, for the caller to flag.
    pub fn debit_settled(&mut self, amount: btc::Sats) -> btc::Sats {
        if amount > self.amount {
            let uncollected = amount - self.amount;
            self.amount = btc::Sats(0);
            return uncollected;
        }
        self.amount -= amount;
        btc::Sats(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn balance(sats: i64) -> Balance {
        Balance::new(user::Id::default(), btc::Sats(sats))
    }

    #[test]
    fn debit_within_funds() {
        let mut balance = balance(1000);
        balance.debit(btc::Sats(400), dec!(1.05)).unwrap();
        assert_eq!(balance.amount(), btc::Sats(600));
        assert_eq!(balance.original_amount(), btc::Sats(1000));
        assert!(balance.changed());
    }

    #[test]
    fn debit_shortfall_recommends_padded_topup() {
        let mut balance = balance(1000);
        let err = balance.debit(btc::Sats(1500), dec!(1.05)).unwrap_err();
        assert_eq!(err.shortfall, btc::Sats(500));
        assert_eq!(err.recommended_topup, btc::Sats(525));
        // A failed debit must not touch the working amount.
        assert_eq!(balance.amount(), btc::Sats(1000));
        assert!(!balance.changed());
    }

    #[test]
    fn topup_recommendation_rounds_up() {
        let mut balance = balance(0);
        let err = balance.debit(btc::Sats(3), dec!(1.05)).unwrap_err();
        // 3 * 1.05 = 3.15, rounded up to a whole sat.
        assert_eq!(err.recommended_topup, btc::Sats(4));
    }

    #[test]
    fn interleaved_credits_and_debits_replay() {
        let mut balance = balance(0);
        balance.credit(btc::Sats(20_000));
        balance.debit(btc::Sats(5_000), dec!(1.05)).unwrap();
        balance.credit(btc::Sats(1_000));
        balance.debit(btc::Sats(6_000), dec!(1.05)).unwrap();
        assert_eq!(balance.amount(), btc::Sats(10_000));
        assert_eq!(balance.original_amount(), btc::Sats(0));
    }

    #[test]
    fn settled_debit_clamps_at_zero() {
        let mut balance = balance(300);
        assert_eq!(balance.debit_settled(btc::Sats(200)), btc::Sats(0));
        assert_eq!(balance.debit_settled(btc::Sats(500)), btc::Sats(400));
        assert_eq!(balance.amount(), btc::Sats(0));
    }
}
