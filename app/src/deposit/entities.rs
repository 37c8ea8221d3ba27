//! Handles the logic of users depositing funds into their balance.
//! The deposit flow goes as follows:
//! - the user requests a [`Deposit`], which creates a Lightning invoice at
//! the settlement gateway for the chosen amount
//! - the user pays the invoice from any Lightning wallet
//! - reconciliation observes the invoice as paid at the gateway and calls
//! [`Deposit::settle`], crediting the user balance exactly once.

use crate::balance::Balance;
use crate::btc;
use crate::ln;
use crate::user;
use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Id(pub Uuid);

/// A Lightning invoice awaiting (or having received) payment into a user
/// balance.
#[derive(Debug, Clone)]
pub struct Deposit {
    pub id: Id,
    pub user_id: user::Id,
    pub amount: btc::Sats,
    pub invoice_id: ln::InvoiceId,
    pub lnurl: ln::Lnurl,
    pub created: DateTime<Utc>,
    pub paid: Option<DateTime<Utc>>,
}

impl Deposit {
    pub(crate) fn create(
        user_id: user::Id,
        amount: btc::Sats,
        invoice_id: ln::InvoiceId,
        lnurl: ln::Lnurl,
    ) -> Self {
        Self {
            id: Id(Uuid::new_v4()),
            user_id,
            amount,
            invoice_id,
            lnurl,
            created: Utc::now(),
            paid: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.paid.is_some()
    }

    /// Settles the deposit, finally crediting the user balance. Called when
    /// the gateway reports the invoice as paid.
    pub(crate) fn settle(&mut self, balance: &mut Balance) {
        if self.is_paid() {
            panic!("deposit {:?} has already been settled", self.id)
        }
        if balance.user_id() != self.user_id {
            panic!(
                "deposit {:?} settled against balance of user {:?}",
                self.id,
                balance.user_id()
            )
        }
        self.paid = Some(Utc::now());
        balance.credit(self.amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit(user_id: user::Id) -> Deposit {
        Deposit::create(
            user_id,
            btc::Sats(20_000),
            ln::InvoiceId("inv-1".to_string()),
            ln::Lnurl("lnbc200u1...".to_string()),
        )
    }

    #[test]
    fn settle_credits_once() {
        let user_id = user::Id(Uuid::from_u128(7));
        let mut deposit = deposit(user_id);
        let mut balance = Balance::new(user_id, btc::Sats(1_000));

        assert!(!deposit.is_paid());
        deposit.settle(&mut balance);
        assert!(deposit.is_paid());
        assert_eq!(balance.amount(), btc::Sats(21_000));
    }

    #[test]
    #[should_panic]
    fn settle_twice_panics() {
        let user_id = user::Id(Uuid::from_u128(7));
        let mut deposit = deposit(user_id);
        let mut balance = Balance::new(user_id, btc::Sats(0));
        deposit.settle(&mut balance);
        deposit.settle(&mut balance);
    }

    #[test]
    #[should_panic]
    fn settle_against_wrong_user_panics() {
        let mut deposit = deposit(user::Id(Uuid::from_u128(7)));
        let mut balance = Balance::new(user::Id(Uuid::from_u128(8)), btc::Sats(0));
        deposit.settle(&mut balance);
    }
}
