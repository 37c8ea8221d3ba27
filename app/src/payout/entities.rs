use crate::brl;
use crate::btc;
use crate::user;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Id(pub Uuid);

/// Where the BRL leg of a payout went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A PIX key in normalized form.
    Key(String),
    /// A payee-generated QR code, kept verbatim for audit.
    QrCode(String),
}

/// A settled PIX payment funded from a user's sat balance. Rows are only
/// written after the PIX provider accepted the withdrawal, so `amount` is
/// what the payee received and `amount_sats` is what the payer was charged,
/// fees included. `uncollected_sats` is the part of the charge the balance
/// could not cover at settlement time; it is zero in normal operation.
#[derive(Debug, Clone)]
pub struct Payout {
    pub id: Id,
    pub user_id: user::Id,
    pub amount: brl::Cents,
    pub amount_sats: btc::Sats,
    pub payee_name: String,
    pub destination: Destination,
    pub settlement_id: String,
    pub uncollected_sats: btc::Sats,
    pub paid: bool,
    pub created: DateTime<Utc>,
}

impl Payout {
    pub(crate) fn create(
        user_id: user::Id,
        amount: brl::Cents,
        amount_sats: btc::Sats,
        payee_name: String,
        destination: Destination,
        settlement_id: String,
        uncollected_sats: btc::Sats,
    ) -> Self {
        Self {
            id: Id(Uuid::new_v4()),
            user_id,
            amount,
            amount_sats,
            payee_name,
            destination,
            settlement_id,
            uncollected_sats,
            paid: true,
            created: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_the_uncollected_shortfall() {
        let payout = Payout::create(
            user::Id::default(),
            brl::Cents(1000),
            btc::Sats(2126),
            "Payee".to_owned(),
            Destination::Key("52998224725".to_owned()),
            "settlement-1".to_owned(),
            btc::Sats(400),
        );
        assert!(payout.paid);
        assert_eq!(payout.uncollected_sats, btc::Sats(400));
    }
}
