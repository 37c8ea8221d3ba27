//! The payout pipeline: a user spends sats, a payee receives BRL over PIX.
//! A payout runs through fixed stages in order: reconcile pending deposits,
//! resolve and validate the destination, price and quote the amount, check
//! the balance covers the quote, call the PIX provider, and only then debit
//! and record. The provider call sits before the debit so a rejected
//! withdrawal never touches the balance.

use crate::balance;
use crate::concurrency;
use crate::convert;
use crate::database::{Database, StoreError};
use crate::deposit;
use crate::ln;
use crate::pix;
use crate::rates;
use crate::user;
use crate::QueryRange;
use rust_decimal::Decimal;
use thiserror::Error;

mod entities;

pub use entities::{Destination, Id, Payout};

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid pix key")]
    InvalidPixKey(#[from] pix::InvalidKey),
    #[error(transparent)]
    Amount(#[from] convert::Error),
    #[error(transparent)]
    InsufficientBalance(#[from] balance::InsufficientBalance),
    #[error("price unavailable")]
    Price(#[from] rates::Error),
    #[error("pix provider failed")]
    Provider(#[from] pix::gateway::Error),
    #[error("deposit reconciliation failed")]
    Reconcile(#[source] deposit::Error),
    #[error("user not found")]
    UserNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("concurrent update")]
    Conflict(#[from] concurrency::ConflictError),
}

impl From<balance::UpdateError> for Error {
    fn from(e: balance::UpdateError) -> Self {
        match e {
            balance::UpdateError::Conflict(e) => Self::Conflict(e),
            balance::UpdateError::Store(e) => Self::Store(e),
        }
    }
}

#[derive(Debug)]
pub struct Request {
    pub user_id: user::Id,
    pub destination: RequestDestination,
}

#[derive(Debug)]
pub enum RequestDestination {
    /// Pay an arbitrary amount to a raw PIX key.
    Key { key: String, amount_brl: Decimal },
    /// Pay a QR code; the amount is whatever the payee encoded.
    QrCode { payload: String },
}

pub async fn send(
    db: &Database,
    pix_gateway: &impl pix::WithdrawApi,
    ln_gateway: &impl ln::InvoiceApi,
    prices: &rates::PriceCache,
    policy: &convert::Policy,
    request: Request,
) -> Result<Payout, Error> {
    deposit::reconcile(db, ln_gateway, request.user_id)
        .await
        .map_err(Error::Reconcile)?;

    let price = prices.get().await?;
    let (target, quote, destination) = resolve(
        pix_gateway,
        request.destination,
        price.price_brl_per_btc,
        policy,
    )
    .await?;

    let user = user::get(db, request.user_id)
        .await?
        .ok_or(Error::UserNotFound)?;
    let mut preview = balance::Balance::new(user.id, user.balance);
    preview.debit(quote.adjusted_amount_sats, policy.topup_margin)?;

    let settlement = pix_gateway.withdraw(quote.amount_cents, &target).await?;
    log::info!(
        "pix provider accepted withdrawal {} for user {:?}",
        settlement.id,
        request.user_id
    );

    let payout = concurrency::retry_loop(|| async {
        let mut data_tx = db.begin().await.map_err(StoreError::from)?;
        let mut balance = balance::get(&mut data_tx, request.user_id).await?;
        let uncollected = balance.debit_settled(quote.adjusted_amount_sats);
        let payout = Payout::create(
            request.user_id,
            quote.amount_cents,
            quote.adjusted_amount_sats,
            settlement.payee_name.clone(),
            destination.clone(),
            settlement.id.clone(),
            uncollected,
        );
        if uncollected.0 > 0 {
            log::error!(
                "payout {:?} settled with {:?} uncollected from user {:?}",
                payout.id,
                uncollected,
                request.user_id
            );
        }
        queries::insert(&mut data_tx, &payout).await?;
        balance::update(&mut data_tx, &balance).await?;
        data_tx.commit().await.map_err(StoreError::from)?;
        Ok::<_, Error>(payout)
    })
    .await?;

    Ok(payout)
}

/// Resolves the request destination into a provider target and a priced
/// quote. Key payouts take the request amount; QR payouts take the amount
/// the payee encoded. Both go through the configured bounds.
async fn resolve(
    pix_gateway: &impl pix::WithdrawApi,
    destination: RequestDestination,
    price_brl_per_btc: Decimal,
    policy: &convert::Policy,
) -> Result<(pix::Target, convert::Quote, Destination), Error> {
    let (target, amount_brl, destination) = match destination {
        RequestDestination::Key { key, amount_brl } => {
            let key = pix::PixKey::validate(&key)?;
            (
                pix::Target::Key(key.as_str().to_owned()),
                amount_brl,
                Destination::Key(key.into_string()),
            )
        }
        RequestDestination::QrCode { payload } => {
            let lookup = pix_gateway.lookup_qr(&payload).await?;
            (
                pix::Target::QrHash(lookup.hash),
                lookup.amount.to_decimal(),
                Destination::QrCode(payload),
            )
        }
    };
    let quote = convert::quote(
        amount_brl,
        price_brl_per_btc,
        convert::Direction::Payout,
        policy,
        false,
    )?;
    Ok((target, quote, destination))
}

pub async fn get(db: &Database, user_id: user::Id, id: Id) -> Result<Option<Payout>, StoreError> {
    queries::get_for_user(db, user_id, id).await
}

pub async fn list(
    db: &Database,
    user_id: user::Id,
    range: QueryRange,
) -> Result<Vec<Payout>, StoreError> {
    queries::list_for_user(db, user_id, range).await
}

mod queries {
    use super::{Destination, Id, Payout};
    use crate::brl;
    use crate::btc;
    use crate::database::{self, Database, StoreError};
    use crate::user;
    use crate::QueryRange;
    use chrono::{DateTime, Utc};
    use const_format::formatcp;
    use uuid::Uuid;

    const COLUMNS: &str = "id, user_id, amount_brl_cents, amount_sats, payee_name, \
        pix_key, pix_qr_code, settlement_id, uncollected_sats, paid, created";

    pub(super) async fn insert(
        data_tx: &mut database::Transaction,
        payout: &Payout,
    ) -> Result<(), StoreError> {
        let (pix_key, pix_qr_code) = match &payout.destination {
            Destination::Key(key) => (Some(key), None),
            Destination::QrCode(payload) => (None, Some(payload)),
        };
        sqlx::query(formatcp!(
            "INSERT INTO pix_payments ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            COLUMNS
        ))
        .bind(payout.id.0)
        .bind(payout.user_id.0)
        .bind(payout.amount.0)
        .bind(payout.amount_sats.0)
        .bind(&payout.payee_name)
        .bind(pix_key)
        .bind(pix_qr_code)
        .bind(&payout.settlement_id)
        .bind(payout.uncollected_sats.0)
        .bind(payout.paid)
        .bind(payout.created)
        .execute(data_tx)
        .await?;
        Ok(())
    }

    pub(super) async fn get_for_user(
        db: &Database,
        user_id: user::Id,
        id: Id,
    ) -> Result<Option<Payout>, StoreError> {
        let row = sqlx::query_as::<_, PayoutRow>(formatcp!(
            "SELECT {} FROM pix_payments WHERE id = $1 AND user_id = $2",
            COLUMNS
        ))
        .bind(id.0)
        .bind(user_id.0)
        .fetch_optional(db)
        .await?;
        Ok(row.map(|row| row.into_entity()))
    }

    pub(super) async fn list_for_user(
        db: &Database,
        user_id: user::Id,
        range: QueryRange,
    ) -> Result<Vec<Payout>, StoreError> {
        let rows = sqlx::query_as::<_, PayoutRow>(formatcp!(
            "SELECT {} FROM pix_payments WHERE user_id = $1
                ORDER BY created DESC LIMIT $2 OFFSET $3",
            COLUMNS
        ))
        .bind(user_id.0)
        .bind(range.limit)
        .bind(range.offset)
        .fetch_all(db)
        .await?;
        Ok(rows.into_iter().map(|row| row.into_entity()).collect())
    }

    #[derive(sqlx::FromRow, Debug)]
    struct PayoutRow {
        id: Uuid,
        user_id: Uuid,
        amount_brl_cents: i64,
        amount_sats: i64,
        payee_name: String,
        pix_key: Option<String>,
        pix_qr_code: Option<String>,
        settlement_id: String,
        uncollected_sats: i64,
        paid: bool,
        created: DateTime<Utc>,
    }

    impl PayoutRow {
        fn into_entity(self) -> Payout {
            let destination = match (self.pix_key, self.pix_qr_code) {
                (Some(key), _) => Destination::Key(key),
                (None, Some(payload)) => Destination::QrCode(payload),
                (None, None) => unreachable!("payout row without a destination"),
            };
            Payout {
                id: Id(self.id),
                user_id: user::Id(self.user_id),
                amount: brl::Cents(self.amount_brl_cents),
                amount_sats: btc::Sats(self.amount_sats),
                payee_name: self.payee_name,
                destination,
                settlement_id: self.settlement_id,
                uncollected_sats: btc::Sats(self.uncollected_sats),
                paid: self.paid,
                created: self.created,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brl::Cents;
    use crate::btc;
    use crate::pix::{QrLookup, Settlement, Target};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy() -> convert::Policy {
        convert::Policy {
            fee_rate: dec!(0.01),
            spread_rate: dec!(0.05),
            topup_margin: dec!(1.05),
            limits: convert::Limits {
                min: dec!(0.01),
                max: dec!(50),
            },
        }
    }

    /// Resolves every QR to a fixed amount and rejects every withdrawal.
    struct FixedQrGateway {
        amount: Cents,
        withdrawals: AtomicUsize,
    }

    impl FixedQrGateway {
        fn new(amount: Cents) -> Self {
            Self {
                amount,
                withdrawals: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl pix::WithdrawApi for FixedQrGateway {
        async fn lookup_qr(&self, qrcode: &str) -> Result<QrLookup, pix::gateway::Error> {
            Ok(QrLookup {
                hash: format!("hash-{}", qrcode),
                amount: self.amount,
                key: "52998224725".to_owned(),
                payee_name: "Payee".to_owned(),
            })
        }

        async fn withdraw(
            &self,
            _amount: Cents,
            _target: &Target,
        ) -> Result<Settlement, pix::gateway::Error> {
            self.withdrawals.fetch_add(1, Ordering::SeqCst);
            Err(pix::gateway::Error::Rejected {
                status: 500,
                body: "rejected".to_owned(),
            })
        }
    }

    struct NoPendingInvoices;

    #[async_trait]
    impl ln::InvoiceApi for NoPendingInvoices {
        async fn invoice_state(
            &self,
            _invoice_id: &ln::InvoiceId,
        ) -> Result<ln::InvoiceState, ln::Error> {
            unreachable!("no deposits are pending in this scenario")
        }
    }

    #[tokio::test]
    async fn qr_amounts_go_through_the_configured_bounds() {
        let gateway = FixedQrGateway::new(Cents(1_000_000));
        let result = resolve(
            &gateway,
            RequestDestination::QrCode {
                payload: "qr".to_owned(),
            },
            dec!(500000),
            &policy(),
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::Amount(convert::Error::AmountTooHigh { .. }))
        ));
        assert_eq!(gateway.withdrawals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn in_bounds_qr_amounts_resolve_to_the_provider_hash() {
        let gateway = FixedQrGateway::new(Cents(1000));
        let (target, quote, destination) = resolve(
            &gateway,
            RequestDestination::QrCode {
                payload: "qr".to_owned(),
            },
            dec!(500000),
            &policy(),
        )
        .await
        .unwrap();
        assert_eq!(target, Target::QrHash("hash-qr".to_owned()));
        assert_eq!(quote.amount_cents, Cents(1000));
        assert_eq!(destination, Destination::QrCode("qr".to_owned()));
    }

    #[tokio::test]
    async fn key_payouts_canonicalize_the_key() {
        let gateway = FixedQrGateway::new(Cents(1000));
        let (target, _, destination) = resolve(
            &gateway,
            RequestDestination::Key {
                key: "529.982.247-25".to_owned(),
                amount_brl: dec!(10),
            },
            dec!(500000),
            &policy(),
        )
        .await
        .unwrap();
        assert_eq!(target, Target::Key("52998224725".to_owned()));
        assert_eq!(destination, Destination::Key("52998224725".to_owned()));

        let result = resolve(
            &gateway,
            RequestDestination::Key {
                key: "not-a-key".to_owned(),
                amount_brl: dec!(10),
            },
            dec!(500000),
            &policy(),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidPixKey(_))));
    }

    // Store-backed flow; runs when TEST_DATABASE_URL points at a database.
    #[tokio::test]
    async fn provider_failure_leaves_the_balance_unchanged() {
        let db = match test_db().await {
            Some(db) => db,
            None => return,
        };
        let user = user::create(&db).await.unwrap();
        sqlx::query("UPDATE users SET balance_sats = $1 WHERE id = $2")
            .bind(100_000i64)
            .bind(user.id.0)
            .execute(&db)
            .await
            .unwrap();

        let gateway = FixedQrGateway::new(Cents(1000));
        let result = send(
            &db,
            &gateway,
            &NoPendingInvoices,
            &rates::PriceCache::seeded(dec!(500000)),
            &policy(),
            Request {
                user_id: user.id,
                destination: RequestDestination::QrCode {
                    payload: "qr".to_owned(),
                },
            },
        )
        .await;

        assert!(matches!(result, Err(Error::Provider(_))));
        assert_eq!(gateway.withdrawals.load(Ordering::SeqCst), 1);
        let user = user::get(&db, user.id).await.unwrap().unwrap();
        assert_eq!(user.balance, btc::Sats(100_000));
    }

    async fn test_db() -> Option<Database> {
        let url: url::Url = std::env::var("TEST_DATABASE_URL").ok()?.parse().ok()?;
        let db = crate::database::connect(&url).await.ok()?;
        crate::database::run_migrations(&db).await;
        Some(db)
    }
}
