use crate::balance;
use crate::btc;
use crate::concurrency;
use crate::database::{self, Database, StoreError};
use crate::ln;
use crate::user;
use crate::QueryRange;
use thiserror::Error;

mod entities;

pub use entities::{Deposit, Id};

const INVOICE_MEMO: &str = "NostrPIX balance top-up";

#[derive(Debug, Error)]
pub enum Error {
    #[error("deposit amount must be positive")]
    AmountNotPositive,
    #[error("user not found")]
    UserNotFound,
    #[error("deposit not found")]
    NotFound,
    #[error("lightning gateway failed")]
    Gateway(#[from] ln::Error),
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

/// Creates an invoice at the Lightning gateway and records the pending
/// deposit. The returned deposit carries the payable LNURL for the caller's
/// wallet.
pub async fn request(
    db: &Database,
    gateway: &ln::Gateway,
    user_id: user::Id,
    amount: btc::Sats,
) -> Result<Deposit, Error> {
    if amount.0 <= 0 {
        return Err(Error::AmountNotPositive);
    }
    user::get(db, user_id).await?.ok_or(Error::UserNotFound)?;

    let invoice_id = gateway.create_invoice(amount, INVOICE_MEMO).await?;
    let lnurl = gateway.quote(&invoice_id).await?;
    let deposit = Deposit::create(user_id, amount, invoice_id, lnurl);

    let mut data_tx = db.begin().await.map_err(StoreError::from)?;
    queries::insert(&mut data_tx, &deposit).await?;
    data_tx.commit().await.map_err(StoreError::from)?;
    Ok(deposit)
}

/// Brings the user's pending deposits up to date with the gateway: each
/// unpaid deposit whose invoice the gateway reports as paid gets settled and
/// credited. Runs before every payout and balance read so credits are never
/// missed just because no webhook arrived.
pub async fn reconcile(
    db: &Database,
    gateway: &impl ln::InvoiceApi,
    user_id: user::Id,
) -> Result<(), Error> {
    let pending = queries::list_unpaid_for_user(db, user_id).await?;
    for deposit in pending {
        let state = gateway.invoice_state(&deposit.invoice_id).await?;
        if state == ln::InvoiceState::Paid {
            credit(db, deposit.id).await?;
        }
    }
    Ok(())
}

/// Looks up a deposit by its LNURL and refreshes it against the gateway, so
/// a wallet polling for payment sees the credit as soon as the gateway does.
pub async fn status(
    db: &Database,
    gateway: &impl ln::InvoiceApi,
    user_id: user::Id,
    lnurl: &ln::Lnurl,
) -> Result<Deposit, Error> {
    let deposit = queries::get_by_lnurl(db, user_id, lnurl)
        .await?
        .ok_or(Error::NotFound)?;
    if deposit.is_paid() {
        return Ok(deposit);
    }
    if gateway.invoice_state(&deposit.invoice_id).await? == ln::InvoiceState::Paid {
        credit(db, deposit.id).await?;
    }
    queries::get_by_lnurl(db, user_id, lnurl)
        .await?
        .ok_or(Error::NotFound)
}

pub async fn list(
    db: &Database,
    user_id: user::Id,
    range: QueryRange,
) -> Result<Vec<Deposit>, StoreError> {
    queries::list_for_user(db, user_id, range).await
}

/// Settles one deposit and credits the balance in a single transaction. The
/// paid flip and the balance write are both guarded, so two racing
/// reconcilers can only produce one credit.
async fn credit(db: &Database, id: Id) -> Result<(), Error> {
    concurrency::retry_loop(|| async {
        let mut data_tx = db.begin().await.map_err(StoreError::from)?;
        // Re-read inside the attempt: a conflicting writer may have settled
        // this deposit since the last read.
        let mut deposit = queries::get(&mut data_tx, id).await?.ok_or(Error::NotFound)?;
        if deposit.is_paid() {
            return Ok(());
        }
        let mut balance = balance::get(&mut data_tx, deposit.user_id).await?;
        deposit.settle(&mut balance);
        queries::mark_paid(&mut data_tx, &deposit).await?;
        balance::update(&mut data_tx, &balance).await?;
        data_tx.commit().await.map_err(StoreError::from)?;
        log::info!("credited deposit {:?} to user {:?}", id, balance.user_id());
        Ok::<_, Error>(())
    })
    .await
}

mod queries {
    use super::{Deposit, Id};
    use crate::btc;
    use crate::concurrency;
    use crate::database::{self, Database, StoreError};
    use crate::ln;
    use crate::user;
    use crate::QueryRange;
    use chrono::{DateTime, Utc};
    use const_format::formatcp;
    use uuid::Uuid;

    const COLUMNS: &str = "id, user_id, amount_sats, invoice_id, lnurl, created, paid";

    pub(super) async fn insert(
        data_tx: &mut database::Transaction,
        deposit: &Deposit,
    ) -> Result<(), StoreError> {
        sqlx::query(formatcp!(
            "INSERT INTO lightning_deposits ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            COLUMNS
        ))
        .bind(deposit.id.0)
        .bind(deposit.user_id.0)
        .bind(deposit.amount.0)
        .bind(&deposit.invoice_id.0)
        .bind(&deposit.lnurl.0)
        .bind(deposit.created)
        .bind(deposit.paid)
        .execute(data_tx)
        .await?;
        Ok(())
    }

    pub(super) async fn get(
        data_tx: &mut database::Transaction,
        id: Id,
    ) -> Result<Option<Deposit>, StoreError> {
        let row = sqlx::query_as::<_, DepositRow>(formatcp!(
            "SELECT {} FROM lightning_deposits WHERE id = $1",
            COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(data_tx)
        .await?;
        Ok(row.map(|row| row.into_entity()))
    }

    pub(super) async fn get_by_lnurl(
        db: &Database,
        user_id: user::Id,
        lnurl: &ln::Lnurl,
    ) -> Result<Option<Deposit>, StoreError> {
        let row = sqlx::query_as::<_, DepositRow>(formatcp!(
            "SELECT {} FROM lightning_deposits WHERE lnurl = $1 AND user_id = $2",
            COLUMNS
        ))
        .bind(&lnurl.0)
        .bind(user_id.0)
        .fetch_optional(db)
        .await?;
        Ok(row.map(|row| row.into_entity()))
    }

    pub(super) async fn list_unpaid_for_user(
        db: &Database,
        user_id: user::Id,
    ) -> Result<Vec<Deposit>, StoreError> {
        let rows = sqlx::query_as::<_, DepositRow>(formatcp!(
            "SELECT {} FROM lightning_deposits WHERE user_id = $1 AND paid IS NULL ORDER BY created",
            COLUMNS
        ))
        .bind(user_id.0)
        .fetch_all(db)
        .await?;
        Ok(rows.into_iter().map(|row| row.into_entity()).collect())
    }

    pub(super) async fn list_for_user(
        db: &Database,
        user_id: user::Id,
        range: QueryRange,
    ) -> Result<Vec<Deposit>, StoreError> {
        let rows = sqlx::query_as::<_, DepositRow>(formatcp!(
            "SELECT {} FROM lightning_deposits WHERE user_id = $1
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

    /// Flips the paid timestamp, but only if no other writer got there
    /// first.
    pub(super) async fn mark_paid(
        data_tx: &mut database::Transaction,
        deposit: &Deposit,
    ) -> Result<(), super::Error> {
        sqlx::query(
            "UPDATE lightning_deposits SET paid = $1 WHERE id = $2 AND paid IS NULL RETURNING id",
        )
        .bind(deposit.paid)
        .bind(deposit.id.0)
        .fetch_optional(data_tx)
        .await
        .map_err(StoreError::from)?
        .ok_or(concurrency::ConflictError)?;
        Ok(())
    }

    #[derive(sqlx::FromRow, Debug)]
    struct DepositRow {
        id: Uuid,
        user_id: Uuid,
        amount_sats: i64,
        invoice_id: String,
        lnurl: String,
        created: DateTime<Utc>,
        paid: Option<DateTime<Utc>>,
    }

    impl DepositRow {
        fn into_entity(self) -> Deposit {
            Deposit {
                id: Id(self.id),
                user_id: user::Id(self.user_id),
                amount: btc::Sats(self.amount_sats),
                invoice_id: ln::InvoiceId(self.invoice_id),
                lnurl: ln::Lnurl(self.lnurl),
                created: self.created,
                paid: self.paid,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Reports every invoice as paid and counts how often it is asked.
    struct AllPaidGateway {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl ln::InvoiceApi for AllPaidGateway {
        async fn invoice_state(
            &self,
            _invoice_id: &ln::InvoiceId,
        ) -> Result<ln::InvoiceState, ln::Error> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(ln::InvoiceState::Paid)
        }
    }

    // Store-backed flow; runs when TEST_DATABASE_URL points at a database.
    #[tokio::test]
    async fn repeated_reconcile_credits_a_deposit_once() {
        let db = match test_db().await {
            Some(db) => db,
            None => return,
        };
        let user = user::create(&db).await.unwrap();
        let deposit = Deposit::create(
            user.id,
            btc::Sats(5_000),
            ln::InvoiceId(format!("invoice-{}", Uuid::new_v4())),
            ln::Lnurl(format!("lnurl-{}", Uuid::new_v4())),
        );
        let mut data_tx = db.begin().await.unwrap();
        queries::insert(&mut data_tx, &deposit).await.unwrap();
        data_tx.commit().await.unwrap();

        let gateway = AllPaidGateway {
            polls: AtomicUsize::new(0),
        };
        reconcile(&db, &gateway, user.id).await.unwrap();
        reconcile(&db, &gateway, user.id).await.unwrap();

        let user = user::get(&db, user.id).await.unwrap().unwrap();
        assert_eq!(user.balance, btc::Sats(5_000));
        // The second pass finds nothing unpaid and never asks the gateway.
        assert_eq!(gateway.polls.load(Ordering::SeqCst), 1);
    }

    async fn test_db() -> Option<Database> {
        let url: url::Url = std::env::var("TEST_DATABASE_URL").ok()?.parse().ok()?;
        let db = database::connect(&url).await.ok()?;
        database::run_migrations(&db).await;
        Some(db)
    }
}
