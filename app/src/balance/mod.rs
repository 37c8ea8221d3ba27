use crate::btc;
use crate::concurrency;
use crate::database::{self, StoreError};
use crate::user;
use thiserror::Error;
use uuid::Uuid;

mod entities;

pub use entities::{Balance, InsufficientBalance};

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Conflict(#[from] concurrency::ConflictError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub async fn get(
    data_tx: &mut database::Transaction,
    user_id: user::Id,
) -> Result<Balance, StoreError> {
    let row = sqlx::query_as::<_, BalanceRow>(
        "SELECT id AS user_id, balance_sats FROM users WHERE id = $1",
    )
    .bind(user_id.0)
    .fetch_one(data_tx)
    .await?;
    Ok(row.into_entity())
}

/// Persists a balance change. The update only matches if the stored amount
/// still equals the amount the entity was loaded with, so a concurrent
/// writer surfaces as [`concurrency::ConflictError`] and the caller retries
/// with a fresh read.
pub async fn update(
    data_tx: &mut database::Transaction,
    balance: &Balance,
) -> Result<(), UpdateError> {
    if balance.changed() {
        sqlx::query(
            "UPDATE users SET balance_sats = $1 WHERE id = $2 AND balance_sats = $3 RETURNING id",
        )
        .bind(balance.amount().0)
        .bind(balance.user_id().0)
        .bind(balance.original_amount().0)
        .fetch_optional(data_tx)
        .await
        .map_err(StoreError::from)?
        .ok_or(concurrency::ConflictError)?;
    }
    Ok(())
}

#[derive(sqlx::FromRow, Debug)]
struct BalanceRow {
    user_id: Uuid,
    balance_sats: i64,
}

impl BalanceRow {
    fn into_entity(self) -> Balance {
        Balance::new(user::Id(self.user_id), btc::Sats(self.balance_sats))
    }
}
