//! Account management. Accounts are created anonymously and can later be
//! linked to a Nostr public key, which then becomes an alternate lookup
//! handle.

use crate::database::{Database, StoreError};
use thiserror::Error;

mod entities;

pub use entities::{Id, PublicKey, User};

#[derive(Debug, Error)]
pub enum Error {
    #[error("user not found")]
    NotFound,
    #[error("public key already linked to another user")]
    PublicKeyTaken,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub async fn create(db: &Database) -> Result<User, StoreError> {
    queries::insert(db).await
}

pub async fn get(db: &Database, id: Id) -> Result<Option<User>, StoreError> {
    queries::get(db, id).await
}

pub async fn get_by_public_key(
    db: &Database,
    public_key: &PublicKey,
) -> Result<Option<User>, StoreError> {
    queries::get_by_public_key(db, public_key).await
}

/// Links a public key to an existing account. Fails if another account
/// already holds the key (unique index on the column).
pub async fn link_public_key(
    db: &Database,
    id: Id,
    public_key: &PublicKey,
) -> Result<User, Error> {
    if let Some(existing) = queries::get_by_public_key(db, public_key).await? {
        if existing.id != id {
            return Err(Error::PublicKeyTaken);
        }
        return Ok(existing);
    }
    queries::set_public_key(db, id, public_key)
        .await?
        .ok_or(Error::NotFound)
}

mod queries {
    use super::{Id, PublicKey, User};
    use crate::btc;
    use crate::database::{Database, StoreError};
    use chrono::{DateTime, Utc};
    use const_format::formatcp;
    use uuid::Uuid;

    const COLUMNS: &str = "id, public_key, balance_sats, created";

    pub(super) async fn insert(db: &Database) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(formatcp!(
            "INSERT INTO users (id, public_key, balance_sats, created)
                VALUES ($1, NULL, 0, $2) RETURNING {}",
            COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(Utc::now())
        .fetch_one(db)
        .await?;
        Ok(row.into_entity())
    }

    pub(super) async fn get(db: &Database, id: Id) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(formatcp!(
            "SELECT {} FROM users WHERE id = $1",
            COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(db)
        .await?;
        Ok(row.map(|row| row.into_entity()))
    }

    pub(super) async fn get_by_public_key(
        db: &Database,
        public_key: &PublicKey,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(formatcp!(
            "SELECT {} FROM users WHERE public_key = $1",
            COLUMNS
        ))
        .bind(&public_key.0)
        .fetch_optional(db)
        .await?;
        Ok(row.map(|row| row.into_entity()))
    }

    pub(super) async fn set_public_key(
        db: &Database,
        id: Id,
        public_key: &PublicKey,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(formatcp!(
            "UPDATE users SET public_key = $1 WHERE id = $2 RETURNING {}",
            COLUMNS
        ))
        .bind(&public_key.0)
        .bind(id.0)
        .fetch_optional(db)
        .await?;
        Ok(row.map(|row| row.into_entity()))
    }

    #[derive(sqlx::FromRow, Debug)]
    struct UserRow {
        id: Uuid,
        public_key: Option<String>,
        balance_sats: i64,
        created: DateTime<Utc>,
    }

    impl UserRow {
        fn into_entity(self) -> User {
            User {
                id: Id(self.id),
                public_key: self.public_key.map(PublicKey),
                balance: btc::Sats(self.balance_sats),
                created: self.created,
            }
        }
    }
}
