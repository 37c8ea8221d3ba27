use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use url::Url;

pub use migrations::run_migrations;
pub use seeder::seed_development_data;

mod migrations;
mod seeder;

pub type Database = sqlx::Pool<sqlx::Postgres>;
pub(crate) type Transaction = sqlx::Transaction<'static, sqlx::Postgres>;

/// The store went away mid-operation. Callers surface this as a retryable
/// service failure rather than crashing the request path.
#[derive(Debug, Error)]
#[error("store unavailable: {0}")]
pub struct StoreError(#[from] sqlx::Error);

pub async fn connect(url: &Url) -> Result<Database, StoreError> {
    Ok(PgPoolOptions::new().connect(url.as_str()).await?)
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CountRow {
    pub count: i64,
}
