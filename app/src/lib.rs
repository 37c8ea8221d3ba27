use futures::FutureExt;
use std::{future::Future, panic::AssertUnwindSafe};

pub mod balance;
pub mod brl;
pub mod btc;
mod concurrency;
pub mod convert;
pub mod database;
pub mod deposit;
pub mod ln;
pub mod payout;
pub mod pix;
pub mod rates;
pub mod user;
mod worker;

#[derive(Debug, Clone, Copy)]
pub struct QueryRange {
    pub limit: i64,
    pub offset: i64,
}

async fn swallow_panic(f: impl Future<Output = ()>) {
    let _ = AssertUnwindSafe(f).catch_unwind().await;
}
