//! Price and quote routes, including the SSE price ticker.

use chrono::{DateTime, Utc};
use rocket::response::stream::{Event, EventStream};
use rocket::{get, serde::json::Json, State};
use rocket_okapi::openapi;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::Serialize;

use app::{convert, rates};

use crate::error::{self, JsonResult};
use crate::state::RocketState;

#[derive(Debug, Serialize, JsonSchema)]
struct PriceModel {
    /// BRL price of one bitcoin at the oracle.
    price_brl_per_btc: f64,
    /// When the price was fetched from the oracle.
    fetched_at: DateTime<Utc>,
}

impl PriceModel {
    fn from_snapshot(snapshot: &rates::PriceSnapshot) -> Self {
        Self {
            price_brl_per_btc: snapshot.price_brl_per_btc.to_f64().unwrap_or(0.0),
            fetched_at: snapshot.fetched_at,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct PriceResponse {
    price: PriceModel,
}

/// Get the current BRL/BTC price.
#[openapi(tag = "Prices")]
#[get("/price")]
pub(super) async fn get_price(state: &State<RocketState>) -> JsonResult<PriceResponse> {
    let snapshot = state.prices.get().await.map_err(|e| {
        error::service_unavailable(
            "price unavailable".to_owned(),
            error::debug_data(state.show_debug_data, &e),
        )
    })?;
    Ok(Json(PriceResponse {
        price: PriceModel::from_snapshot(&snapshot),
    }))
}

#[derive(Debug, Serialize, JsonSchema)]
struct QuoteModel {
    /// The amount the payee would receive, in BRL.
    amount_brl: f64,
    /// The amount the payer would be charged, fees included, in BRL.
    adjusted_amount_brl: f64,
    /// The amount the payer would be charged, in satoshis.
    amount_sats: i64,
    price: PriceModel,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct QuoteResponse {
    quote: QuoteModel,
}

/// Quote a BRL payout amount in satoshis at the current price, fees and
/// spread included.
#[openapi(tag = "Prices")]
#[get("/quote?<amount>")]
pub(super) async fn get_quote(
    state: &State<RocketState>,
    amount: f64,
) -> JsonResult<QuoteResponse> {
    let amount_brl = Decimal::try_from(amount)
        .map_err(|_| error::bad_request("invalid amount".to_owned(), None))?;
    let snapshot = state.prices.get().await.map_err(|e| {
        error::service_unavailable(
            "price unavailable".to_owned(),
            error::debug_data(state.show_debug_data, &e),
        )
    })?;
    let quote = convert::quote(
        amount_brl,
        snapshot.price_brl_per_btc,
        convert::Direction::Payout,
        &state.policy,
        false,
    )
    .map_err(|e| error::bad_request(e.to_string(), None))?;
    Ok(Json(QuoteResponse {
        quote: QuoteModel {
            amount_brl: quote.amount_cents.to_decimal().to_f64().unwrap_or(0.0),
            adjusted_amount_brl: quote.adjusted_amount.to_f64().unwrap_or(0.0),
            amount_sats: quote.adjusted_amount_sats.0,
            price: PriceModel::from_snapshot(&snapshot),
        },
    }))
}

/// Streams price updates as server-sent events. An event is emitted whenever
/// the background ticker observes a changed price.
#[get("/price/ticker")]
pub(super) async fn ticker(state: &State<RocketState>) -> EventStream![] {
    let mut receiver = state.ticker.clone();
    EventStream! {
        loop {
            let current = *receiver.borrow();
            if let Some(snapshot) = current {
                yield Event::json(&PriceModel::from_snapshot(&snapshot));
            }
            if receiver.changed().await.is_err() {
                break;
            }
        }
    }
}
