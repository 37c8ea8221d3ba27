//! Routes for paying BRL to a PIX destination from a sat balance.

use super::Range;
use crate::error::{self, JsonError, JsonResult};
use crate::state::RocketState;
use app::payout;
use chrono::{DateTime, Utc};
use rocket::{get, post, serde::json::Json, State};
use rocket_okapi::openapi;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, JsonSchema)]
pub(super) struct PayoutRequest {
    /// The PIX key to pay. Requires `amount_brl`. Mutually exclusive with
    /// `qr_code`.
    pix_key: Option<String>,
    /// The amount to pay to `pix_key`, in BRL.
    amount_brl: Option<f64>,
    /// A PIX QR code to pay. The amount is whatever the payee encoded.
    qr_code: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
struct PayoutModel {
    /// Unique payout identifier.
    id: Uuid,
    /// The amount the payee received, in BRL.
    amount_brl: f64,
    /// The amount charged to the balance, fees included, in satoshis.
    amount_sats: i64,
    /// The payee's registered name at their bank.
    payee_name: String,
    /// Provider-side settlement identifier, for support inquiries.
    settlement_id: String,
    /// Payout creation time.
    created_at: DateTime<Utc>,
}

impl PayoutModel {
    fn from_entity(payout: &payout::Payout) -> Self {
        Self {
            id: payout.id.0,
            amount_brl: payout.amount.to_decimal().to_f64().unwrap_or(0.0),
            amount_sats: payout.amount_sats.0,
            payee_name: payout.payee_name.clone(),
            settlement_id: payout.settlement_id.clone(),
            created_at: payout.created,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct PayoutResponse {
    payout: PayoutModel,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct PayoutsResponse {
    payouts: Vec<PayoutModel>,
}

/// Safe-to-show detail attached to an insufficient balance rejection.
#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct InsufficientBalanceData {
    /// How many satoshis the balance is short.
    shortfall_sats: i64,
    /// Suggested deposit, padded against price movement, in satoshis.
    recommended_topup_sats: i64,
}

fn map_error(show_debug_data: bool, e: payout::Error) -> JsonError<InsufficientBalanceData> {
    match e {
        payout::Error::InvalidPixKey(_) => error::bad_request("invalid pix key".to_owned(), None),
        payout::Error::Amount(e) => error::bad_request(e.to_string(), None),
        payout::Error::InsufficientBalance(b) => error::bad_request(
            "insufficient balance".to_owned(),
            Some(InsufficientBalanceData {
                shortfall_sats: b.shortfall.0,
                recommended_topup_sats: b.recommended_topup.0,
            }),
        ),
        payout::Error::Price(e) => error::service_unavailable(
            "price unavailable".to_owned(),
            error::debug_data(show_debug_data, &e),
        ),
        payout::Error::Provider(e) => error::bad_gateway(
            "pix provider failed".to_owned(),
            error::debug_data(show_debug_data, &e),
        ),
        payout::Error::Reconcile(e) => error::service_unavailable(
            "could not reconcile pending deposits".to_owned(),
            error::debug_data(show_debug_data, &e),
        ),
        payout::Error::UserNotFound => error::not_found("user not found".to_owned()),
        payout::Error::Store(e) => error::service_unavailable(
            "store unavailable".to_owned(),
            error::debug_data(show_debug_data, &e),
        ),
        payout::Error::Conflict(e) => error::internal(error::debug_data(show_debug_data, &e)),
    }
}

/// Pay a PIX destination from the account balance. Specify either a
/// `pix_key` with an `amount_brl`, or a `qr_code`.
#[openapi(tag = "Payouts")]
#[post("/users/<user_id>/payouts", data = "<req>")]
pub(super) async fn post(
    state: &State<RocketState>,
    user_id: String,
    req: Json<PayoutRequest>,
) -> JsonResult<PayoutResponse, InsufficientBalanceData> {
    let user_id = super::parse_user_id(&user_id)?;
    if state.rate_limit.limit(user_id) {
        return Err(error::too_many_requests());
    }
    let req = req.into_inner();
    let destination = match (req.pix_key, req.amount_brl, req.qr_code) {
        (Some(key), Some(amount), None) => {
            let amount_brl = Decimal::try_from(amount)
                .map_err(|_| error::bad_request("invalid amount".to_owned(), None))?;
            payout::RequestDestination::Key { key, amount_brl }
        }
        (None, None, Some(payload)) => payout::RequestDestination::QrCode { payload },
        _ => {
            return Err(error::bad_request(
                "specify either pix_key with amount_brl, or qr_code".to_owned(),
                None,
            ))
        }
    };
    let payout = payout::send(
        &state.db,
        &state.pix,
        &state.ln,
        &state.prices,
        &state.policy,
        payout::Request {
            user_id,
            destination,
        },
    )
    .await
    .map_err(|e| map_error(state.show_debug_data, e))?;
    Ok(Json(PayoutResponse {
        payout: PayoutModel::from_entity(&payout),
    }))
}

/// List payouts, newest first.
#[openapi(tag = "Payouts")]
#[get("/users/<user_id>/payouts?<range..>")]
pub(super) async fn list(
    state: &State<RocketState>,
    user_id: String,
    range: Range,
) -> JsonResult<PayoutsResponse> {
    let user_id = super::parse_user_id(&user_id)?;
    let payouts = payout::list(&state.db, user_id, range.query_range()?)
        .await
        .map_err(|e| {
            error::service_unavailable(
                "store unavailable".to_owned(),
                error::debug_data(state.show_debug_data, &e),
            )
        })?;
    Ok(Json(PayoutsResponse {
        payouts: payouts.iter().map(PayoutModel::from_entity).collect(),
    }))
}

/// Get payout details.
#[openapi(tag = "Payouts")]
#[get("/users/<user_id>/payouts/<payout_id>")]
pub(super) async fn get(
    state: &State<RocketState>,
    user_id: String,
    payout_id: String,
) -> JsonResult<PayoutResponse> {
    let user_id = super::parse_user_id(&user_id)?;
    let payout_id = Uuid::parse_str(&payout_id)
        .map(payout::Id)
        .map_err(|_| error::bad_request("invalid payout id".to_owned(), None))?;
    let payout = payout::get(&state.db, user_id, payout_id)
        .await
        .map_err(|e| {
            error::service_unavailable(
                "store unavailable".to_owned(),
                error::debug_data(state.show_debug_data, &e),
            )
        })?
        .ok_or_else(|| error::not_found("payout not found".to_owned()))?;
    Ok(Json(PayoutResponse {
        payout: PayoutModel::from_entity(&payout),
    }))
}
