//! Routes for topping up a balance over Lightning.

use super::Range;
use crate::error::{self, JsonResult};
use crate::state::RocketState;
use app::{btc, deposit};
use chrono::{DateTime, Utc};
use rocket::{get, post, serde::json::Json, State};
use rocket_okapi::openapi;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, JsonSchema)]
pub(super) struct DepositRequest {
    /// The amount to deposit, in satoshis.
    amount_sats: i64,
}

#[derive(Debug, Serialize, JsonSchema)]
struct DepositModel {
    /// Unique deposit identifier.
    id: Uuid,
    /// The amount being deposited, in satoshis.
    amount_sats: i64,
    /// Lightning invoice to pay from any wallet.
    lnurl: String,
    /// Deposit creation time.
    created_at: DateTime<Utc>,
    /// When the invoice payment was credited, if it has been.
    paid_at: Option<DateTime<Utc>>,
    /// True once the balance has been credited.
    is_paid: bool,
}

impl DepositModel {
    fn from_entity(deposit: &deposit::Deposit) -> Self {
        Self {
            id: deposit.id.0,
            amount_sats: deposit.amount.0,
            lnurl: deposit.lnurl.0.clone(),
            created_at: deposit.created,
            paid_at: deposit.paid,
            is_paid: deposit.is_paid(),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct DepositResponse {
    deposit: DepositModel,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct DepositsResponse {
    deposits: Vec<DepositModel>,
}

fn map_error<U: serde::Serialize>(show_debug_data: bool, e: deposit::Error) -> crate::error::JsonError<U> {
    match e {
        deposit::Error::AmountNotPositive => {
            error::bad_request("amount must be positive".to_owned(), None)
        }
        deposit::Error::UserNotFound => error::not_found("user not found".to_owned()),
        deposit::Error::NotFound => error::not_found("deposit not found".to_owned()),
        deposit::Error::Gateway(e) => error::bad_gateway(
            "lightning gateway failed".to_owned(),
            error::debug_data(show_debug_data, &e),
        ),
        deposit::Error::Store(e) => error::service_unavailable(
            "store unavailable".to_owned(),
            error::debug_data(show_debug_data, &e),
        ),
        deposit::Error::Conflict(e) => error::internal(error::debug_data(show_debug_data, &e)),
    }
}

/// Request a Lightning invoice to top up the balance. Pay the returned
/// LNURL from any wallet; the balance is credited once the gateway sees the
/// payment.
#[openapi(tag = "Deposits")]
#[post("/users/<user_id>/deposits", data = "<req>")]
pub(super) async fn post(
    state: &State<RocketState>,
    user_id: String,
    req: Json<DepositRequest>,
) -> JsonResult<DepositResponse> {
    let user_id = super::parse_user_id(&user_id)?;
    if state.rate_limit.limit(user_id) {
        return Err(error::too_many_requests());
    }
    let deposit = deposit::request(&state.db, &state.ln, user_id, btc::Sats(req.amount_sats))
        .await
        .map_err(|e| map_error(state.show_debug_data, e))?;
    Ok(Json(DepositResponse {
        deposit: DepositModel::from_entity(&deposit),
    }))
}

/// List deposits, newest first.
#[openapi(tag = "Deposits")]
#[get("/users/<user_id>/deposits?<range..>")]
pub(super) async fn list(
    state: &State<RocketState>,
    user_id: String,
    range: Range,
) -> JsonResult<DepositsResponse> {
    let user_id = super::parse_user_id(&user_id)?;
    let deposits = deposit::list(&state.db, user_id, range.query_range()?)
        .await
        .map_err(|e| {
            error::service_unavailable(
                "store unavailable".to_owned(),
                error::debug_data(state.show_debug_data, &e),
            )
        })?;
    Ok(Json(DepositsResponse {
        deposits: deposits.iter().map(DepositModel::from_entity).collect(),
    }))
}

/// Check whether an invoice has been paid, refreshing against the gateway.
/// Wallets poll this after displaying the invoice.
#[openapi(tag = "Deposits")]
#[get("/users/<user_id>/deposits/status?<lnurl>")]
pub(super) async fn status(
    state: &State<RocketState>,
    user_id: String,
    lnurl: String,
) -> JsonResult<DepositResponse> {
    let user_id = super::parse_user_id(&user_id)?;
    let deposit = deposit::status(&state.db, &state.ln, user_id, &app::ln::Lnurl(lnurl))
        .await
        .map_err(|e| map_error(state.show_debug_data, e))?;
    Ok(Json(DepositResponse {
        deposit: DepositModel::from_entity(&deposit),
    }))
}
