//! Operator routes: the provider-side BRL float and the top-up path that
//! refills it.

use crate::error::{self, JsonResult};
use crate::state::RocketState;
use app::brl;
use rocket::{get, post, serde::json::Json, State};
use rocket_okapi::openapi;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct AdminBalanceResponse {
    /// BRL float held at the PIX provider, available for payouts.
    available_brl: f64,
}

/// Get the BRL float available at the PIX provider.
#[openapi(tag = "Admin")]
#[get("/admin/balance")]
pub(super) async fn get_balance(state: &State<RocketState>) -> JsonResult<AdminBalanceResponse> {
    let available = state.pix.admin_balance().await.map_err(|e| {
        error::bad_gateway(
            "pix provider failed".to_owned(),
            error::debug_data(state.show_debug_data, &e),
        )
    })?;
    Ok(Json(AdminBalanceResponse {
        available_brl: available.to_decimal().to_f64().unwrap_or(0.0),
    }))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(super) struct DepositQrRequest {
    /// The amount to load onto the provider float, in BRL.
    amount_brl: f64,
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct DepositQrResponse {
    /// Provider-side identifier of the QR charge.
    id: String,
    /// Copy-paste PIX QR payload to pay from any Brazilian bank app.
    qr_code: String,
}

/// Create a PIX QR code that loads BRL onto the provider float. Operator
/// top-ups bypass the per-payment amount bounds.
#[openapi(tag = "Admin")]
#[post("/admin/deposit-qr", data = "<req>")]
pub(super) async fn post_deposit_qr(
    state: &State<RocketState>,
    req: Json<DepositQrRequest>,
) -> JsonResult<DepositQrResponse> {
    let amount = Decimal::try_from(req.amount_brl)
        .ok()
        .and_then(brl::Cents::from_decimal)
        .filter(|cents| cents.0 > 0)
        .ok_or_else(|| error::bad_request("invalid amount".to_owned(), None))?;
    let qr = state.pix.create_deposit_qr(amount).await.map_err(|e| {
        error::bad_gateway(
            "pix provider failed".to_owned(),
            error::debug_data(state.show_debug_data, &e),
        )
    })?;
    Ok(Json(DepositQrResponse {
        id: qr.id,
        qr_code: qr.payload,
    }))
}
