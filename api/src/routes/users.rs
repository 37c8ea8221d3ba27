//! Routes for creating and querying accounts.

use rocket::{get, post, serde::json::Json, State};
use rocket_okapi::openapi;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use app::user;

use crate::error::{self, JsonResult};
use crate::state::RocketState;

#[derive(Debug, Serialize, JsonSchema)]
struct UserModel {
    /// Unique account identifier. Keep it safe, it is the only handle on
    /// the balance until a public key is linked.
    id: Uuid,
    /// Linked Nostr public key, if any.
    public_key: Option<String>,
    /// Current balance in satoshis.
    balance_sats: i64,
}

impl UserModel {
    fn from_entity(user: &user::User) -> Self {
        Self {
            id: user.id.0,
            public_key: user.public_key.as_ref().map(|pk| pk.0.clone()),
            balance_sats: user.balance.0,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub(super) struct UserResponse {
    user: UserModel,
}

/// Create a new account with a zero balance.
#[openapi(tag = "Users")]
#[post("/users")]
pub(super) async fn post(state: &State<RocketState>) -> JsonResult<UserResponse> {
    let user = user::create(&state.db)
        .await
        .map_err(|e| error::service_unavailable(
            "store unavailable".to_owned(),
            error::debug_data(state.show_debug_data, &e),
        ))?;
    Ok(Json(UserResponse {
        user: UserModel::from_entity(&user),
    }))
}

/// Get account details, such as the current balance.
#[openapi(tag = "Users")]
#[get("/users/<user_id>")]
pub(super) async fn get(
    state: &State<RocketState>,
    user_id: String,
) -> JsonResult<UserResponse> {
    let user_id = super::parse_user_id(&user_id)?;
    let user = user::get(&state.db, user_id)
        .await
        .map_err(|e| error::service_unavailable(
            "store unavailable".to_owned(),
            error::debug_data(state.show_debug_data, &e),
        ))?
        .ok_or_else(|| error::not_found("user not found".to_owned()))?;
    Ok(Json(UserResponse {
        user: UserModel::from_entity(&user),
    }))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(super) struct LinkKeyRequest {
    /// Hex-encoded Nostr public key to link to this account.
    public_key: String,
}

/// Link a Nostr public key to the account. The key becomes an alternate
/// lookup handle; it cannot be linked to two accounts.
#[openapi(tag = "Users")]
#[post("/users/<user_id>/public-key", data = "<req>")]
pub(super) async fn post_public_key(
    state: &State<RocketState>,
    user_id: String,
    req: Json<LinkKeyRequest>,
) -> JsonResult<UserResponse> {
    let user_id = super::parse_user_id(&user_id)?;
    match user::link_public_key(&state.db, user_id, &user::PublicKey(req.public_key.clone())).await
    {
        Ok(user) => Ok(Json(UserResponse {
            user: UserModel::from_entity(&user),
        })),
        Err(user::Error::NotFound) => Err(error::not_found("user not found".to_owned())),
        Err(user::Error::PublicKeyTaken) => Err(error::bad_request(
            "public key already linked to another account".to_owned(),
            None,
        )),
        Err(user::Error::Store(e)) => Err(error::service_unavailable(
            "store unavailable".to_owned(),
            error::debug_data(state.show_debug_data, &e),
        )),
    }
}
