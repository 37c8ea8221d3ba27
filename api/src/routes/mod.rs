//! Add top-level routes as submodules here.

use crate::{
    error::{self, JsonError},
    state::RocketState,
};
use app::QueryRange;
use rocket::{Build, FromForm, Rocket};
use rocket_okapi::{
    openapi_get_routes,
    swagger_ui::{make_swagger_ui, DefaultModelRendering, SwaggerUIConfig},
};
use schemars::JsonSchema;

mod admin;
mod deposits;
mod payouts;
mod prices;
mod users;

const MIN_LIMIT: i64 = 1;
const MAX_LIMIT: i64 = 250;

#[derive(FromForm, JsonSchema)]
struct Range {
    limit: Option<String>,
    offset: Option<String>,
}

impl Range {
    fn query_range(self) -> Result<QueryRange, JsonError<()>> {
        Ok(QueryRange {
            limit: Self::parse_limit(self.limit)?,
            offset: Self::parse_offset(self.offset)?,
        })
    }

    fn parse_limit(s: Option<String>) -> Result<i64, JsonError<()>> {
        let limit: i64 = s
            .unwrap_or_else(|| "100".to_owned())
            .parse()
            .map_err(|_| error::bad_request("limit is not a number".to_owned(), None))?;
        if limit < MIN_LIMIT {
            Err(error::bad_request(
                format!("limit must be at least {}", MIN_LIMIT),
                None,
            ))
        } else if limit > MAX_LIMIT {
            Err(error::bad_request(
                format!("limit can be at most {}", MAX_LIMIT),
                None,
            ))
        } else {
            Ok(limit)
        }
    }

    fn parse_offset(s: Option<String>) -> Result<i64, JsonError<()>> {
        let offset = s
            .unwrap_or_else(|| "0".to_owned())
            .parse()
            .map_err(|_| error::bad_request("offset is not a number".to_owned(), None))?;
        if offset < 0 {
            Err(error::bad_request(
                "offset must be positive".to_owned(),
                None,
            ))
        } else {
            Ok(offset)
        }
    }
}

fn parse_user_id<U: serde::Serialize>(s: &str) -> Result<app::user::Id, JsonError<U>> {
    uuid::Uuid::parse_str(s)
        .map(app::user::Id)
        .map_err(|_| error::bad_request("invalid user id".to_owned(), None))
}

const VERSION: &str = "/v0";

pub fn register(rocket: Rocket<Build>, state: RocketState) -> Rocket<Build> {
    let rocket = rocket.manage(state);
    let rocket = rocket.mount(
        VERSION,
        openapi_get_routes![
            users::post,
            users::get,
            users::post_public_key,
            prices::get_quote,
            prices::get_price,
            deposits::post,
            deposits::list,
            deposits::status,
            payouts::post,
            payouts::list,
            payouts::get,
            admin::get_balance,
            admin::post_deposit_qr,
        ],
    );
    // The SSE stream can't carry an openapi annotation, so it mounts
    // separately from the documented routes.
    let rocket = rocket.mount(VERSION, rocket::routes![prices::ticker]);
    mount_swagger(rocket)
}

pub fn mount_swagger(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount(
        format!("{}/swagger", VERSION),
        make_swagger_ui(&SwaggerUIConfig {
            url: "../openapi.json".to_owned(),
            default_model_rendering: DefaultModelRendering::Model,
            show_extensions: true,
            ..Default::default()
        }),
    )
}
