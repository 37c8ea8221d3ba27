//! The JSON error envelope every route speaks: `{"error": {"message": ...}}`
//! with optional structured `user_data` (safe to show to the caller) and
//! `debug_data` (internal detail, attached only when the deployment opts in).

use rocket::{http::Status, serde::json::Json};
use schemars::JsonSchema;
use serde::Serialize;
use std::fmt::Debug;

#[derive(Debug, Serialize, JsonSchema)]
pub struct Error<U: Serialize> {
    pub error: Inner<U>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct Inner<U: Serialize> {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<U>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_data: Option<String>,
}

impl<U: Serialize> Error<U> {
    fn new(message: String, user_data: Option<U>, debug_data: Option<String>) -> Self {
        Self {
            error: Inner {
                message,
                user_data,
                debug_data,
            },
        }
    }
}

pub type JsonError<U> = (Status, Json<Error<U>>);

pub type JsonResult<T, U = ()> = Result<Json<T>, JsonError<U>>;

pub fn bad_request<U: Serialize>(message: String, user_data: Option<U>) -> JsonError<U> {
    (Status::BadRequest, Json(Error::new(message, user_data, None)))
}

pub fn not_found<U: Serialize>(message: String) -> JsonError<U> {
    (Status::NotFound, Json(Error::new(message, None, None)))
}

pub fn too_many_requests<U: Serialize>() -> JsonError<U> {
    (
        Status::TooManyRequests,
        Json(Error::new("too many requests".to_owned(), None, None)),
    )
}

/// An upstream provider rejected or failed the call.
pub fn bad_gateway<U: Serialize>(message: String, debug_data: Option<String>) -> JsonError<U> {
    (
        Status::BadGateway,
        Json(Error::new(message, None, debug_data)),
    )
}

/// The store or price source is temporarily unavailable.
pub fn service_unavailable<U: Serialize>(
    message: String,
    debug_data: Option<String>,
) -> JsonError<U> {
    (
        Status::ServiceUnavailable,
        Json(Error::new(message, None, debug_data)),
    )
}

pub fn internal<U: Serialize>(debug_data: Option<String>) -> JsonError<U> {
    (
        Status::InternalServerError,
        Json(Error::new(
            "internal error, please contact support".to_owned(),
            None,
            debug_data,
        )),
    )
}

/// Renders internal error detail only when the deployment allows leaking it.
pub fn debug_data(show: bool, e: &impl Debug) -> Option<String> {
    if show {
        Some(format!("{:?}", e))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, JsonSchema)]
    struct Shortfall {
        shortfall_sats: i64,
    }

    #[test]
    fn envelope_omits_empty_fields() {
        let error: Error<Shortfall> = Error::new("insufficient balance".to_owned(), None, None);
        assert_eq!(
            serde_json::to_string(&error).unwrap(),
            r#"{"error":{"message":"insufficient balance"}}"#
        );
    }

    #[test]
    fn envelope_carries_user_data() {
        let error = Error::new(
            "insufficient balance".to_owned(),
            Some(Shortfall {
                shortfall_sats: 500,
            }),
            None,
        );
        assert_eq!(
            serde_json::to_string(&error).unwrap(),
            r#"{"error":{"message":"insufficient balance","user_data":{"shortfall_sats":500}}}"#
        );
    }

    #[test]
    fn debug_data_is_gated() {
        let e = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(debug_data(true, &e).unwrap().contains("boom"));
        assert_eq!(debug_data(false, &e), None);
    }
}
