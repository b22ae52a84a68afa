//! Request handlers

mod logins;
mod tokens;
mod users;

pub(crate) use logins::{create_login, delete_login, list_logins, show_login, update_login};
pub(crate) use tokens::{create_authentication_token, delete_authentication_tokens};
pub(crate) use users::register_user;

use axum::{
    http::{header, HeaderMap},
    Json,
};
use serde_json::{json, Value};

use crate::error::ApiError;

/// Bearer token from the `Authorization` header, if one is present and well formed
pub(crate) fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(vault_core::parse_bearer)
}

pub(crate) async fn healthcheck() -> Json<Value> {
    Json(json!({
        "status": "available",
        "system_info": {
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

pub(crate) async fn not_found() -> ApiError {
    ApiError::RouteNotFound
}
