//! HTTP error responses
//!
//! Every failure leaves the server as `{"error": ...}`. Validation failures
//! carry a field map, everything else a message. Server faults are logged
//! here and reported without detail.

use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use vault_core::VaultError;

const SERVER_FAULT_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// Errors returned by request handlers
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("{0}")]
    BadRequest(String),

    #[error("the requested resource could not be found")]
    RouteNotFound,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RouteNotFound => StatusCode::NOT_FOUND,
            ApiError::Vault(e) => match e {
                VaultError::Validation(_) | VaultError::DuplicateEmail => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                VaultError::NotFound => StatusCode::NOT_FOUND,
                VaultError::EditConflict => StatusCode::CONFLICT,
                VaultError::Unauthenticated
                | VaultError::Expired
                | VaultError::ScopeMismatch
                | VaultError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                VaultError::Unauthorized => StatusCode::FORBIDDEN,
                VaultError::Integrity(_)
                | VaultError::Unavailable(_)
                | VaultError::Config(_)
                | VaultError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            ApiError::Vault(VaultError::Validation(errors)) => json!({ "error": errors.fields() }),
            ApiError::Vault(VaultError::DuplicateEmail) => json!({
                "error": { "email": "a user with this email address already exists" }
            }),
            ApiError::Vault(e) if e.is_server_fault() => json!({ "error": SERVER_FAULT_MESSAGE }),
            ApiError::Vault(VaultError::NotFound) => {
                json!({ "error": "the requested resource could not be found" })
            }
            ApiError::Vault(VaultError::EditConflict) => json!({
                "error": "unable to update the record due to an edit conflict, please try again"
            }),
            ApiError::Vault(VaultError::Unauthorized) => json!({
                "error": "your user account doesn't have the necessary permissions to access this resource"
            }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let ApiError::Vault(e) = &self {
            if e.is_server_fault() {
                error!("Request failed: {}", e);
            }
        }

        let mut response = (status, Json(self.body())).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Response for a handler that panicked
pub(crate) fn server_fault_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": SERVER_FAULT_MESSAGE })),
    )
        .into_response()
}
