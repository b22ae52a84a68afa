//! `/v1/tokens/authentication` handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use vault_core::{SecretString, ValidationErrors};

use super::bearer;
use crate::error::ApiError;
use crate::server::SharedState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CredentialsInput {
    email: String,
    password: SecretString,
}

/// Exchange email and password for an authentication token
pub(crate) async fn create_authentication_token(
    State(state): State<SharedState>,
    payload: Result<Json<CredentialsInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(input) = payload?;

    let mut v = ValidationErrors::new();
    v.check(!input.email.is_empty(), "email", "must be provided");
    v.check(!input.password.expose().is_empty(), "password", "must be provided");
    v.into_result()?;

    let issued = state
        .vault
        .login(&input.email, input.password.expose())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "authentication_token": {
                "token": issued.plaintext.expose(),
                "expiry": issued.expiry.to_rfc3339(),
            }
        })),
    )
        .into_response())
}

/// Revoke every authentication token of the caller
pub(crate) async fn delete_authentication_tokens(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let caller = state.vault.gate().authenticate(bearer(&headers)).await?;
    let revoked = state.vault.logout(caller.user_id()).await?;

    info!("User {} logged out, {} token(s) revoked", caller.user_id(), revoked);

    Ok(Json(json!({ "message": "authentication tokens successfully revoked" })).into_response())
}
