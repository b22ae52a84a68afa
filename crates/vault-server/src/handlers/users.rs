//! `/v1/users` handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use vault_core::{NewUser, SecretString, User};

use crate::error::ApiError;
use crate::server::SharedState;

#[derive(Debug, Serialize)]
struct UserView {
    id: i64,
    created_at: String,
    name: String,
    email: String,
    activated: bool,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            created_at: u.created_at.to_rfc3339(),
            name: u.name.clone(),
            email: u.email.clone(),
            activated: u.activated,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RegisterUserInput {
    name: String,
    email: String,
    password: SecretString,
}

pub(crate) async fn register_user(
    State(state): State<SharedState>,
    payload: Result<Json<RegisterUserInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(input) = payload?;

    let user = state
        .vault
        .register_user(NewUser::new(input.name, input.email, input.password.expose()))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "user": UserView::from(&user) })),
    )
        .into_response())
}
