//! `/v1/logins` handlers

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::json;
use tracing::info;

use vault_core::{
    Credential, CredentialPatch, CredentialRepository, NewCredential, PermissionCode,
    SecretString,
};

use super::bearer;
use crate::error::ApiError;
use crate::server::SharedState;

/// Wire form of a credential. The password is only revealed when serialized.
#[derive(Debug, Serialize)]
pub(crate) struct LoginView {
    id: i64,
    created_at: String,
    name: String,
    username: String,
    #[serde(serialize_with = "reveal")]
    password: SecretString,
    website: Option<String>,
    version: i32,
}

impl From<&Credential> for LoginView {
    fn from(c: &Credential) -> Self {
        Self {
            id: c.id,
            created_at: c.created_at.to_rfc3339(),
            name: c.name.clone(),
            username: c.username.clone(),
            password: c.password.clone(),
            website: c.website.clone(),
            version: c.version,
        }
    }
}

fn reveal<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(secret.expose())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreateLoginInput {
    name: String,
    username: String,
    password: SecretString,
    #[serde(default)]
    website: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct UpdateLoginInput {
    name: Option<String>,
    username: Option<String>,
    password: Option<SecretString>,
    // Absent leaves the website alone, null clears it
    #[serde(default, deserialize_with = "present")]
    website: Option<Option<String>>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl From<UpdateLoginInput> for CredentialPatch {
    fn from(input: UpdateLoginInput) -> Self {
        CredentialPatch {
            name: input.name,
            username: input.username,
            password: input.password,
            website: input.website,
        }
    }
}

/// Record ids are positive integers; anything else cannot name a record
fn parse_id(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::RouteNotFound),
    }
}

/// Version expected by the client, from `If-Match: "<version>"`
fn expected_version(headers: &HeaderMap) -> Result<Option<i32>, ApiError> {
    let Some(value) = headers.get(header::IF_MATCH) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .map(|v| v.trim().trim_start_matches("W/").trim_matches('"'))
        .and_then(|v| v.parse::<i32>().ok())
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest("If-Match must carry a record version".to_string()))
}

fn login_response(status: StatusCode, credential: &Credential) -> Response {
    let mut response = (status, Json(json!({ "login": LoginView::from(credential) }))).into_response();
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", credential.version)) {
        response.headers_mut().insert(header::ETAG, etag);
    }
    response
}

pub(crate) async fn list_logins(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let caller = state
        .vault
        .gate()
        .authorize(bearer(&headers), PermissionCode::LoginsRead)
        .await?;

    let credentials = state.vault.credentials.list_by_owner(caller.user_id()).await?;
    let logins: Vec<LoginView> = credentials.iter().map(LoginView::from).collect();

    Ok(Json(json!({ "logins": logins })).into_response())
}

pub(crate) async fn create_login(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<CreateLoginInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let caller = state
        .vault
        .gate()
        .authorize(bearer(&headers), PermissionCode::LoginsWrite)
        .await?;
    let Json(input) = payload?;

    let credential = state
        .vault
        .credentials
        .insert(
            caller.user_id(),
            NewCredential::new(
                input.name,
                input.username,
                input.password.expose(),
                input.website,
            ),
        )
        .await?;

    info!("User {} created login {}", caller.user_id(), credential.id);

    let mut response = login_response(StatusCode::CREATED, &credential);
    if let Ok(location) = HeaderValue::from_str(&format!("/v1/logins/{}", credential.id)) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

pub(crate) async fn show_login(
    State(state): State<SharedState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let caller = state
        .vault
        .gate()
        .authorize(bearer(&headers), PermissionCode::LoginsRead)
        .await?;
    let id = parse_id(&raw_id)?;

    let credential = state.vault.credentials.get(id, caller.user_id()).await?;
    Ok(login_response(StatusCode::OK, &credential))
}

pub(crate) async fn update_login(
    State(state): State<SharedState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<UpdateLoginInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let caller = state
        .vault
        .gate()
        .authorize(bearer(&headers), PermissionCode::LoginsWrite)
        .await?;
    let id = parse_id(&raw_id)?;
    let expected = expected_version(&headers)?;
    let Json(input) = payload?;

    let store = &state.vault.credentials;
    let mut credential = store.get(id, caller.user_id()).await?;
    credential.apply(input.into());

    match expected {
        Some(version) => {
            store
                .update_checked(&mut credential, caller.user_id(), version)
                .await?
        }
        None => store.update(&mut credential, caller.user_id()).await?,
    }

    Ok(login_response(StatusCode::OK, &credential))
}

pub(crate) async fn delete_login(
    State(state): State<SharedState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let caller = state
        .vault
        .gate()
        .authorize(bearer(&headers), PermissionCode::LoginsWrite)
        .await?;
    let id = parse_id(&raw_id)?;

    state.vault.credentials.delete(id, caller.user_id()).await?;
    info!("User {} deleted login {}", caller.user_id(), id);

    Ok(Json(json!({ "message": "login successfully deleted" })).into_response())
}
