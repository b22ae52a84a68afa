//! End-to-end tests against the router, without binding a socket

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use vault_core::{MasterKey, PasswordHashParams, PermissionCode, Vault};
use vault_server::VaultServer;

async fn test_server() -> VaultServer {
    let vault = Vault::open_in_memory(MasterKey::generate())
        .await
        .unwrap()
        .with_password_params(PasswordHashParams::insecure_fast());
    VaultServer::new(vault)
}

struct TestResponse {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Value,
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> TestResponse {
    send_with(app, method, uri, token, body, &[]).await
}

async fn send_with(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
    extra_headers: &[(header::HeaderName, &str)],
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    for (name, value) in extra_headers {
        builder = builder.header(name.clone(), *value);
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

/// Register a user and return a fresh authentication token
async fn sign_up(app: &Router, email: &str) -> String {
    let response = send(
        app,
        Method::POST,
        "/v1/users",
        None,
        Some(json!({ "name": "Test User", "email": email, "password": "pa55word" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let response = send(
        app,
        Method::POST,
        "/v1/tokens/authentication",
        None,
        Some(json!({ "email": email, "password": "pa55word" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    response.body["authentication_token"]["token"]
        .as_str()
        .unwrap()
        .to_string()
}

fn reddit() -> Value {
    json!({
        "name": "Reddit",
        "username": "rabbithole",
        "password": "asiap1234",
        "website": "https://reddit.com"
    })
}

#[tokio::test]
async fn test_healthcheck() {
    let app = test_server().await.router();

    let response = send(&app, Method::GET, "/v1/healthcheck", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "available");
}

#[tokio::test]
async fn test_login_lifecycle() {
    let app = test_server().await.router();
    let token = sign_up(&app, "alice@example.com").await;

    let created = send(&app, Method::POST, "/v1/logins", Some(&token), Some(reddit())).await;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.body["login"]["id"].as_i64().unwrap();
    assert_eq!(
        created.headers[header::LOCATION],
        format!("/v1/logins/{}", id).as_str()
    );
    assert_eq!(created.body["login"]["version"], 1);
    assert_eq!(created.body["login"]["password"], "asiap1234");

    let shown = send(&app, Method::GET, &format!("/v1/logins/{}", id), Some(&token), None).await;
    assert_eq!(shown.status, StatusCode::OK);
    assert_eq!(shown.body["login"]["name"], "Reddit");
    assert_eq!(shown.body["login"]["website"], "https://reddit.com");

    let updated = send(
        &app,
        Method::PATCH,
        &format!("/v1/logins/{}", id),
        Some(&token),
        Some(json!({ "password": "n3w-secret", "website": null })),
    )
    .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["login"]["version"], 2);
    assert_eq!(updated.body["login"]["password"], "n3w-secret");
    assert_eq!(updated.body["login"]["username"], "rabbithole");
    assert!(updated.body["login"]["website"].is_null());

    let listed = send(&app, Method::GET, "/v1/logins", Some(&token), None).await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body["logins"].as_array().unwrap().len(), 1);

    let deleted = send(&app, Method::DELETE, &format!("/v1/logins/{}", id), Some(&token), None).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["message"], "login successfully deleted");

    let gone = send(&app, Method::GET, &format!("/v1/logins/{}", id), Some(&token), None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_requests_without_valid_token_are_rejected() {
    let app = test_server().await.router();

    let missing = send(&app, Method::GET, "/v1/logins", None, None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.headers[header::WWW_AUTHENTICATE], "Bearer");

    let garbage = send(&app, Method::POST, "/v1/logins", Some("not-a-token"), Some(reddit())).await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);

    let well_formed_unknown = "A".repeat(43);
    let unknown = send(&app, Method::GET, "/v1/logins", Some(&well_formed_unknown), None).await;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_other_owners_records_are_invisible() {
    let app = test_server().await.router();
    let alice = sign_up(&app, "alice@example.com").await;
    let bob = sign_up(&app, "bob@example.com").await;

    let created = send(&app, Method::POST, "/v1/logins", Some(&alice), Some(reddit())).await;
    let uri = format!("/v1/logins/{}", created.body["login"]["id"].as_i64().unwrap());

    assert_eq!(send(&app, Method::GET, &uri, Some(&bob), None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(
        send(&app, Method::PATCH, &uri, Some(&bob), Some(json!({ "name": "Mine" })))
            .await
            .status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(send(&app, Method::DELETE, &uri, Some(&bob), None).await.status, StatusCode::NOT_FOUND);

    let listed = send(&app, Method::GET, "/v1/logins", Some(&bob), None).await;
    assert!(listed.body["logins"].as_array().unwrap().is_empty());

    // Still intact for the owner
    let shown = send(&app, Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(shown.body["login"]["name"], "Reddit");
}

#[tokio::test]
async fn test_missing_permission_is_forbidden() {
    let server = test_server().await;
    let app = server.router();
    let token = sign_up(&app, "alice@example.com").await;

    let user = server
        .vault()
        .users
        .authenticate("alice@example.com", "pa55word")
        .await
        .unwrap();
    server
        .vault()
        .permissions
        .revoke(user.id, PermissionCode::LoginsWrite)
        .await
        .unwrap();

    let created = send(&app, Method::POST, "/v1/logins", Some(&token), Some(reddit())).await;
    assert_eq!(created.status, StatusCode::FORBIDDEN);

    // Read access is untouched
    let listed = send(&app, Method::GET, "/v1/logins", Some(&token), None).await;
    assert_eq!(listed.status, StatusCode::OK);
}

#[tokio::test]
async fn test_validation_errors() {
    let app = test_server().await.router();
    let token = sign_up(&app, "alice@example.com").await;

    let response = send(
        &app,
        Method::POST,
        "/v1/logins",
        Some(&token),
        Some(json!({ "name": "", "username": "rabbithole", "password": "short", "website": "ftp://x" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["error"]["name"], "must be provided");
    assert!(response.body["error"]["password"].is_string());
    assert!(response.body["error"]["website"].is_string());
    assert!(response.body["error"]["username"].is_null());

    let duplicate = send(
        &app,
        Method::POST,
        "/v1/users",
        None,
        Some(json!({ "name": "Alice", "email": "alice@example.com", "password": "pa55word" })),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(duplicate.body["error"]["email"].is_string());
}

#[tokio::test]
async fn test_if_match_detects_conflicts() {
    let app = test_server().await.router();
    let token = sign_up(&app, "alice@example.com").await;

    let created = send(&app, Method::POST, "/v1/logins", Some(&token), Some(reddit())).await;
    let uri = format!("/v1/logins/{}", created.body["login"]["id"].as_i64().unwrap());
    assert_eq!(created.headers[header::ETAG], "\"1\"");

    let first = send_with(
        &app,
        Method::PATCH,
        &uri,
        Some(&token),
        Some(json!({ "name": "Reddit (main)" })),
        &[(header::IF_MATCH, "\"1\"")],
    )
    .await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.headers[header::ETAG], "\"2\"");

    let stale = send_with(
        &app,
        Method::PATCH,
        &uri,
        Some(&token),
        Some(json!({ "name": "Reddit (alt)" })),
        &[(header::IF_MATCH, "\"1\"")],
    )
    .await;
    assert_eq!(stale.status, StatusCode::CONFLICT);

    let shown = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(shown.body["login"]["name"], "Reddit (main)");
    assert_eq!(shown.body["login"]["version"], 2);
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let app = test_server().await.router();
    let token = sign_up(&app, "alice@example.com").await;

    let response = send(&app, Method::DELETE, "/v1/tokens/authentication", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::OK);

    let after = send(&app, Method::GET, "/v1/logins", Some(&token), None).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bad_login_credentials() {
    let app = test_server().await.router();
    sign_up(&app, "alice@example.com").await;

    let response = send(
        &app,
        Method::POST,
        "/v1/tokens/authentication",
        None,
        Some(json!({ "email": "alice@example.com", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_requests() {
    let app = test_server().await.router();
    let token = sign_up(&app, "alice@example.com").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/logins")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let unknown_field = send(
        &app,
        Method::POST,
        "/v1/logins",
        Some(&token),
        Some(json!({ "name": "Reddit", "username": "u", "password": "asiap1234", "owner_id": 9 })),
    )
    .await;
    assert_eq!(unknown_field.status, StatusCode::BAD_REQUEST);

    let bad_id = send(&app, Method::GET, "/v1/logins/abc", Some(&token), None).await;
    assert_eq!(bad_id.status, StatusCode::NOT_FOUND);

    let no_route = send(&app, Method::GET, "/v1/nothing-here", None, None).await;
    assert_eq!(no_route.status, StatusCode::NOT_FOUND);
    assert!(no_route.body["error"].is_string());
}
