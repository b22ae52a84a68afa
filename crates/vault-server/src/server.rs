//! HTTP server orchestration

use std::any::Any;
use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any as AnyOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use vault_core::Vault;

use crate::error::server_fault_response;
use crate::handlers;

/// Shared state for HTTP handlers
pub struct AppState {
    pub vault: Vault,
}

pub type SharedState = Arc<AppState>;

/// HTTP front end for a [`Vault`]
pub struct VaultServer {
    state: SharedState,
    cors_origins: Vec<String>,
}

impl VaultServer {
    pub fn new(vault: Vault) -> Self {
        Self {
            state: Arc::new(AppState { vault }),
            cors_origins: Vec::new(),
        }
    }

    /// Restrict CORS to the given origins (empty allows any)
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    pub fn vault(&self) -> &Vault {
        &self.state.vault
    }

    /// Build the router with all routes and middleware
    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/healthcheck", get(handlers::healthcheck))
            .route("/v1/users", post(handlers::register_user))
            .route(
                "/v1/tokens/authentication",
                post(handlers::create_authentication_token)
                    .delete(handlers::delete_authentication_tokens),
            )
            .route(
                "/v1/logins",
                get(handlers::list_logins).post(handlers::create_login),
            )
            .route(
                "/v1/logins/:id",
                get(handlers::show_login)
                    .patch(handlers::update_login)
                    .delete(handlers::delete_login),
            )
            .fallback(handlers::not_found)
            .layer(self.cors_layer())
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::custom(handle_panic))
            .with_state(self.state.clone())
    }

    fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin {:?}", origin);
                    None
                }
            })
            .collect();

        let allow_origin = if origins.is_empty() {
            AllowOrigin::from(AnyOrigin)
        } else {
            AllowOrigin::list(origins)
        };

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::IF_MATCH])
            .expose_headers([header::LOCATION, header::ETAG])
    }

    /// Bind and serve until the process is stopped
    pub async fn run(&self, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.router();

        let addr = format!("0.0.0.0:{}", port);
        info!("Starting passvault HTTP server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Handler panicked: {}", detail);
    server_fault_response()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
