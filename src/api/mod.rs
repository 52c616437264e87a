//! OpenAI-compatible HTTP surface.
//!
//! Routes:
//!
//! - `POST /v1/chat/completions`
//! - `GET /v1/models`, `GET /v1/models/capabilities`, `GET /v1/models/{model_id}`
//! - `GET /health`, `GET /`

pub mod catalog;
pub mod chat;
pub mod error;
pub mod health;
pub mod middleware;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::middleware::from_fn_with_state;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Span};

use crate::config::GlobalConfig;
use crate::orchestrator::registry::SessionRegistry;
use crate::{AppError, Result};

/// State shared by every handler.
#[derive(Debug)]
pub struct AppState {
    /// Gateway configuration.
    pub config: Arc<GlobalConfig>,
    /// Launch gate and version probe.
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    /// Build state with a registry derived from `config`.
    #[must_use]
    pub fn new(config: GlobalConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(&config.assistant));
        Self {
            config: Arc::new(config),
            registry,
        }
    }
}

/// Build the router with all routes and middleware.
///
/// Tracing wraps CORS, which wraps authentication, so preflight requests are
/// answered before credentials are checked.
pub fn router(state: Arc<AppState>) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request| {
            info_span!(
                "http_request",
                method = %request.method(),
                path = %request.uri().path()
            )
        })
        .on_response(|response: &Response, latency: Duration, _span: &Span| {
            info!(
                status = response.status().as_u16(),
                latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                "request completed"
            );
        });

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/models", get(catalog::list_models))
        .route("/v1/models/capabilities", get(catalog::model_capabilities))
        .route("/v1/models/{model_id}", get(catalog::get_model))
        .layer(from_fn_with_state(
            Arc::clone(&state),
            middleware::require_api_key,
        ))
        .layer(middleware::cors_layer(&state.config.cors))
        .layer(trace_layer)
        .with_state(state)
}

/// Bind `config.bind_address()` and serve until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the server fails to bind or serve.
pub async fn serve(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = state.config.bind_address();
    let listener = TcpListener::bind(&bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {bind}: {err}")))?;

    serve_with_listener(listener, state, ct).await
}

/// Serve on an already bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the server fails.
pub async fn serve_with_listener(
    listener: TcpListener,
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|err| AppError::Io(format!("failed to read local address: {err}")))?;
    info!(%local, "starting HTTP gateway");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Config(format!("HTTP server error: {err}")))?;

    info!("HTTP gateway shut down");
    Ok(())
}
