//! CORS policy and API-key authentication.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use super::error::ApiError;
use super::AppState;
use crate::config::CorsConfig;

const ALLOW_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];
const X_REQUESTED_WITH: HeaderName = HeaderName::from_static("x-requested-with");
const X_SESSION_ID: HeaderName = HeaderName::from_static("x-session-id");
const X_PROJECT_ID: HeaderName = HeaderName::from_static("x-project-id");

/// Build the CORS layer for `config.allowed_origins`.
///
/// A `*` entry allows any origin without credentials. Otherwise only the
/// listed origins are echoed back, with credentials allowed.
#[must_use]
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(ALLOW_METHODS)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, X_REQUESTED_WITH])
        .expose_headers([X_SESSION_ID, X_PROJECT_ID]);

    if config.allows_any_origin() {
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = origin.as_str(), "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

/// Extract the token from an `Authorization` value; a missing `Bearer `
/// prefix means the whole value is the token.
#[must_use]
pub fn bearer_token(value: &str) -> &str {
    value.strip_prefix("Bearer ").unwrap_or(value)
}

/// Reject requests without a configured API key when auth is required.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.auth.require_auth {
        return next.run(request).await;
    }

    let Some(value) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    else {
        return ApiError::unauthorized("Missing Authorization header").into_response();
    };

    if !state.config.is_valid_api_key(bearer_token(value)) {
        warn!(path = request.uri().path(), "rejected request with invalid API key");
        return ApiError::unauthorized("Invalid API key").into_response();
    }

    next.run(request).await
}
