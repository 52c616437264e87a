//! Liveness and service description endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;
use crate::models::openai::HealthCheckResponse;

/// Gateway version reported by `/` and `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Handle `GET /health`.
///
/// Healthy only while the assistant version probe succeeds.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthCheckResponse>) {
    let active_sessions = state.registry.active_session_count();

    match state.registry.version().await {
        Ok(claude_version) => (
            StatusCode::OK,
            Json(HealthCheckResponse {
                status: "healthy".into(),
                version: VERSION.into(),
                claude_version: Some(claude_version),
                active_sessions,
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthCheckResponse {
                status: "unhealthy".into(),
                version: VERSION.into(),
                claude_version: None,
                active_sessions,
            }),
        ),
    }
}

/// Handle `GET /`.
pub async fn root() -> Json<Value> {
    Json(json!({
        "name": "Claude Code Gateway",
        "version": VERSION,
        "description": "OpenAI-compatible API for the Claude CLI",
        "endpoints": {
            "chat": "/v1/chat/completions",
            "models": "/v1/models",
        },
        "health": "/health",
    }))
}
