//! Model catalog endpoints.
//!
//! The catalog is static configuration. Any model id is accepted by
//! `GET /v1/models/{model_id}` since the assistant resolves model names
//! itself.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{TimeZone, Utc};
use serde::Serialize;

use super::AppState;
use crate::models::openai::{ModelListResponse, ModelObject};

/// Provider reported in `owned_by` and the capabilities listing.
pub const PROVIDER: &str = "anthropic";

/// Adapter name reported by the capabilities listing.
pub const ADAPTER: &str = "claude-code-gateway";

/// One entry of `GET /v1/models/capabilities`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelCapability {
    /// Model identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Always `true`.
    pub supports_streaming: bool,
    /// Always `true`.
    pub supports_tools: bool,
}

/// Body of `GET /v1/models/capabilities`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilitiesResponse {
    /// Catalog entries.
    pub models: Vec<ModelCapability>,
    /// Number of entries.
    pub total: usize,
    /// Always [`PROVIDER`].
    pub provider: String,
    /// Always [`ADAPTER`].
    pub adapter: String,
}

/// Creation timestamp reported for catalog entries: 2024-01-01T00:00:00Z.
#[must_use]
pub fn catalog_epoch() -> i64 {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .map_or(1_704_067_200, |t| t.timestamp())
}

/// `owned_by` value for the given probe outcome.
#[must_use]
pub fn owned_by(version: Option<&str>) -> String {
    match version {
        Some(v) if !v.is_empty() => format!("{PROVIDER}-claude-{v}"),
        _ => PROVIDER.to_owned(),
    }
}

async fn current_owner(state: &AppState) -> String {
    let version = state.registry.version().await.ok();
    owned_by(version.as_deref())
}

/// Handle `GET /v1/models`.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelListResponse> {
    let owner = current_owner(&state).await;
    let epoch = catalog_epoch();

    let data = state
        .config
        .models
        .iter()
        .zip(0_i64..)
        .map(|(entry, offset)| ModelObject {
            id: entry.id.clone(),
            object: "model".into(),
            created: epoch + offset,
            owned_by: owner.clone(),
        })
        .collect();

    Json(ModelListResponse {
        object: "list".into(),
        data,
    })
}

/// Handle `GET /v1/models/{model_id}`.
pub async fn get_model(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> Json<ModelObject> {
    Json(ModelObject {
        id: model_id,
        object: "model".into(),
        created: catalog_epoch(),
        owned_by: current_owner(&state).await,
    })
}

/// Handle `GET /v1/models/capabilities`.
pub async fn model_capabilities(State(state): State<Arc<AppState>>) -> Json<CapabilitiesResponse> {
    let models: Vec<ModelCapability> = state
        .config
        .models
        .iter()
        .map(|entry| ModelCapability {
            id: entry.id.clone(),
            name: entry.name.clone(),
            description: entry.description.clone(),
            supports_streaming: true,
            supports_tools: true,
        })
        .collect();

    Json(CapabilitiesResponse {
        total: models.len(),
        models,
        provider: PROVIDER.into(),
        adapter: ADAPTER.into(),
    })
}
