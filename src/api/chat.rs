//! `POST /v1/chat/completions`.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use tokio::time::Instant;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use super::error::ApiError;
use super::AppState;
use crate::config::GlobalConfig;
use crate::models::openai::ChatCompletionRequest;
use crate::process::handle::ProcessHandle;
use crate::stream::assembler::{
    build_completion_response, collect_buffered, stream_incremental, TIMEOUT_MESSAGE,
};
use crate::stream::converter::StreamConverter;
use crate::AppError;

/// Project used when the request names none.
pub const DEFAULT_PROJECT_ID: &str = "default";

/// A validated chat request, ready to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedChat {
    /// Model passed to the assistant.
    pub model: String,
    /// Text of the last `user` message.
    pub prompt: String,
    /// System prompt, if any.
    pub system_prompt: Option<String>,
    /// Project identifier.
    pub project_id: String,
    /// Working directory for the assistant.
    pub project_path: PathBuf,
    /// Whether to stream the response.
    pub stream: bool,
}

/// Validate `request` and resolve model, prompts, and project directory.
///
/// The last `user` message is the prompt and the last `system` message the
/// system prompt; an explicit `system_prompt` field overrides it.
///
/// # Errors
///
/// Returns `400` when there is no user message or the project id would
/// escape the project root.
pub fn prepare_chat(
    config: &GlobalConfig,
    request: &ChatCompletionRequest,
) -> Result<PreparedChat, ApiError> {
    let model = if request.model.is_empty() {
        config.default_model.clone()
    } else {
        request.model.clone()
    };

    let mut prompt = String::new();
    let mut system_prompt = String::new();
    for message in &request.messages {
        match message.role.as_str() {
            "user" => prompt = message.text_content(),
            "system" => system_prompt = message.text_content(),
            _ => {}
        }
    }

    if prompt.is_empty() {
        return Err(ApiError::invalid_request(
            "At least one user message is required",
            Some("missing_user_message"),
        ));
    }

    if let Some(explicit) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        explicit.clone_into(&mut system_prompt);
    }

    let project_id = request
        .project_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_PROJECT_ID)
        .to_owned();
    if !is_safe_project_id(&project_id) {
        return Err(ApiError::invalid_request(
            format!("Invalid project_id: {project_id}"),
            Some("invalid_project_id"),
        ));
    }

    Ok(PreparedChat {
        model,
        prompt,
        system_prompt: (!system_prompt.is_empty()).then_some(system_prompt),
        project_path: config.project_path(&project_id),
        project_id,
        stream: request.stream,
    })
}

/// A project id must be a single normal path component.
fn is_safe_project_id(id: &str) -> bool {
    !id.contains(['/', '\\', '\0']) && !id.contains("..") && id != "."
}

/// Handle `POST /v1/chat/completions`.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return ApiError::invalid_request(format!("Invalid request: {rejection}"), None)
                .into_response();
        }
    };

    let prepared = match prepare_chat(&state.config, &request) {
        Ok(prepared) => prepared,
        Err(err) => return err.into_response(),
    };

    let span = info_span!(
        "chat_completion",
        model = %prepared.model,
        project_id = %prepared.project_id,
        stream = prepared.stream
    );

    async move {
        match run_chat(&state, prepared).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn run_chat(state: &AppState, prepared: PreparedChat) -> Result<Response, ApiError> {
    if let Err(err) = tokio::fs::create_dir_all(&prepared.project_path).await {
        error!(%err, path = %prepared.project_path.display(), "failed to create project directory");
    }

    let deadline = Instant::now() + state.config.assistant.streaming_timeout();
    let handle = state
        .registry
        .create_session(
            deadline,
            prepared.project_path.clone(),
            &prepared.prompt,
            &prepared.model,
            prepared.system_prompt.as_deref(),
        )
        .map_err(|err| {
            error!(%err, "failed to create assistant session");
            ApiError::from(err)
        })?;

    let session_id = handle
        .session_id()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if prepared.stream {
        streaming_response(state, handle, &prepared, &session_id)
    } else {
        buffered_response(state, handle, &prepared, &session_id).await
    }
}

fn streaming_response(
    state: &AppState,
    handle: ProcessHandle,
    prepared: &PreparedChat,
    session_id: &str,
) -> Result<Response, ApiError> {
    let converter = StreamConverter::new(prepared.model.clone(), session_id);
    let frames = stream_incremental(handle, converter, state.config.assistant.report_timeouts)
        .map(Ok::<_, Infallible>);

    info!(session_id, "streaming assistant reply");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Session-ID", session_id)
        .header("X-Project-ID", prepared.project_id.as_str())
        .body(Body::from_stream(frames))
        .map_err(|err| ApiError::from(AppError::Io(format!("failed to build response: {err}"))))
}

async fn buffered_response(
    state: &AppState,
    mut handle: ProcessHandle,
    prepared: &PreparedChat,
    session_id: &str,
) -> Result<Response, ApiError> {
    let reply = collect_buffered(&mut handle).await;

    if reply.timed_out && state.config.assistant.report_timeouts {
        return Err(ApiError::from(AppError::Timeout(TIMEOUT_MESSAGE.into())));
    }

    info!(
        session_id,
        completion_tokens = reply.usage.completion_tokens,
        completed = reply.completed,
        "buffered assistant reply"
    );

    let response =
        build_completion_response(&reply, &prepared.model, session_id, &prepared.project_id);
    Ok(Json(response).into_response())
}
