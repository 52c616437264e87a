//! OpenAI-compatible request and response shapes.

use serde::{Deserialize, Serialize};

use crate::models::event::MessageContent;
use crate::stream::converter::extract_message_text;

/// `object` value of a non-streamed completion.
pub const CHAT_COMPLETION_OBJECT: &str = "chat.completion";

/// `object` value of a streamed completion chunk.
pub const CHAT_COMPLETION_CHUNK_OBJECT: &str = "chat.completion.chunk";

/// Finish reason reported for every completed response.
pub const FINISH_REASON_STOP: &str = "stop";

/// A message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    /// Message content; string or content parts.
    #[serde(default)]
    pub content: Option<MessageContent>,
    /// Optional participant name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    /// Build a message with plain text content.
    #[must_use]
    pub fn new(role: &str, text: &str) -> Self {
        Self {
            role: role.to_owned(),
            content: Some(MessageContent::from(text)),
            name: None,
        }
    }

    /// Text of the message, joining every text-bearing part with newlines.
    #[must_use]
    pub fn text_content(&self) -> String {
        self.content
            .as_ref()
            .map(extract_message_text)
            .unwrap_or_default()
    }
}

/// Body of `POST /v1/chat/completions`.
///
/// Sampling parameters are accepted for compatibility and ignored; the
/// assistant CLI does not expose them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Requested model; empty selects the configured default.
    #[serde(default)]
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature (ignored).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling (ignored).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Completion length cap (ignored).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Whether to stream the response as SSE.
    #[serde(default)]
    pub stream: bool,
    /// Stop sequences (ignored).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<serde_json::Value>,
    /// Caller identifier (ignored).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Project whose directory the assistant runs in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Accepted for compatibility; sessions are not resumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// System prompt overriding any `system` message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// A single completion choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChoice {
    /// Choice index; always 0.
    pub index: u32,
    /// The assistant message.
    pub message: ChatMessage,
    /// Why generation stopped.
    pub finish_reason: String,
}

/// Token usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionUsage {
    /// Prompt tokens.
    pub prompt_tokens: usize,
    /// Completion tokens.
    pub completion_tokens: usize,
    /// Sum of both.
    pub total_tokens: usize,
}

/// Non-streamed completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    /// Completion identifier.
    pub id: String,
    /// Always [`CHAT_COMPLETION_OBJECT`].
    pub object: String,
    /// Unix timestamp in seconds.
    pub created: i64,
    /// Model name.
    pub model: String,
    /// Completion choices.
    pub choices: Vec<ChatCompletionChoice>,
    /// Usage counters.
    pub usage: ChatCompletionUsage,
    /// Session identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    /// Project identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_id: String,
}

/// Delta of a streamed chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Role marker; only on the first chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Incremental text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Choice of a streamed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Choice index; always 0.
    pub index: u32,
    /// Incremental delta.
    pub delta: ChunkDelta,
    /// Set only on the final chunk; serialized as `null` otherwise.
    pub finish_reason: Option<String>,
}

/// One streamed `chat.completion.chunk` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Completion identifier.
    pub id: String,
    /// Always [`CHAT_COMPLETION_CHUNK_OBJECT`].
    pub object: String,
    /// Unix timestamp in seconds.
    pub created: i64,
    /// Model name.
    pub model: String,
    /// Chunk choices.
    pub choices: Vec<ChunkChoice>,
}

/// Entry of the model list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelObject {
    /// Model identifier.
    pub id: String,
    /// Always `model`.
    pub object: String,
    /// Unix timestamp in seconds.
    pub created: i64,
    /// Owner label.
    pub owned_by: String,
}

/// Response of `GET /v1/models`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelListResponse {
    /// Always `list`.
    pub object: String,
    /// Models.
    pub data: Vec<ModelObject>,
}

/// Structured error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Human-readable message.
    pub message: String,
    /// Error category, e.g. `invalid_request_error`.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Machine-readable code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Wrapper serialized as `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error details.
    pub error: ErrorDetail,
}

impl ErrorResponse {
    /// Build an error response.
    #[must_use]
    pub fn new(message: impl Into<String>, error_type: &str, code: Option<&str>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                error_type: error_type.to_owned(),
                code: code.map(str::to_owned),
            },
        }
    }
}

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// `healthy` or `unhealthy`.
    pub status: String,
    /// Gateway version.
    pub version: String,
    /// Assistant CLI version, when the probe succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_version: Option<String>,
    /// Size of the session registry.
    pub active_sessions: usize,
}
