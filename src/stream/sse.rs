//! Server-Sent Events framing for streamed completions.

use serde::Serialize;
use tracing::warn;

use crate::models::openai::ErrorResponse;

/// End-of-stream sentinel frame.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Code attached to errors reported inside a stream.
pub const STREAM_ERROR_CODE: &str = "stream_error";

/// Frame `data` as `data: <json>\n\n`.
///
/// Serialization of the gateway's own wire types cannot fail in practice;
/// if it does, an empty object is framed and a warning logged.
#[must_use]
pub fn format_event<T: Serialize>(data: &T) -> String {
    let json = serde_json::to_string(data).unwrap_or_else(|err| {
        warn!(%err, "failed to serialize sse payload");
        "{}".into()
    });
    format!("data: {json}\n\n")
}

/// The end-of-stream sentinel.
#[must_use]
pub fn format_done() -> &'static str {
    DONE_FRAME
}

/// Frame an error object inside the stream.
#[must_use]
pub fn format_error(message: &str, error_type: &str) -> String {
    format_event(&ErrorResponse::new(
        message,
        error_type,
        Some(STREAM_ERROR_CODE),
    ))
}
