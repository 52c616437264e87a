//! Assistant output parser task.
//!
//! Reads newline-delimited JSON from the assistant's stdout, decodes each
//! line into an [`Event`], and forwards the events in arrival order through
//! a bounded tokio [`mpsc`] channel.
//!
//! # Recognised line types
//!
//! | `type`      | Maps to                                   |
//! |-------------|-------------------------------------------|
//! | `assistant` | [`EventKind::Assistant`]                  |
//! | `result`    | [`EventKind::Result`]                     |
//! | `system`    | [`EventKind::SystemInit`] when `init`     |
//! | `error`     | [`EventKind::Error`]                      |
//! | *(other)*   | [`EventKind::Other`], forwarded untouched |

use std::sync::Arc;

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::models::event::{AssistantMessage, Event, EventKind, ResultSummary, SystemInit};
use crate::process::codec::EventLineCodec;
use crate::process::handle::ProcessState;
use crate::{AppError, Result};

/// Raw shape shared by every `stream-json` line.
#[derive(Debug, Deserialize)]
struct RawLine {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    total_cost_usd: Option<f64>,
    #[serde(default)]
    cost_usd: Option<f64>,
    #[serde(default)]
    num_turns: Option<u32>,
}

/// Decode a single line of assistant output.
///
/// # Return value
///
/// - `Ok(Some(event))`: a well-formed line.
/// - `Ok(None)`: blank line.
/// - `Err(AppError::Decode(...))`: not JSON, no `type`, or an `assistant`
///   line whose `message` is not an object or whose `content` is neither a
///   string nor an array.
///
/// An `assistant` line with a missing or `null` message decodes to empty
/// content so its session id still reaches the parser.
///
/// # Errors
///
/// See above.
pub fn parse_event_line(line: &str) -> Result<Option<Event>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let raw: RawLine =
        serde_json::from_str(line).map_err(|e| AppError::Decode(format!("malformed json: {e}")))?;

    let session_id = raw.session_id.clone().filter(|id| !id.is_empty());
    let kind = match raw.kind.as_str() {
        "assistant" => {
            let message = match raw.message {
                None | Some(Value::Null) => AssistantMessage::default(),
                Some(message) => serde_json::from_value(message)
                    .map_err(|e| AppError::Decode(format!("invalid assistant message: {e}")))?,
            };
            EventKind::Assistant(message)
        }
        "result" => EventKind::Result(ResultSummary {
            subtype: raw.subtype,
            is_error: raw.is_error,
            result: raw.result,
            duration_ms: raw.duration_ms,
            cost_usd: raw.total_cost_usd.or(raw.cost_usd),
            num_turns: raw.num_turns,
        }),
        "system" if raw.subtype.as_deref() == Some("init") => EventKind::SystemInit(SystemInit {
            model: raw.model,
            tools: raw.tools,
            cwd: raw.cwd,
        }),
        "error" => EventKind::Error {
            message: error_message(raw.error.as_ref().or(raw.message.as_ref())),
        },
        other => EventKind::Other {
            kind: other.to_owned(),
        },
    };

    Ok(Some(Event { session_id, kind }))
}

/// Parser task: reads `stdout` until EOF and forwards decoded events.
///
/// Malformed lines are logged and skipped; they never end the stream. The
/// first event with a non-empty session id sets the handle's id if it is
/// still unset. The running flag is cleared when the task returns, and the
/// queue closes when `event_tx` drops with it.
pub async fn run_parser<R>(stdout: R, state: Arc<ProcessState>, event_tx: mpsc::Sender<Event>)
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, EventLineCodec::new());
    let mut forwarded = 0usize;

    while let Some(item) = framed.next().await {
        let line = match item {
            Ok(line) => line,
            Err(AppError::Decode(ref msg)) => {
                warn!(error = msg.as_str(), "event parser: framing error, skipping");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "event parser: io error, stopping");
                break;
            }
        };

        match parse_event_line(&line) {
            Ok(Some(event)) => {
                if let Some(id) = event.session_id() {
                    if state.adopt_session_id(id) {
                        debug!(session_id = id, "event parser: adopted session id");
                    }
                }
                if event_tx.send(event).await.is_err() {
                    debug!("event parser: consumer dropped, stopping");
                    break;
                }
                forwarded += 1;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, raw_line = %line, "event parser: failed to parse line");
            }
        }
    }

    debug!(forwarded, "event parser: stream finished");
    state.mark_finished();
}

fn error_message(error: Option<&Value>) -> String {
    match error {
        Some(Value::String(msg)) => msg.clone(),
        Some(Value::Object(map)) => map
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| Value::Object(map.clone()).to_string(), str::to_owned),
        Some(other) => other.to_string(),
        None => "unknown error".into(),
    }
}
