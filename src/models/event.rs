//! Decoded events from the assistant's `stream-json` output.
//!
//! Every non-blank stdout line of the assistant process decodes into one
//! [`Event`]. Decoding lives in [`crate::process::reader`]; this module only
//! holds the typed shapes.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Message content as emitted by the assistant or sent by an API client.
///
/// Either a plain string or an ordered sequence of typed blocks. `null`
/// decodes to empty text, and array items that are not block objects are
/// skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content.
    Text(String),
    /// Ordered content blocks (`text`, `tool_use`, `tool_result`, ...).
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl<'de> Deserialize<'de> for MessageContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(Self::default()),
            Value::String(text) => Ok(Self::Text(text)),
            Value::Array(items) => Ok(Self::Blocks(
                items
                    .into_iter()
                    .filter(Value::is_object)
                    .filter_map(|item| serde_json::from_value(item).ok())
                    .collect(),
            )),
            other => Err(D::Error::custom(format!(
                "content must be a string or an array of blocks, got {other}"
            ))),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

/// One typed block inside [`MessageContent::Blocks`].
///
/// Only the fields the gateway reads are modelled; everything else in the
/// block is ignored on decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Declared block type; empty when absent.
    #[serde(rename = "type", default)]
    pub block_type: String,
    /// `text` field, kept raw because only string values are extracted.
    /// A present `null` is `Some(Value::Null)`, distinct from an absent key.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub text: Option<Value>,
    /// `content` field (tool results), kept raw for the same reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

fn present_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl ContentBlock {
    /// Build a `text` block.
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self {
            block_type: "text".into(),
            text: Some(Value::String(text.to_owned())),
            content: None,
        }
    }

    /// String value of the `text` field, if it is a string.
    #[must_use]
    pub fn text_str(&self) -> Option<&str> {
        self.text.as_ref().and_then(Value::as_str)
    }

    /// String value of the `content` field, if it is a string.
    #[must_use]
    pub fn content_str(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }
}

/// Body of an `assistant` line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Role reported by the assistant (normally `assistant`).
    #[serde(default)]
    pub role: String,
    /// Message content.
    #[serde(default)]
    pub content: MessageContent,
}

/// Summary carried by the terminal `result` line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSummary {
    /// Result subtype, e.g. `success` or `error_max_turns`.
    pub subtype: Option<String>,
    /// Whether the assistant reported the run as failed.
    pub is_error: bool,
    /// Final result text.
    pub result: Option<String>,
    /// Wall-clock duration reported by the assistant.
    pub duration_ms: Option<u64>,
    /// Reported cost in USD.
    pub cost_usd: Option<f64>,
    /// Number of agent turns.
    pub num_turns: Option<u32>,
}

/// Payload of the `system`/`init` line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemInit {
    /// Model the assistant resolved.
    pub model: Option<String>,
    /// Tools available to the assistant.
    pub tools: Vec<String>,
    /// Working directory the assistant reports.
    pub cwd: Option<String>,
}

/// Discriminant of a decoded line.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Assistant message carrying content.
    Assistant(AssistantMessage),
    /// End of the run. The only end-of-content marker consumers honor.
    Result(ResultSummary),
    /// Session initialisation.
    SystemInit(SystemInit),
    /// Error reported by the assistant.
    Error {
        /// Error text.
        message: String,
    },
    /// Any other well-formed line (tool results, non-init system lines).
    Other {
        /// Value of the `type` field.
        kind: String,
    },
}

/// One decoded line of assistant output.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Session identifier carried by the line, if non-empty.
    pub session_id: Option<String>,
    /// What the line describes.
    pub kind: EventKind,
}

impl Event {
    /// Assistant message event.
    #[must_use]
    pub fn assistant(content: MessageContent) -> Self {
        Self {
            session_id: None,
            kind: EventKind::Assistant(AssistantMessage {
                role: "assistant".into(),
                content,
            }),
        }
    }

    /// Assistant message event with plain text content.
    #[must_use]
    pub fn assistant_text(text: &str) -> Self {
        Self::assistant(MessageContent::from(text))
    }

    /// Successful result event.
    #[must_use]
    pub fn result() -> Self {
        Self {
            session_id: None,
            kind: EventKind::Result(ResultSummary {
                subtype: Some("success".into()),
                ..ResultSummary::default()
            }),
        }
    }

    /// Attach a session identifier.
    #[must_use]
    pub fn with_session_id(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_owned());
        self
    }

    /// Non-empty session identifier carried by this event.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Whether this is the terminal `result` event.
    #[must_use]
    pub fn is_result(&self) -> bool {
        matches!(self.kind, EventKind::Result(_))
    }

    /// Content of an assistant message event.
    #[must_use]
    pub fn assistant_content(&self) -> Option<&MessageContent> {
        match &self.kind {
            EventKind::Assistant(message) => Some(&message.content),
            _ => None,
        }
    }
}
