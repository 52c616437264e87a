//! Translation of assistant events into `chat.completion.chunk` frames.
//!
//! A [`StreamConverter`] is created per response. Its identity fields are
//! fixed at construction and repeated on every chunk so clients can
//! reassemble the stream.

use chrono::Utc;
use uuid::Uuid;

use crate::models::event::MessageContent;
use crate::models::openai::{
    ChatCompletionChunk, ChunkChoice, ChunkDelta, CHAT_COMPLETION_CHUNK_OBJECT, FINISH_REASON_STOP,
};

/// Length of the UUID prefix used in completion identifiers.
const COMPLETION_ID_UUID_LEN: usize = 29;

/// Generate a `chatcmpl-` identifier.
#[must_use]
pub fn new_completion_id() -> String {
    let uuid = Uuid::new_v4().to_string();
    format!("chatcmpl-{}", &uuid[..COMPLETION_ID_UUID_LEN])
}

/// Per-response chunk factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConverter {
    completion_id: String,
    model: String,
    session_id: String,
    created: i64,
}

impl StreamConverter {
    /// Converter with a fresh completion id and the current time.
    #[must_use]
    pub fn new(model: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self::with_identity(
            new_completion_id(),
            model,
            session_id,
            Utc::now().timestamp(),
        )
    }

    /// Converter with explicit identity fields.
    #[must_use]
    pub fn with_identity(
        completion_id: impl Into<String>,
        model: impl Into<String>,
        session_id: impl Into<String>,
        created: i64,
    ) -> Self {
        Self {
            completion_id: completion_id.into(),
            model: model.into(),
            session_id: session_id.into(),
            created,
        }
    }

    /// Completion identifier shared by every chunk.
    #[must_use]
    pub fn completion_id(&self) -> &str {
        &self.completion_id
    }

    /// Model name shared by every chunk.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Session the response belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Creation timestamp shared by every chunk.
    #[must_use]
    pub fn created(&self) -> i64 {
        self.created
    }

    /// First chunk: role marker, no content.
    #[must_use]
    pub fn initial_chunk(&self) -> ChatCompletionChunk {
        self.chunk(
            ChunkDelta {
                role: Some("assistant".into()),
                content: None,
            },
            None,
        )
    }

    /// One content delta carrying `text` unchanged.
    #[must_use]
    pub fn content_chunk(&self, text: &str) -> ChatCompletionChunk {
        self.chunk(
            ChunkDelta {
                role: None,
                content: Some(text.to_owned()),
            },
            None,
        )
    }

    /// Terminal chunk: empty delta, `finish_reason = "stop"`.
    #[must_use]
    pub fn final_chunk(&self) -> ChatCompletionChunk {
        self.chunk(ChunkDelta::default(), Some(FINISH_REASON_STOP.into()))
    }

    fn chunk(&self, delta: ChunkDelta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.completion_id.clone(),
            object: CHAT_COMPLETION_CHUNK_OBJECT.into(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }
}

/// Text of one event for incremental streaming.
///
/// A string is returned as is. For blocks, the first block typed `text`
/// whose `text` is a string wins; other text blocks are ignored. Returns
/// an empty string when nothing matches.
#[must_use]
pub fn extract_single_text(content: &MessageContent) -> &str {
    match content {
        MessageContent::Text(text) => text.as_str(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .filter(|block| block.block_type == "text")
            .find_map(|block| block.text_str())
            .unwrap_or_default(),
    }
}

/// Text of a whole message for buffered aggregation.
///
/// For blocks, takes each block's `text` when present, otherwise its
/// `content`, keeping only string values, and joins them with newlines.
#[must_use]
pub fn extract_message_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|block| match &block.text {
                Some(_) => block.text_str(),
                None => block.content_str(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
