//! Response assembly over a process handle's event queue.
//!
//! Two consumption strategies share the same producer:
//!
//! - [`stream_incremental`] translates each assistant event into a content
//!   frame as soon as it arrives.
//! - [`collect_buffered`] drains the queue and builds one aggregated reply.
//!
//! Exactly one of them consumes a given handle.

use futures_util::stream::{self, Stream};
use tracing::{debug, warn};

use crate::models::event::Event;
use crate::models::openai::{
    ChatCompletionChoice, ChatCompletionResponse, ChatCompletionUsage, ChatMessage,
    CHAT_COMPLETION_OBJECT, FINISH_REASON_STOP,
};
use crate::process::handle::ProcessHandle;
use crate::stream::converter::{
    extract_message_text, extract_single_text, new_completion_id, StreamConverter,
};
use crate::stream::sse::{format_done, format_error, format_event};

/// Reply used when the assistant produced no text.
pub const FALLBACK_REPLY: &str = "Hello! I'm Claude, ready to help.";

/// Prompt token count reported on every buffered reply.
///
/// The gateway has no tokenizer; usage figures are an approximation kept
/// stable for client compatibility.
pub const PROMPT_TOKENS: usize = 10;

/// Message of the error frame emitted when timeouts are reported.
pub const TIMEOUT_MESSAGE: &str = "assistant deadline expired before the response completed";

// ── Buffered ─────────────────────────────────────────────────────────────────

/// Aggregated output of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedReply {
    /// Joined text, or [`FALLBACK_REPLY`] when nothing was produced.
    pub text: String,
    /// Approximate usage counters.
    pub usage: ChatCompletionUsage,
    /// Whether a `result` event was seen.
    pub completed: bool,
    /// Whether the queue closed because the deadline expired.
    pub timed_out: bool,
}

/// Approximate usage for `text`: completion tokens are whitespace-separated
/// words, prompt tokens are [`PROMPT_TOKENS`].
#[must_use]
pub fn synthesize_usage(text: &str) -> ChatCompletionUsage {
    let completion_tokens = text.split_whitespace().count();
    ChatCompletionUsage {
        prompt_tokens: PROMPT_TOKENS,
        completion_tokens,
        total_tokens: PROMPT_TOKENS + completion_tokens,
    }
}

/// Drain `handle` until a `result` event or queue closure.
///
/// Each assistant message contributes its whole-message text; fragments are
/// joined with newlines in arrival order.
pub async fn collect_buffered(handle: &mut ProcessHandle) -> BufferedReply {
    let mut fragments: Vec<String> = Vec::new();
    let mut completed = false;

    while let Some(event) = handle.events.recv().await {
        if let Some(content) = event.assistant_content() {
            let text = extract_message_text(content);
            if !text.is_empty() {
                fragments.push(text);
            }
        }
        if event.is_result() {
            completed = true;
            break;
        }
    }

    let mut text = fragments.join("\n");
    if text.is_empty() {
        text = FALLBACK_REPLY.to_owned();
    }
    let timed_out = !completed && handle.timed_out();
    if timed_out {
        warn!(fragments = fragments.len(), "buffered reply truncated by deadline");
    }

    BufferedReply {
        usage: synthesize_usage(&text),
        text,
        completed,
        timed_out,
    }
}

/// Wrap a buffered reply in a `chat.completion` object.
#[must_use]
pub fn build_completion_response(
    reply: &BufferedReply,
    model: &str,
    session_id: &str,
    project_id: &str,
) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: new_completion_id(),
        object: CHAT_COMPLETION_OBJECT.into(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_owned(),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ChatMessage::new("assistant", &reply.text),
            finish_reason: FINISH_REASON_STOP.into(),
        }],
        usage: reply.usage,
        session_id: session_id.to_owned(),
        project_id: project_id.to_owned(),
    }
}

// ── Incremental ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initial,
    Content,
    Final,
    Done,
    Finished,
}

struct Incremental {
    handle: ProcessHandle,
    converter: StreamConverter,
    report_timeouts: bool,
    phase: Phase,
    content_frames: usize,
}

impl Incremental {
    async fn next_event(&mut self) -> Option<Event> {
        self.handle.events.recv().await
    }

    async fn next_frame(&mut self) -> Option<String> {
        loop {
            match self.phase {
                Phase::Initial => {
                    self.phase = Phase::Content;
                    return Some(format_event(&self.converter.initial_chunk()));
                }
                Phase::Content => match self.next_event().await {
                    Some(event) => {
                        if event.is_result() {
                            self.phase = Phase::Final;
                            continue;
                        }
                        let Some(content) = event.assistant_content() else {
                            continue;
                        };
                        let text = extract_single_text(content);
                        if text.is_empty() {
                            continue;
                        }
                        self.content_frames += 1;
                        return Some(format_event(&self.converter.content_chunk(text)));
                    }
                    None => {
                        self.phase = Phase::Final;
                        if self.handle.timed_out() {
                            warn!(
                                content_frames = self.content_frames,
                                "streamed reply truncated by deadline"
                            );
                            if self.report_timeouts {
                                return Some(format_error(TIMEOUT_MESSAGE, "timeout_error"));
                            }
                        }
                    }
                },
                Phase::Final => {
                    self.phase = Phase::Done;
                    return Some(format_event(&self.converter.final_chunk()));
                }
                Phase::Done => {
                    self.phase = Phase::Finished;
                    debug!(
                        content_frames = self.content_frames,
                        session_id = self.converter.session_id(),
                        "streamed reply complete"
                    );
                    return Some(format_done().to_owned());
                }
                Phase::Finished => return None,
            }
        }
    }
}

/// Stream SSE frames for `handle`: initial, one content frame per assistant
/// event with non-empty single-event text, final, then `[DONE]`.
///
/// Reading stops at the first `result` event without waiting for the queue
/// to close. When the queue closes because the deadline expired and
/// `report_timeouts` is set, an error frame precedes the final chunk.
///
/// The stream owns the handle; dropping the stream stops the process.
pub fn stream_incremental(
    handle: ProcessHandle,
    converter: StreamConverter,
    report_timeouts: bool,
) -> impl Stream<Item = String> + Send + 'static {
    let state = Incremental {
        handle,
        converter,
        report_timeouts,
        phase: Phase::Initial,
        content_frames: 0,
    };

    stream::unfold(state, |mut state| async move {
        let frame = state.next_frame().await?;
        Some((frame, state))
    })
}
