//! Chunk construction and the two text extraction rules.

use claude_code_gateway::models::event::{ContentBlock, MessageContent};
use claude_code_gateway::stream::converter::{
    extract_message_text, extract_single_text, StreamConverter,
};
use claude_code_gateway::stream::sse::{format_done, format_error, format_event, DONE_FRAME};
use serde_json::{json, Value};

fn content_only_block(text: &str) -> ContentBlock {
    ContentBlock {
        block_type: "tool_result".into(),
        text: None,
        content: Some(Value::String(text.to_owned())),
    }
}

#[test]
fn chunks_share_identity() {
    let converter = StreamConverter::new("claude-test", "sess-1");
    let first = converter.initial_chunk();
    let middle = converter.content_chunk("Hi");
    let last = converter.final_chunk();

    for chunk in [&first, &middle, &last] {
        assert_eq!(chunk.id, converter.completion_id());
        assert_eq!(chunk.created, converter.created());
        assert_eq!(chunk.model, "claude-test");
        assert_eq!(chunk.object, "chat.completion.chunk");
        assert_eq!(chunk.choices.len(), 1);
        assert_eq!(chunk.choices[0].index, 0);
    }
}

#[test]
fn initial_chunk_announces_assistant_role() {
    let converter = StreamConverter::new("m", "s");
    let value = serde_json::to_value(converter.initial_chunk()).expect("serialize");
    assert_eq!(value["choices"][0]["delta"], json!({"role": "assistant"}));
    assert_eq!(value["choices"][0]["finish_reason"], Value::Null);
}

#[test]
fn content_chunk_carries_text_only() {
    let converter = StreamConverter::new("m", "s");
    let value = serde_json::to_value(converter.content_chunk("World")).expect("serialize");
    assert_eq!(value["choices"][0]["delta"], json!({"content": "World"}));
    assert_eq!(value["choices"][0]["finish_reason"], Value::Null);
}

#[test]
fn final_chunk_has_empty_delta_and_stop() {
    let converter = StreamConverter::new("m", "s");
    let value = serde_json::to_value(converter.final_chunk()).expect("serialize");
    assert_eq!(value["choices"][0]["delta"], json!({}));
    assert_eq!(value["choices"][0]["finish_reason"], "stop");
}

#[test]
fn separate_converters_get_distinct_ids() {
    let a = StreamConverter::new("m", "s");
    let b = StreamConverter::new("m", "s");
    assert_ne!(a.completion_id(), b.completion_id());
}

#[test]
fn single_text_of_string_content() {
    let content = MessageContent::from("plain");
    assert_eq!(extract_single_text(&content), "plain");
    assert_eq!(extract_message_text(&content), "plain");
}

#[test]
fn single_text_takes_first_text_block_only() {
    let content = MessageContent::Blocks(vec![
        ContentBlock::text("one"),
        ContentBlock::text("two"),
    ]);
    assert_eq!(extract_single_text(&content), "one");
    assert_eq!(extract_message_text(&content), "one\ntwo");
}

#[test]
fn single_text_skips_non_text_blocks() {
    let content = MessageContent::Blocks(vec![
        ContentBlock {
            block_type: "tool_use".into(),
            text: None,
            content: None,
        },
        ContentBlock::text("after tool"),
    ]);
    assert_eq!(extract_single_text(&content), "after tool");
}

#[test]
fn rules_differ_on_content_only_blocks() {
    let content = MessageContent::Blocks(vec![content_only_block("file contents")]);
    assert_eq!(extract_single_text(&content), "");
    assert_eq!(extract_message_text(&content), "file contents");
}

#[test]
fn non_string_values_are_ignored() {
    let content = MessageContent::Blocks(vec![ContentBlock {
        block_type: "text".into(),
        text: Some(json!({"nested": true})),
        content: Some(Value::String("fallback".into())),
    }]);
    assert_eq!(extract_single_text(&content), "");
    assert_eq!(extract_message_text(&content), "");
}

#[test]
fn null_text_key_still_counts_as_present() {
    let content: MessageContent =
        serde_json::from_value(json!([{"type": "tool_result", "text": null, "content": "X"}]))
            .expect("decodes");
    assert_eq!(extract_message_text(&content), "");

    let without_key: MessageContent =
        serde_json::from_value(json!([{"type": "tool_result", "content": "X"}])).expect("decodes");
    assert_eq!(extract_message_text(&without_key), "X");
}

#[test]
fn empty_blocks_extract_nothing() {
    let content = MessageContent::Blocks(Vec::new());
    assert_eq!(extract_single_text(&content), "");
    assert_eq!(extract_message_text(&content), "");
}

#[test]
fn sse_frames_have_data_prefix_and_blank_line() {
    let frame = format_event(&json!({"a": 1}));
    assert_eq!(frame, "data: {\"a\":1}\n\n");
    assert_eq!(format_done(), DONE_FRAME);
    assert_eq!(DONE_FRAME, "data: [DONE]\n\n");
}

#[test]
fn sse_error_frame_contains_error_object() {
    let frame = format_error("deadline", "timeout_error");
    let payload = frame
        .strip_prefix("data: ")
        .and_then(|f| f.strip_suffix("\n\n"))
        .expect("framed");
    let value: Value = serde_json::from_str(payload).expect("json");
    assert_eq!(value["error"]["message"], "deadline");
    assert_eq!(value["error"]["type"], "timeout_error");
    assert_eq!(value["error"]["code"], "stream_error");
}
