//! `POST /v1/chat/completions` over HTTP, in both response modes.

#![cfg(unix)]

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use super::test_helpers::{
    blocking_script, hello_world_script, result_only_script, script_from_lines, spawn_gateway,
    sse_payloads, test_config,
};

fn hello_request(stream: bool) -> Value {
    json!({
        "model": "claude-test",
        "messages": [
            {"role": "system", "content": "be brief"},
            {"role": "user", "content": "say hello"}
        ],
        "stream": stream,
        "temperature": 0.2
    })
}

async fn post_chat(base_url: &str, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base_url}/v1/chat/completions"))
        .json(body)
        .send()
        .await
        .expect("POST /v1/chat/completions")
}

// ── Buffered ─────────────────────────────────────────────────

#[tokio::test]
async fn buffered_completion_aggregates_reply() {
    let temp = tempfile::tempdir().expect("tempdir");
    let gateway = spawn_gateway(test_config(temp.path(), &hello_world_script())).await;

    let resp = post_chat(&gateway.base_url, &hello_request(false)).await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "claude-test");
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello\nWorld");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["prompt_tokens"], 10);
    assert_eq!(body["usage"]["completion_tokens"], 2);
    assert_eq!(body["usage"]["total_tokens"], 12);
    assert_eq!(body["project_id"], "default");
    assert!(!body["session_id"].as_str().expect("session id").is_empty());
}

#[tokio::test]
async fn buffered_result_only_returns_fallback() {
    let temp = tempfile::tempdir().expect("tempdir");
    let gateway = spawn_gateway(test_config(temp.path(), &result_only_script())).await;

    let resp = post_chat(&gateway.base_url, &hello_request(false)).await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(
        body["choices"][0]["message"]["content"],
        "Hello! I'm Claude, ready to help."
    );
}

/// Replies "Hi", reports a result carrying both cost fields, then hangs.
fn full_result_then_hang_script() -> String {
    script_from_lines(
        &[
            r#"{"type":"assistant","session_id":"s1","message":{"role":"assistant","content":[{"type":"text","text":"Hi"}]}}"#,
            r#"{"type":"result","subtype":"success","is_error":false,"duration_ms":900,"num_turns":1,"session_id":"s1","cost_usd":0.01,"total_cost_usd":0.01}"#,
        ],
        true,
    )
}

#[tokio::test]
async fn buffered_reply_ends_at_result_line_with_cost_fields() {
    let temp = tempfile::tempdir().expect("tempdir");
    let gateway = spawn_gateway(test_config(temp.path(), &full_result_then_hang_script())).await;

    let started = Instant::now();
    let resp = post_chat(&gateway.base_url, &hello_request(false)).await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["choices"][0]["message"]["content"], "Hi");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn streamed_reply_ends_at_result_line_with_cost_fields() {
    let temp = tempfile::tempdir().expect("tempdir");
    let gateway = spawn_gateway(test_config(temp.path(), &full_result_then_hang_script())).await;

    let started = Instant::now();
    let resp = post_chat(&gateway.base_url, &hello_request(true)).await;
    let body = resp.text().await.expect("sse body");

    let payloads = sse_payloads(&body);
    assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn project_directory_is_created() {
    let temp = tempfile::tempdir().expect("tempdir");
    let gateway = spawn_gateway(test_config(temp.path(), &hello_world_script())).await;

    let mut request = hello_request(false);
    request["project_id"] = json!("alpha");
    let resp = post_chat(&gateway.base_url, &request).await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["project_id"], "alpha");
    assert!(temp.path().join("alpha").is_dir());
}

#[tokio::test]
async fn buffered_timeout_is_silent_by_default() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(temp.path(), &blocking_script());
    config.assistant.streaming_timeout_seconds = 1;
    let gateway = spawn_gateway(config).await;

    let resp = post_chat(&gateway.base_url, &hello_request(false)).await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(
        body["choices"][0]["message"]["content"],
        "Hello! I'm Claude, ready to help."
    );
}

#[tokio::test]
async fn buffered_timeout_is_reported_when_enabled() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(temp.path(), &blocking_script());
    config.assistant.streaming_timeout_seconds = 1;
    config.assistant.report_timeouts = true;
    let gateway = spawn_gateway(config).await;

    let resp = post_chat(&gateway.base_url, &hello_request(false)).await;

    assert_eq!(resp.status(), 504);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["error"]["type"], "timeout_error");
}

// ── Streaming ────────────────────────────────────────────────

#[tokio::test]
async fn streamed_completion_emits_frames_in_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let gateway = spawn_gateway(test_config(temp.path(), &hello_world_script())).await;

    let resp = post_chat(&gateway.base_url, &hello_request(true)).await;

    assert_eq!(resp.status(), 200);
    let headers = resp.headers().clone();
    assert_eq!(
        headers.get("content-type").and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
    assert_eq!(
        headers.get("cache-control").and_then(|v| v.to_str().ok()),
        Some("no-cache")
    );
    assert_eq!(
        headers.get("x-project-id").and_then(|v| v.to_str().ok()),
        Some("default")
    );
    assert!(headers.get("x-session-id").is_some());

    let body = resp.text().await.expect("body");
    let payloads = sse_payloads(&body);
    assert_eq!(payloads.len(), 5, "unexpected frames: {payloads:?}");
    assert_eq!(payloads[4], "[DONE]");

    let chunks: Vec<Value> = payloads[..4]
        .iter()
        .map(|p| serde_json::from_str(p).expect("chunk json"))
        .collect();
    assert_eq!(chunks[0]["choices"][0]["delta"]["role"], "assistant");
    assert_eq!(chunks[1]["choices"][0]["delta"]["content"], "Hello");
    assert_eq!(chunks[2]["choices"][0]["delta"]["content"], "World");
    assert_eq!(chunks[3]["choices"][0]["finish_reason"], "stop");
    assert!(chunks.iter().all(|c| c["id"] == chunks[0]["id"]));
    assert!(chunks.iter().all(|c| c["object"] == "chat.completion.chunk"));
}

#[tokio::test]
async fn streamed_result_only_has_three_frames() {
    let temp = tempfile::tempdir().expect("tempdir");
    let gateway = spawn_gateway(test_config(temp.path(), &result_only_script())).await;

    let resp = post_chat(&gateway.base_url, &hello_request(true)).await;
    let body = resp.text().await.expect("body");

    assert_eq!(sse_payloads(&body).len(), 3);
}

#[tokio::test]
async fn streamed_timeout_emits_error_frame_when_enabled() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(temp.path(), &blocking_script());
    config.assistant.streaming_timeout_seconds = 1;
    config.assistant.report_timeouts = true;
    let gateway = spawn_gateway(config).await;

    let resp = post_chat(&gateway.base_url, &hello_request(true)).await;
    let body = resp.text().await.expect("body");
    let payloads = sse_payloads(&body);

    assert_eq!(payloads.len(), 4, "unexpected frames: {payloads:?}");
    let error: Value = serde_json::from_str(&payloads[1]).expect("error json");
    assert_eq!(error["error"]["type"], "timeout_error");
    let last: Value = serde_json::from_str(&payloads[2]).expect("final json");
    assert_eq!(last["choices"][0]["finish_reason"], "stop");
    assert_eq!(payloads[3], "[DONE]");
}

// ── Request errors ───────────────────────────────────────────

#[tokio::test]
async fn missing_user_message_is_bad_request() {
    let temp = tempfile::tempdir().expect("tempdir");
    let gateway = spawn_gateway(test_config(temp.path(), &hello_world_script())).await;

    let body = json!({"messages": [{"role": "system", "content": "hi"}]});
    let resp = post_chat(&gateway.base_url, &body).await;

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["code"], "missing_user_message");
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let temp = tempfile::tempdir().expect("tempdir");
    let gateway = spawn_gateway(test_config(temp.path(), &hello_world_script())).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/v1/chat/completions", gateway.base_url))
        .header("content-type", "application/json")
        .body("{\"messages\": ")
        .send()
        .await
        .expect("POST");

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn path_traversal_project_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let gateway = spawn_gateway(test_config(temp.path(), &hello_world_script())).await;

    let mut request = hello_request(false);
    request["project_id"] = json!("../escape");
    let resp = post_chat(&gateway.base_url, &request).await;

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["error"]["code"], "invalid_project_id");
}

#[tokio::test]
async fn launch_failure_is_service_unavailable() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(temp.path(), "");
    config.assistant.binary_path = "/nonexistent/claude".into();
    config.assistant.extra_args.clear();
    let gateway = spawn_gateway(config).await;

    let resp = post_chat(&gateway.base_url, &hello_request(true)).await;

    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["error"]["type"], "service_unavailable");
    assert_eq!(body["error"]["code"], "claude_unavailable");
}

#[tokio::test]
async fn capacity_rejection_is_service_unavailable() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(temp.path(), &blocking_script());
    config.assistant.track_sessions = true;
    config.assistant.max_concurrent_sessions = 1;
    config.assistant.streaming_timeout_seconds = 30;
    let gateway = spawn_gateway(config).await;

    // Holds the only slot until the response body is dropped.
    let held = post_chat(&gateway.base_url, &hello_request(true)).await;
    assert_eq!(held.status(), 200);
    assert_eq!(gateway.state.registry.active_session_count(), 1);

    let resp = post_chat(&gateway.base_url, &hello_request(true)).await;

    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["error"]["code"], "capacity_exceeded");
    drop(held);
}
