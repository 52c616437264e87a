//! Launching, reading, and stopping real assistant processes.

#![cfg(unix)]

use std::time::Duration;

use claude_code_gateway::orchestrator::registry::SessionRegistry;
use claude_code_gateway::process::handle::ProcessHandle;
use claude_code_gateway::stream::assembler::{collect_buffered, FALLBACK_REPLY};
use tokio::time::Instant;

use super::test_helpers::{
    blocking_script, hello_world_script, result_only_script, script_assistant,
    script_from_lines, SCRIPT_SESSION_ID, SCRIPT_VERSION,
};

fn deadline(secs: u64) -> Instant {
    Instant::now() + Duration::from_secs(secs)
}

fn launch(script: &str, deadline: Instant) -> (ProcessHandle, tempfile::TempDir) {
    let temp = tempfile::tempdir().expect("tempdir");
    let registry = SessionRegistry::new(&script_assistant(script));
    let handle = registry
        .create_session(deadline, temp.path(), "say hi", "claude-test", None)
        .expect("launch");
    (handle, temp)
}

async fn drain(handle: &mut ProcessHandle) -> usize {
    let mut count = 0;
    while tokio::time::timeout(Duration::from_secs(5), handle.events.recv())
        .await
        .expect("queue closes")
        .is_some()
    {
        count += 1;
    }
    count
}

#[tokio::test]
async fn hello_world_is_aggregated() {
    let (mut handle, _temp) = launch(&hello_world_script(), deadline(10));

    let reply = collect_buffered(&mut handle).await;

    assert_eq!(reply.text, "Hello\nWorld");
    assert!(reply.completed);
    assert!(!reply.timed_out);
    assert_eq!(handle.session_id().as_deref(), Some(SCRIPT_SESSION_ID));
}

#[tokio::test]
async fn result_only_falls_back() {
    let (mut handle, _temp) = launch(&result_only_script(), deadline(10));

    let reply = collect_buffered(&mut handle).await;

    assert_eq!(reply.text, FALLBACK_REPLY);
    assert_eq!(handle.session_id().as_deref(), Some("sess-empty"));
}

#[tokio::test]
async fn malformed_lines_are_skipped() {
    let script = script_from_lines(
        &[
            "not json at all",
            r#"{"type":"assistant","session_id":"s-1"}"#,
            "",
            r#"{"type":"assistant","message":{"role":"assistant","content":"survived"}}"#,
            r#"{"type":"result","subtype":"success"}"#,
        ],
        false,
    );
    let (mut handle, _temp) = launch(&script, deadline(10));

    let reply = collect_buffered(&mut handle).await;

    assert_eq!(reply.text, "survived");
    assert!(reply.completed);
    assert!(
        handle.session_id().is_none(),
        "session id from a rejected line must not be adopted"
    );
}

#[tokio::test]
async fn first_session_id_is_kept() {
    let script = script_from_lines(
        &[
            r#"{"type":"system","subtype":"init","session_id":"first"}"#,
            r#"{"type":"assistant","session_id":"second","message":{"content":"x"}}"#,
            r#"{"type":"result","session_id":"third"}"#,
        ],
        false,
    );
    let (mut handle, _temp) = launch(&script, deadline(10));

    assert_eq!(drain(&mut handle).await, 3);
    assert_eq!(handle.session_id().as_deref(), Some("first"));
}

#[tokio::test]
async fn stderr_output_does_not_reach_the_queue() {
    let script = format!(
        "echo 'warning: noisy' >&2\n{}",
        hello_world_script()
    );
    let (mut handle, _temp) = launch(&script, deadline(10));

    assert_eq!(drain(&mut handle).await, 4);
}

#[tokio::test]
async fn running_flag_clears_when_output_ends() {
    let (mut handle, _temp) = launch(&hello_world_script(), deadline(10));
    assert!(handle.pid().is_some());

    drain(&mut handle).await;

    assert!(!handle.is_running());
}

#[tokio::test]
async fn process_runs_in_working_directory() {
    let script = "printf '{\"type\":\"assistant\",\"message\":{\"content\":\"%s\"}}\\n' \"$(pwd)\"\n";
    let (mut handle, temp) = launch(script, deadline(10));

    let reply = collect_buffered(&mut handle).await;

    let expected = temp.path().canonicalize().expect("canonical temp");
    let reported = std::path::Path::new(&reply.text)
        .canonicalize()
        .expect("canonical reported");
    assert_eq!(reported, expected);
    assert_eq!(handle.working_dir(), temp.path());
}

#[tokio::test]
async fn prompt_and_model_are_passed_as_arguments() {
    let script = "printf '{\"type\":\"assistant\",\"message\":{\"content\":\"%s %s %s %s\"}}\\n' \"$1\" \"$2\" \"$3\" \"$4\"\n";
    let (mut handle, _temp) = launch(script, deadline(10));

    let reply = collect_buffered(&mut handle).await;

    assert_eq!(reply.text, "-p say hi --model claude-test");
}

#[tokio::test]
async fn deadline_kills_and_closes_queue() {
    let started = std::time::Instant::now();
    let (mut handle, _temp) = launch(&blocking_script(), Instant::now() + Duration::from_millis(300));

    let reply = tokio::time::timeout(Duration::from_secs(10), collect_buffered(&mut handle))
        .await
        .expect("deadline closes the queue");

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(reply.timed_out);
    assert!(!reply.completed);
    assert_eq!(reply.text, FALLBACK_REPLY);
    assert!(handle.timed_out());
}

#[tokio::test]
async fn deadline_keeps_output_produced_before_expiry() {
    let script = script_from_lines(
        &[r#"{"type":"assistant","message":{"content":"partial"}}"#],
        true,
    );
    let (mut handle, _temp) = launch(&script, Instant::now() + Duration::from_millis(500));

    let reply = collect_buffered(&mut handle).await;

    assert_eq!(reply.text, "partial");
    assert!(reply.timed_out);
}

#[tokio::test]
async fn stop_terminates_a_blocked_process() {
    let (mut handle, _temp) = launch(&blocking_script(), deadline(60));
    assert!(handle.is_running());

    handle.stop();
    handle.stop();

    assert!(!handle.is_running());
    assert_eq!(drain(&mut handle).await, 0);
    assert!(!handle.timed_out());
}

#[tokio::test]
async fn version_probe_reports_first_line() {
    let registry = SessionRegistry::new(&script_assistant(&hello_world_script()));

    let version = registry.version().await.expect("probe succeeds");

    assert_eq!(version, SCRIPT_VERSION);
}

#[tokio::test]
async fn version_probe_is_memoized_until_reset() {
    let temp = tempfile::tempdir().expect("tempdir");
    let counter = temp.path().join("probes");
    let script = format!(
        "if [ \"$1\" = \"--version\" ]; then echo probe >> '{}'; echo \"2.0.$(wc -l < '{}' | tr -d ' ')\"; exit 0; fi\n",
        counter.display(),
        counter.display()
    );
    let registry = SessionRegistry::new(&script_assistant(&script));

    let first = registry.version().await.expect("first probe");
    let second = registry.version().await.expect("cached");
    assert_eq!(first, "2.0.1");
    assert_eq!(second, first);

    registry.reset_version_cache().await;
    let third = registry.version().await.expect("re-probed");
    assert_eq!(third, "2.0.2");

    let probes = std::fs::read_to_string(&counter).expect("counter file");
    assert_eq!(probes.lines().count(), 2);
}

#[tokio::test]
async fn failed_version_probe_is_memoized() {
    let temp = tempfile::tempdir().expect("tempdir");
    let marker = temp.path().join("installed");
    let script = format!(
        "if [ \"$1\" = \"--version\" ]; then [ -f '{}' ] && echo 3.0.0 && exit 0; exit 1; fi\n",
        marker.display()
    );
    let registry = SessionRegistry::new(&script_assistant(&script));

    assert!(registry.version().await.is_err());
    std::fs::write(&marker, "").expect("marker");
    assert!(registry.version().await.is_err(), "failure stays cached");

    registry.reset_version_cache().await;
    assert_eq!(registry.version().await.expect("now available"), "3.0.0");
}
