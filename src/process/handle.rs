//! Assistant process handle.
//!
//! Launches one assistant subprocess per request with:
//! - a deterministic argument list (prompt, system prompt, model, output flags),
//! - `kill_on_drop(true)` so an abandoned child never outlives its handle,
//! - three background tasks: stdout parsing, stderr draining, exit waiting.
//!
//! The handle exposes the parser's ordered event queue and the session id
//! adopted from the stream.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AssistantConfig;
use crate::models::event::Event;
use crate::process::reader::run_parser;
use crate::{AppError, Result};

/// Capacity of the parser → consumer event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 100;

/// Flags appended to every invocation to request `stream-json` output.
pub const OUTPUT_MODE_ARGS: &[&str] = &[
    "--output-format",
    "stream-json",
    "--verbose",
    "--dangerously-skip-permissions",
];

/// Callback run once when a handle stops being in flight.
pub type FinishHook = Box<dyn FnOnce() + Send>;

// ── Request ──────────────────────────────────────────────────────────────────

/// One assistant invocation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    prompt: String,
    system_prompt: Option<String>,
    model: String,
    working_dir: PathBuf,
}

impl InvocationRequest {
    /// Invocation of `prompt` inside `working_dir` with the assistant's default model.
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            model: String::new(),
            working_dir: working_dir.into(),
        }
    }

    /// Set the system prompt; empty strings are ignored.
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        self.system_prompt = (!system_prompt.is_empty()).then_some(system_prompt);
        self
    }

    /// Set the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Prompt text.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// System prompt, if any.
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Model identifier; empty means the assistant's default.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Directory the subprocess runs in.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

/// Binary and fixed arguments used for every launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Assistant binary.
    pub binary: String,
    /// Arguments placed before the prompt.
    pub extra_args: Vec<String>,
}

impl From<&AssistantConfig> for LaunchOptions {
    fn from(config: &AssistantConfig) -> Self {
        Self {
            binary: config.binary_path.clone(),
            extra_args: config.extra_args.clone(),
        }
    }
}

/// Build the argument list for one invocation.
///
/// Order: extra arguments, `-p <prompt>`, `--system-prompt <s>` when set,
/// `--model <m>` when non-empty, then [`OUTPUT_MODE_ARGS`].
#[must_use]
pub fn build_args(options: &LaunchOptions, request: &InvocationRequest) -> Vec<String> {
    let mut args = options.extra_args.clone();
    args.push("-p".into());
    args.push(request.prompt.clone());

    if let Some(system_prompt) = &request.system_prompt {
        args.push("--system-prompt".into());
        args.push(system_prompt.clone());
    }
    if !request.model.is_empty() {
        args.push("--model".into());
        args.push(request.model.clone());
    }

    args.extend(OUTPUT_MODE_ARGS.iter().map(|&flag| flag.to_owned()));
    args
}

// ── Shared state ─────────────────────────────────────────────────────────────

/// State shared between a handle and its background tasks.
pub struct ProcessState {
    session_id: OnceLock<String>,
    running: Mutex<bool>,
    timed_out: AtomicBool,
    cancel: CancellationToken,
    on_finish: Mutex<Option<FinishHook>>,
}

impl std::fmt::Debug for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessState")
            .field("session_id", &self.session_id.get())
            .field("running", &self.is_running())
            .field("timed_out", &self.timed_out())
            .finish_non_exhaustive()
    }
}

impl ProcessState {
    /// Fresh state: not running, no session id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_id: OnceLock::new(),
            running: Mutex::new(false),
            timed_out: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            on_finish: Mutex::new(None),
        }
    }

    /// Adopted session id, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.get().map(String::as_str)
    }

    /// Adopt `id` unless a session id is already set or `id` is empty.
    ///
    /// Returns `true` when `id` was adopted.
    pub fn adopt_session_id(&self, id: &str) -> bool {
        !id.is_empty() && self.session_id.set(id.to_owned()).is_ok()
    }

    /// Whether the parser task is still consuming output.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the deadline expired before the process exited.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
    }

    /// Called by the parser task once stdout is exhausted.
    pub fn mark_finished(&self) {
        self.set_running(false);
        self.run_finish_hook();
    }

    fn set_running(&self, running: bool) {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = running;
    }

    fn mark_timed_out(&self) {
        self.timed_out.store(true, Ordering::Release);
    }

    fn set_finish_hook(&self, hook: FinishHook) {
        *self.on_finish.lock().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    fn run_finish_hook(&self) {
        let hook = self
            .on_finish
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Request termination; idempotent and non-blocking.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.set_running(false);
        self.run_finish_hook();
    }
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::new()
    }
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// One in-flight assistant invocation.
///
/// Dropping the handle stops the process.
#[derive(Debug)]
pub struct ProcessHandle {
    state: Arc<ProcessState>,
    working_dir: PathBuf,
    pid: Option<u32>,
    /// Decoded events in arrival order; closed once the parser finishes.
    pub events: mpsc::Receiver<Event>,
}

impl ProcessHandle {
    /// Launch the assistant for `request`.
    ///
    /// The process is killed once `deadline` passes. Must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the process cannot be spawned or its
    /// output pipes cannot be captured.
    pub fn start(
        deadline: Instant,
        options: &LaunchOptions,
        request: &InvocationRequest,
    ) -> Result<Self> {
        Self::start_with_hook(deadline, options, request, None)
    }

    pub(crate) fn start_with_hook(
        deadline: Instant,
        options: &LaunchOptions,
        request: &InvocationRequest,
        on_finish: Option<FinishHook>,
    ) -> Result<Self> {
        let mut cmd = Command::new(&options.binary);
        cmd.args(build_args(options, request))
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| AppError::Launch(format!("failed to start assistant: {err}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Launch("failed to capture assistant stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Launch("failed to capture assistant stderr".into()))?;

        let pid = child.id();
        let state = Arc::new(ProcessState::new());
        state.set_running(true);
        if let Some(hook) = on_finish {
            state.set_finish_hook(hook);
        }

        let (event_tx, events) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        tokio::spawn(run_parser(stdout, Arc::clone(&state), event_tx));
        tokio::spawn(drain_stderr(stderr, pid));
        tokio::spawn(wait_for_exit(child, Arc::clone(&state), deadline));

        info!(
            pid = pid.unwrap_or(0),
            binary = %options.binary,
            working_dir = %request.working_dir.display(),
            "assistant process started"
        );

        Ok(Self {
            state,
            working_dir: request.working_dir.clone(),
            pid,
            events,
        })
    }

    /// Handle over an externally fed event queue with no process behind it.
    ///
    /// Reports running until [`ProcessHandle::stop`] is called.
    #[must_use]
    pub fn detached(working_dir: impl Into<PathBuf>, events: mpsc::Receiver<Event>) -> Self {
        let state = Arc::new(ProcessState::new());
        state.set_running(true);
        Self {
            state,
            working_dir: working_dir.into(),
            pid: None,
            events,
        }
    }

    /// Session id adopted from the stream; `None` until the first event carrying one.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.state.session_id().map(str::to_owned)
    }

    /// Directory the process runs in.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// OS process id, if a process was started and has not been reaped yet.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the parser task is still consuming output.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Whether the invocation deadline expired and the process was killed.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.state.timed_out()
    }

    /// Shared state, used by the registry to stop in-flight handles.
    #[must_use]
    pub fn state(&self) -> Arc<ProcessState> {
        Arc::clone(&self.state)
    }

    /// Force termination; idempotent and does not wait for exit.
    pub fn stop(&self) {
        self.state.stop();
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.state.stop();
    }
}

// ── Background tasks ─────────────────────────────────────────────────────────

/// Log each stderr line at `DEBUG` until EOF.
async fn drain_stderr<R>(stderr: R, pid: Option<u32>)
where
    R: AsyncRead + Unpin + Send,
{
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(pid = pid.unwrap_or(0), stderr = %line, "assistant stderr"),
            Ok(None) => break,
            Err(err) => {
                debug!(pid = pid.unwrap_or(0), %err, "assistant stderr read failed");
                break;
            }
        }
    }
}

enum ExitOutcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    DeadlineExpired,
    Cancelled,
}

/// Wait for the child to exit, killing it on deadline expiry or cancellation.
async fn wait_for_exit(mut child: Child, state: Arc<ProcessState>, deadline: Instant) {
    let pid = child.id().unwrap_or(0);

    let outcome = tokio::select! {
        result = child.wait() => ExitOutcome::Exited(result),
        () = tokio::time::sleep_until(deadline) => ExitOutcome::DeadlineExpired,
        () = state.cancel.cancelled() => ExitOutcome::Cancelled,
    };

    match outcome {
        ExitOutcome::Exited(Ok(status)) if status.success() => {
            debug!(pid, "assistant process exited");
        }
        ExitOutcome::Exited(Ok(status)) => {
            warn!(pid, code = ?status.code(), "assistant process exited with error");
        }
        ExitOutcome::Exited(Err(err)) => {
            warn!(pid, %err, "error waiting for assistant process");
        }
        ExitOutcome::DeadlineExpired => {
            state.mark_timed_out();
            warn!(pid, "assistant deadline expired, killing process");
            if let Err(err) = child.kill().await {
                warn!(pid, %err, "failed to kill assistant process");
            }
        }
        ExitOutcome::Cancelled => {
            debug!(pid, "assistant process stopped");
            if let Err(err) = child.kill().await {
                debug!(pid, %err, "assistant process already gone");
            }
        }
    }
}
