//! Session registry and launch gate.
//!
//! The registry compares its size against the configured ceiling before
//! every launch and owns the memoized assistant version probe.
//!
//! By default launched handles are never registered, so the ceiling check
//! always passes. Setting `assistant.track_sessions` reserves a slot under
//! the same lock as the check and releases it when the handle's output is
//! exhausted or the handle is stopped.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::process::Command;
use tokio::time::Instant;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::AssistantConfig;
use crate::process::handle::{
    FinishHook, InvocationRequest, LaunchOptions, ProcessHandle, ProcessState,
};
use crate::{AppError, Result};

/// Registered handles keyed by launch key. `None` marks a reserved slot whose
/// process has not started yet.
type SessionMap = HashMap<String, Option<Arc<ProcessState>>>;

/// Outcome of the version probe, cached after the first call.
type ProbeOutcome = std::result::Result<String, String>;

/// Reject a launch when `current` is at or above `ceiling`.
///
/// # Errors
///
/// Returns `AppError::Capacity` when the ceiling is reached.
pub fn check_capacity(current: usize, ceiling: usize) -> Result<()> {
    if current >= ceiling {
        return Err(AppError::Capacity(format!(
            "max concurrent sessions ({ceiling}) reached"
        )));
    }
    Ok(())
}

/// Launches assistant processes behind a concurrency ceiling.
#[derive(Debug)]
pub struct SessionRegistry {
    options: LaunchOptions,
    max_sessions: usize,
    track_sessions: bool,
    probe_timeout: Duration,
    sessions: Arc<Mutex<SessionMap>>,
    version: tokio::sync::Mutex<Option<ProbeOutcome>>,
}

impl SessionRegistry {
    /// Build a registry from the assistant configuration.
    #[must_use]
    pub fn new(config: &AssistantConfig) -> Self {
        Self {
            options: LaunchOptions::from(config),
            max_sessions: config.max_concurrent_sessions,
            track_sessions: config.track_sessions,
            probe_timeout: config.version_probe_timeout(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            version: tokio::sync::Mutex::new(None),
        }
    }

    /// Configured ceiling.
    #[must_use]
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Launch the assistant for `request` if the ceiling allows it.
    ///
    /// # Errors
    ///
    /// - `AppError::Capacity`: the ceiling is reached; nothing was started.
    /// - `AppError::Launch`: the process failed to start.
    pub fn launch(&self, deadline: Instant, request: &InvocationRequest) -> Result<ProcessHandle> {
        let span = info_span!(
            "launch_session",
            working_dir = %request.working_dir().display(),
            model = request.model()
        );
        let _guard = span.enter();

        let reserved_key = {
            let mut sessions = self.lock_sessions();
            check_capacity(sessions.len(), self.max_sessions)?;
            if self.track_sessions {
                let key = Uuid::new_v4().to_string();
                sessions.insert(key.clone(), None);
                Some(key)
            } else {
                None
            }
        };

        let Some(key) = reserved_key else {
            return ProcessHandle::start(deadline, &self.options, request);
        };

        let hook_sessions = Arc::clone(&self.sessions);
        let hook_key = key.clone();
        let hook: FinishHook = Box::new(move || {
            hook_sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&hook_key);
        });

        match ProcessHandle::start_with_hook(deadline, &self.options, request, Some(hook)) {
            Ok(handle) => {
                if let Some(slot) = self.lock_sessions().get_mut(&key) {
                    *slot = Some(handle.state());
                }
                Ok(handle)
            }
            Err(err) => {
                self.lock_sessions().remove(&key);
                Err(err)
            }
        }
    }

    /// Launch the assistant in `working_dir`.
    ///
    /// `model` may be empty to use the assistant's default; `system_prompt`
    /// is omitted when `None` or empty.
    ///
    /// # Errors
    ///
    /// See [`SessionRegistry::launch`].
    pub fn create_session(
        &self,
        deadline: Instant,
        working_dir: impl Into<PathBuf>,
        prompt: &str,
        model: &str,
        system_prompt: Option<&str>,
    ) -> Result<ProcessHandle> {
        let mut request = InvocationRequest::new(working_dir, prompt).with_model(model);
        if let Some(system_prompt) = system_prompt {
            request = request.with_system_prompt(system_prompt);
        }

        let handle = self.launch(deadline, &request)?;
        info!(
            session_id = %handle.session_id().unwrap_or_default(),
            pid = handle.pid().unwrap_or(0),
            "assistant session created"
        );
        Ok(handle)
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn active_session_count(&self) -> usize {
        self.lock_sessions().len()
    }

    /// Stop and forget every registered session.
    pub fn cleanup_all(&self) {
        let drained: Vec<(String, Option<Arc<ProcessState>>)> =
            self.lock_sessions().drain().collect();
        let count = drained.len();

        for state in drained.into_iter().filter_map(|(_, state)| state) {
            state.stop();
        }

        if count > 0 {
            info!(count, "stopped registered assistant sessions");
        }
    }

    /// Assistant version, probed on first use and cached afterwards.
    ///
    /// A failed probe is cached as well; call
    /// [`SessionRegistry::reset_version_cache`] to probe again.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the probe failed.
    pub async fn version(&self) -> Result<String> {
        let mut cached = self.version.lock().await;
        let outcome = if let Some(outcome) = cached.as_ref() {
            outcome.clone()
        } else {
            let outcome = probe_version(&self.options, self.probe_timeout).await;
            if let Err(err) = &outcome {
                warn!(%err, "assistant version probe failed");
            }
            *cached = Some(outcome.clone());
            outcome
        };

        outcome.map_err(|err| AppError::Launch(format!("failed to get assistant version: {err}")))
    }

    /// Forget the cached version so the next call probes again.
    pub async fn reset_version_cache(&self) {
        *self.version.lock().await = None;
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, SessionMap> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run `<binary> [extra args] --version` and return the first output line.
async fn probe_version(options: &LaunchOptions, timeout: Duration) -> ProbeOutcome {
    let mut cmd = Command::new(&options.binary);
    cmd.args(&options.extra_args)
        .arg("--version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => return Err(format!("failed to run {}: {err}", options.binary)),
        Err(_) => return Err(format!("version probe timed out after {timeout:?}")),
    };

    if !output.status.success() {
        return Err(format!("version probe exited with {}", output.status));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| "version probe produced no output".to_owned())
}
