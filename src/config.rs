//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Environment variable carrying additional comma-separated API keys.
pub const API_KEYS_ENV: &str = "GATEWAY_API_KEYS";

/// Assistant binary name searched on `PATH` when no explicit path is set.
const DEFAULT_BINARY_NAME: &str = "claude";

/// Well-known install locations probed after the `PATH` search.
const FALLBACK_BINARY_LOCATIONS: &[&str] = &["/usr/local/bin/claude"];

/// Settings for the external assistant subprocess.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct AssistantConfig {
    /// Path to the assistant binary; empty means auto-detect.
    pub binary_path: String,
    /// Arguments inserted before the prompt on every invocation.
    pub extra_args: Vec<String>,
    /// Ceiling compared against the session registry before each launch.
    pub max_concurrent_sessions: usize,
    /// Record in-flight handles in the registry so the ceiling is enforced.
    ///
    /// Off by default: launched handles are never registered and the
    /// ceiling check always sees an empty registry.
    pub track_sessions: bool,
    /// Deadline applied to each subprocess invocation.
    pub streaming_timeout_seconds: u64,
    /// Surface deadline expiry to the caller instead of truncating silently.
    pub report_timeouts: bool,
    /// Upper bound for the `--version` probe.
    pub version_probe_timeout_seconds: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            binary_path: String::new(),
            extra_args: Vec::new(),
            max_concurrent_sessions: 10,
            track_sessions: false,
            streaming_timeout_seconds: 300,
            report_timeouts: false,
            version_probe_timeout_seconds: 10,
        }
    }
}

impl AssistantConfig {
    /// Per-invocation deadline as a [`Duration`].
    #[must_use]
    pub fn streaming_timeout(&self) -> Duration {
        Duration::from_secs(self.streaming_timeout_seconds)
    }

    /// Version probe bound as a [`Duration`].
    #[must_use]
    pub fn version_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.version_probe_timeout_seconds)
    }
}

/// API-key authentication settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct AuthConfig {
    /// Reject requests without a valid bearer key.
    pub require_auth: bool,
    /// Accepted keys. Extended at runtime from [`API_KEYS_ENV`].
    pub api_keys: Vec<String>,
}

/// Cross-origin settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct CorsConfig {
    /// Allowed `Origin` values; `*` allows any.
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    /// Whether a `*` entry opens the policy to every origin.
    #[must_use]
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".into()],
        }
    }
}

/// One entry of the static model catalog served under `/v1/models`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ModelEntry {
    /// Model identifier passed through to `--model`.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
}

impl ModelEntry {
    fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
        }
    }
}

fn default_models() -> Vec<ModelEntry> {
    vec![
        ModelEntry::new(
            "claude-opus-4-20250514",
            "Claude Opus 4",
            "Most capable model for complex coding tasks",
        ),
        ModelEntry::new(
            "claude-sonnet-4-20250514",
            "Claude Sonnet 4",
            "Balanced model for everyday coding work",
        ),
        ModelEntry::new(
            "claude-3-5-sonnet-20241022",
            "Claude 3.5 Sonnet",
            "Previous generation balanced model",
        ),
        ModelEntry::new(
            "claude-3-5-haiku-20241022",
            "Claude 3.5 Haiku",
            "Fast model for lightweight tasks",
        ),
    ]
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8000
}

fn default_model() -> String {
    "claude-3-5-sonnet-20241022".into()
}

fn default_project_root() -> PathBuf {
    PathBuf::from("/tmp/claude_projects")
}

fn default_log_level() -> String {
    "info".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Interface the HTTP server binds to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the HTTP server binds to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Model used when a request leaves `model` empty.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Parent directory of every per-project working directory.
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    /// Fallback log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Assistant subprocess settings.
    #[serde(default)]
    pub assistant: AssistantConfig,
    /// API-key authentication.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Cross-origin policy.
    #[serde(default)]
    pub cors: CorsConfig,
    /// Static model catalog.
    #[serde(default = "default_models")]
    pub models: Vec<ModelEntry>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            default_model: default_model(),
            project_root: default_project_root(),
            log_level: default_log_level(),
            assistant: AssistantConfig::default(),
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            models: default_models(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and resolve the assistant binary.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Merge API keys from the [`API_KEYS_ENV`] environment variable.
    ///
    /// Keys are comma-separated; blanks and duplicates are ignored.
    pub fn load_api_keys_from_env(&mut self) {
        let Ok(raw) = env::var(API_KEYS_ENV) else {
            return;
        };
        for key in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            if !self.auth.api_keys.iter().any(|existing| existing == key) {
                self.auth.api_keys.push(key.to_owned());
            }
        }
        if self.auth.require_auth && self.auth.api_keys.is_empty() {
            warn!("require_auth is enabled but no API keys are configured");
        }
    }

    /// `host:port` string the server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Working directory for the given project identifier.
    #[must_use]
    pub fn project_path(&self, project_id: &str) -> PathBuf {
        self.project_root.join(project_id)
    }

    /// Check whether `key` is one of the configured API keys.
    #[must_use]
    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.auth.api_keys.iter().any(|k| k == key)
    }


    fn validate(&mut self) -> Result<()> {
        if self.assistant.max_concurrent_sessions == 0 {
            return Err(AppError::Config(
                "assistant.max_concurrent_sessions must be greater than zero".into(),
            ));
        }

        if self.assistant.streaming_timeout_seconds == 0 {
            return Err(AppError::Config(
                "assistant.streaming_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.project_root.as_os_str().is_empty() {
            return Err(AppError::Config("project_root must not be empty".into()));
        }

        if self.assistant.binary_path.trim().is_empty() {
            self.assistant.binary_path = find_assistant_binary();
            debug!(binary = %self.assistant.binary_path, "auto-detected assistant binary");
        }

        Ok(())
    }
}

/// Locate the assistant binary.
///
/// Searches `PATH` first, then [`FALLBACK_BINARY_LOCATIONS`], and finally
/// returns the bare binary name so the OS resolves it at spawn time.
#[must_use]
pub fn find_assistant_binary() -> String {
    if let Some(paths) = env::var_os("PATH") {
        if let Some(found) = env::split_paths(&paths)
            .map(|dir| dir.join(DEFAULT_BINARY_NAME))
            .find(|candidate| candidate.is_file())
        {
            return found.to_string_lossy().into_owned();
        }
    }

    FALLBACK_BINARY_LOCATIONS
        .iter()
        .find(|loc| Path::new(loc).is_file())
        .map_or_else(|| DEFAULT_BINARY_NAME.to_owned(), |loc| (*loc).to_owned())
}
