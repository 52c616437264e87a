#![forbid(unsafe_code)]

//! `claude-code-gateway`: OpenAI-compatible HTTP gateway binary.
//!
//! Loads configuration, verifies the assistant CLI is available, and serves
//! the HTTP API until SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use claude_code_gateway::api::{self, AppState};
use claude_code_gateway::config::GlobalConfig;
use claude_code_gateway::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "claude-code-gateway", about = "OpenAI-compatible gateway for the Claude CLI", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen host.
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let config = load_config(&args)?;
    init_tracing(args.log_format, &config.log_level)?;
    info!("claude-code-gateway bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(config))
}

fn load_config(args: &Cli) -> Result<GlobalConfig> {
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::from_toml_str("")?,
    };

    if let Some(host) = &args.host {
        config.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.load_api_keys_from_env();
    Ok(config)
}

async fn run(config: GlobalConfig) -> Result<()> {
    std::fs::create_dir_all(&config.project_root).map_err(|err| {
        AppError::Config(format!(
            "cannot create project root {}: {err}",
            config.project_root.display()
        ))
    })?;
    info!(
        project_root = %config.project_root.display(),
        binary = %config.assistant.binary_path,
        "configuration loaded"
    );

    let state = Arc::new(AppState::new(config));

    // ── Verify the assistant is available ───────────────
    let claude_version = state.registry.version().await.map_err(|err| {
        error!(%err, "assistant CLI not available");
        err
    })?;
    info!(%claude_version, "assistant CLI available");

    // ── Start HTTP server ───────────────────────────────
    let ct = CancellationToken::new();
    let mut server_handle = tokio::spawn(api::serve(Arc::clone(&state), ct.clone()));

    // ── Wait for shutdown signal or server exit ─────────
    let served = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            ct.cancel();
            (&mut server_handle).await
        }
        served = &mut server_handle => served,
    };
    state.registry.cleanup_all();

    match served {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!(%err, "HTTP server failed");
            return Err(err);
        }
        Err(err) => error!(%err, "HTTP server task panicked"),
    }
    info!("claude-code-gateway shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = ctrl_c => {
                        if let Err(err) = result {
                            tracing::error!(%err, "ctrl-c signal handler failed");
                        }
                    }
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                if let Err(err) = ctrl_c.await {
                    tracing::error!(%err, "ctrl-c signal handler failed");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat, default_level: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
