#![forbid(unsafe_code)]

//! OpenAI-compatible chat-completions gateway in front of the Claude CLI.
//!
//! Each request launches one assistant process, reads its newline-delimited
//! JSON events, and answers either as a stream of SSE chunks or as one
//! aggregated completion.

pub mod api;
pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod process;
pub mod stream;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
