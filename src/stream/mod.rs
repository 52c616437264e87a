//! Conversion of assistant events into OpenAI wire output.
//!
//! - `converter`: per-response chunk factory and the text extraction rules.
//! - `assembler`: incremental (SSE) and buffered consumption of a handle.
//! - `sse`: `data:` framing and the `[DONE]` sentinel.

pub mod assembler;
pub mod converter;
pub mod sse;
