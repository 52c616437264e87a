//! Assistant subprocess management.
//!
//! Each chat request runs one assistant process. The process writes
//! `stream-json` lines to stdout; a parser task decodes them into
//! [`Event`](crate::models::event::Event)s and hands them to the response
//! assembler through a bounded queue.
//!
//! Submodules:
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based line framing.
//! - `reader`: line decoding and the parser task.
//! - `handle`: process launch, the handle type, and its background tasks.

pub mod codec;
pub mod handle;
pub mod reader;
