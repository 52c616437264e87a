//! NDJSON codec for assistant output streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so a
//! runaway line from the assistant cannot exhaust memory.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use claude_code_gateway::process::codec::EventLineCodec;
//!
//! let lines = FramedRead::new(child_stdout, EventLineCodec::new());
//! ```

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum line length accepted from the assistant: 10 MiB.
///
/// Tool results embedded in `stream-json` lines can be large, so the cap is
/// generous. Longer lines are reported as [`AppError::Decode`] and skipped.
pub const MAX_LINE_BYTES: usize = 10 * 1_048_576;

/// Line framing for the assistant's `stream-json` output.
///
/// Inbound lines longer than [`MAX_LINE_BYTES`] return
/// [`AppError::Decode`]`("line too long: …")`; I/O errors map to
/// [`AppError::Io`].
#[derive(Debug)]
pub struct EventLineCodec(LinesCodec);

impl EventLineCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_length))
    }
}

impl Default for EventLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EventLineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Decode("line too long: exceeded line limit".into())
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
