//! NDJSON codec for the agent's stdout stream.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a configurable maximum line
//! length to prevent memory exhaustion caused by unterminated or maliciously
//! large records from a misbehaving agent process. A trailing `\r` left by
//! `\r\n` framing is trimmed from every decoded line.
//!
//! # Usage
//!
//! Use [`StreamCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`] over the child's stdout. `decode_eof`
//! flushes an unterminated tail as a final line, so the last record of a
//! stream that ends without a newline is not lost.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum line length accepted by the stream codec: 8 MiB.
///
/// Lines exceeding this limit cause [`StreamCodec::decode`] to return
/// [`AppError::Agent`] with `"line too long"` rather than allocating
/// unbounded memory for a single record.
pub const MAX_LINE_BYTES: usize = 8 * 1_048_576;

/// NDJSON decoder for the agent's record stream.
///
/// Delegates line-framing to [`LinesCodec`] with a fixed
/// [`MAX_LINE_BYTES`] limit. Each newline-terminated (`\n`) UTF-8 string is
/// one complete stream record; a preceding `\r` is tolerated and removed.
#[derive(Debug)]
pub struct StreamCodec(LinesCodec);

impl StreamCodec {
    /// Create a new `StreamCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for StreamCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StreamCodec {
    type Item = String;
    type Error = AppError;

    /// Decode the next newline-terminated line from `src`.
    ///
    /// Returns `Ok(None)` when `src` contains no complete line yet
    /// (buffering). Returns `Err(AppError::Agent("line too long: …"))` when
    /// the line exceeds [`MAX_LINE_BYTES`].
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Ok(self.0.decode(src).map_err(map_codec_error)?.map(trim_cr))
    }

    /// Decode the final line when the stream reaches EOF.
    ///
    /// Delegates to [`LinesCodec::decode_eof`], which yields any buffered
    /// unterminated tail as a last line.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Ok(self
            .0
            .decode_eof(src)
            .map_err(map_codec_error)?
            .map(trim_cr))
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Remove a single trailing carriage return left by `\r\n` framing.
fn trim_cr(mut line: String) -> String {
    if line.ends_with('\r') {
        line.pop();
    }
    line
}

/// Map a [`LinesCodecError`] to an [`AppError`].
fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Agent(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
