//! Agent stdout stream handling: NDJSON framing, record decoding, and the
//! ordered subprocess runner.

pub mod codec;
pub mod reader;
pub mod record;
