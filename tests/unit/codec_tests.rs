//! Unit tests for the NDJSON stream codec.
//!
//! Covers:
//! - single record per line decodes without the trailing newline
//! - several records in one buffer decode as separate items
//! - a record split across buffer extensions is held until its newline
//! - `\r\n` framing is tolerated (the `\r` is trimmed)
//! - `decode_eof` flushes an unterminated tail as a final line
//! - lines beyond the maximum length return an error

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use agent_conduit::stream::codec::{StreamCodec, MAX_LINE_BYTES};
use agent_conduit::AppError;

// ── Single record per line ───────────────────────────────────────────────────

#[test]
fn single_record_decodes_without_newline() {
    let mut codec = StreamCodec::new();
    let mut buf = BytesMut::from("{\"type\":\"result\",\"subtype\":\"success\"}\n");

    let decoded = codec.decode(&mut buf).expect("decode must succeed");

    assert_eq!(
        decoded,
        Some("{\"type\":\"result\",\"subtype\":\"success\"}".to_owned()),
        "codec must return the line content without the trailing newline"
    );
}

// ── Batched records ──────────────────────────────────────────────────────────

#[test]
fn batched_records_decode_separately() {
    let mut codec = StreamCodec::new();
    let raw = concat!(
        "{\"type\":\"thinking\",\"subtype\":\"delta\",\"text\":\"a\"}\n",
        "{\"type\":\"result\",\"subtype\":\"success\"}\n",
    );
    let mut buf = BytesMut::from(raw);

    let first = codec.decode(&mut buf).expect("first decode must succeed");
    assert!(first.is_some(), "first line must be decoded");

    let second = codec.decode(&mut buf).expect("second decode must succeed");
    assert!(second.is_some(), "second line must be decoded");

    let third = codec.decode(&mut buf).expect("empty buffer must not error");
    assert!(third.is_none(), "no further lines must be present");
}

// ── Partial delivery ─────────────────────────────────────────────────────────

#[test]
fn split_record_is_buffered_until_newline() {
    let mut codec = StreamCodec::new();

    let mut buf = BytesMut::from("{\"type\":\"assist");
    let decoded = codec.decode(&mut buf).expect("partial decode must not error");
    assert!(
        decoded.is_none(),
        "partial line must not be emitted before its newline arrives"
    );

    buf.extend_from_slice(b"ant\"}\n");
    let decoded = codec.decode(&mut buf).expect("decode must succeed after newline");
    assert_eq!(decoded, Some("{\"type\":\"assistant\"}".to_owned()));
}

// ── Carriage-return tolerance ────────────────────────────────────────────────

#[test]
fn carriage_return_is_trimmed() {
    let mut codec = StreamCodec::new();
    let mut buf = BytesMut::from("{\"type\":\"result\"}\r\n");

    let decoded = codec.decode(&mut buf).expect("decode must succeed");

    assert_eq!(
        decoded,
        Some("{\"type\":\"result\"}".to_owned()),
        "a preceding \\r must be trimmed from the decoded line"
    );
}

// ── EOF flush ────────────────────────────────────────────────────────────────

#[test]
fn decode_eof_flushes_unterminated_tail() {
    let mut codec = StreamCodec::new();
    let mut buf = BytesMut::from("{\"type\":\"result\",\"subtype\":\"success\"}");

    let decoded = codec
        .decode(&mut buf)
        .expect("decode must not error on an unterminated line");
    assert!(decoded.is_none(), "no newline yet, nothing to emit");

    let flushed = codec
        .decode_eof(&mut buf)
        .expect("decode_eof must flush the tail");
    assert_eq!(
        flushed,
        Some("{\"type\":\"result\",\"subtype\":\"success\"}".to_owned()),
        "the unterminated tail must be flushed as a final line at EOF"
    );
}

// ── Line length cap ──────────────────────────────────────────────────────────

#[test]
fn oversized_line_returns_error() {
    let mut codec = StreamCodec::new();
    let big_line = "a".repeat(MAX_LINE_BYTES + 1) + "\n";
    let mut buf = BytesMut::from(big_line.as_str());

    let result = codec.decode(&mut buf);

    match result {
        Err(AppError::Agent(msg)) => assert!(
            msg.contains("line too long"),
            "error must mention 'line too long', got: {msg}"
        ),
        other => panic!("expected Err(AppError::Agent), got: {other:?}"),
    }
}
