//! Stream record model — one decoded line of agent stdout.
//!
//! The agent emits one JSON object per line. [`parse_record`] turns a line
//! into the [`StreamRecord`] tagged union. Dispatch is on the `type` /
//! `subtype` pair; any shape that is valid JSON but not a recognized record
//! decodes to [`StreamRecord::Unknown`] and is ignored downstream. A line
//! that is not valid JSON at all is a parse error — fatal to the whole run.
//!
//! # Known record shapes
//!
//! | `type` / `subtype`      | Maps to                           |
//! |-------------------------|-----------------------------------|
//! | `system` / `init`       | [`StreamRecord::Init`]            |
//! | `thinking` / `delta`    | [`StreamRecord::ThinkingDelta`]   |
//! | `assistant`             | [`StreamRecord::Assistant`]       |
//! | `tool_call` / `started` | [`StreamRecord::ToolStarted`]     |
//! | `tool_call` / `completed` | [`StreamRecord::ToolCompleted`] |
//! | `result`                | [`StreamRecord::Result`]          |
//! | *(any other)*           | [`StreamRecord::Unknown`]         |

use serde_json::Value;
use tracing::debug;

use crate::{AppError, Result};

/// Suffix stripped from raw tool names for display and classification.
pub const TOOL_NAME_SUFFIX: &str = "ToolCall";

/// Terminal `result` record fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    /// Result subtype, e.g. `success` or an error marker.
    pub subtype: String,
    /// Whether the agent flagged the turn as an error.
    pub is_error: bool,
    /// Free-text result message, when present.
    pub text: Option<String>,
}

/// Tool payload extracted from a `tool_call` record's single-key wrapper.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPayload {
    /// Raw tool name as it appeared on the wire (wrapper key).
    pub raw_name: String,
    /// Tool arguments.
    pub args: Value,
    /// Tool result, present on `completed` records.
    pub result: Option<Value>,
}

impl ToolPayload {
    /// Tool name with the [`TOOL_NAME_SUFFIX`] stripped, for display and
    /// classification. The raw name is retained for internal lookups.
    #[must_use]
    pub fn normalized_name(&self) -> &str {
        self.raw_name
            .strip_suffix(TOOL_NAME_SUFFIX)
            .unwrap_or(&self.raw_name)
    }
}

/// One decoded record of the agent's stdout stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRecord {
    /// Stream opened: carries the agent's own session handle and the
    /// permission mode it is running under.
    Init {
        /// The agent's backend session identifier.
        backend_session_id: String,
        /// Permission mode string echoed by the agent, when present.
        permission_mode: Option<String>,
    },
    /// Incremental reasoning text.
    ThinkingDelta {
        /// The delta text.
        text: String,
    },
    /// Assistant message; carries zero or more text segments.
    Assistant {
        /// Text segments in message order. Non-text segments are dropped.
        segments: Vec<String>,
    },
    /// A tool invocation started.
    ToolStarted {
        /// Sanitized call identifier.
        call_id: String,
        /// Tool name and arguments.
        payload: ToolPayload,
    },
    /// A tool invocation finished.
    ToolCompleted {
        /// Sanitized call identifier.
        call_id: String,
        /// Tool name, arguments, and result.
        payload: ToolPayload,
    },
    /// Terminal record for the turn.
    Result(ResultRecord),
    /// Valid JSON, but not a recognized record shape. Ignored.
    Unknown,
}

/// Sanitize a raw call identifier for use as a notification key.
///
/// Keeps ASCII alphanumerics, `-` and `_`; every other character is
/// replaced with `-`.
#[must_use]
pub fn sanitize_call_id(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Parse one stream line into a [`StreamRecord`].
///
/// # Errors
///
/// Returns [`AppError::Agent`] when the line is not valid JSON. A valid
/// JSON object with an unrecognized shape decodes to
/// [`StreamRecord::Unknown`] instead.
pub fn parse_record(line: &str) -> Result<StreamRecord> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| AppError::Agent(format!("malformed stream record: {e}")))?;

    let record_type = value.get("type").and_then(Value::as_str).unwrap_or("");
    let subtype = value.get("subtype").and_then(Value::as_str).unwrap_or("");

    let record = match (record_type, subtype) {
        ("system", "init") => parse_init(&value),
        ("thinking", "delta") => parse_thinking(&value),
        ("assistant", _) => parse_assistant(&value),
        ("tool_call", "started" | "completed") => parse_tool_call(&value, subtype),
        ("result", _) => StreamRecord::Result(ResultRecord {
            subtype: subtype.to_owned(),
            is_error: value
                .get("is_error")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            text: value
                .get("result")
                .and_then(Value::as_str)
                .map(str::to_owned),
        }),
        (other_type, other_subtype) => {
            debug!(
                record_type = other_type,
                subtype = other_subtype,
                "skipping unknown stream record shape"
            );
            StreamRecord::Unknown
        }
    };

    Ok(record)
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Parse a `system/init` record. Missing session id degrades to `Unknown`.
fn parse_init(value: &Value) -> StreamRecord {
    let Some(backend_session_id) = value.get("session_id").and_then(Value::as_str) else {
        debug!("system/init record without session_id, skipping");
        return StreamRecord::Unknown;
    };

    StreamRecord::Init {
        backend_session_id: backend_session_id.to_owned(),
        permission_mode: value
            .get("permission_mode")
            .and_then(Value::as_str)
            .map(str::to_owned),
    }
}

/// Parse a `thinking/delta` record.
fn parse_thinking(value: &Value) -> StreamRecord {
    let text = value
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default();
    StreamRecord::ThinkingDelta {
        text: text.to_owned(),
    }
}

/// Parse an `assistant` record, collecting text segments in order.
fn parse_assistant(value: &Value) -> StreamRecord {
    let segments = value
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    StreamRecord::Assistant { segments }
}

/// Parse a `tool_call` record: unwrap the single-key tool-name → payload
/// mapping. Records missing the id or wrapper degrade to `Unknown`.
fn parse_tool_call(value: &Value, subtype: &str) -> StreamRecord {
    let Some(raw_id) = value.get("id").and_then(Value::as_str) else {
        debug!(subtype, "tool_call record without id, skipping");
        return StreamRecord::Unknown;
    };

    let Some(wrapper) = value.get("tool_call").and_then(Value::as_object) else {
        debug!(subtype, "tool_call record without tool_call wrapper, skipping");
        return StreamRecord::Unknown;
    };

    let Some((raw_name, body)) = wrapper.iter().next() else {
        debug!(subtype, "tool_call wrapper is empty, skipping");
        return StreamRecord::Unknown;
    };

    let payload = ToolPayload {
        raw_name: raw_name.clone(),
        args: body.get("args").cloned().unwrap_or(Value::Null),
        result: body.get("result").cloned(),
    };

    let call_id = sanitize_call_id(raw_id);
    if subtype == "started" {
        StreamRecord::ToolStarted { call_id, payload }
    } else {
        StreamRecord::ToolCompleted { call_id, payload }
    }
}
