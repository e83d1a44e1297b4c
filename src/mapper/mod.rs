//! Event mapper: stream records → protocol notifications.
//!
//! [`map_record`] is a pure function of one [`StreamRecord`] and the
//! per-session [`ToolUseCache`]. It produces zero or more
//! [`SessionUpdate`] notifications plus side-channel signals for the
//! orchestrator: a discovered backend session id, a mode echo, and a
//! rejected tool call. Terminal `result` records produce no notification —
//! they are the orchestrator's signal, not the client's.

pub mod presentation;

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::debug;

use crate::mapper::presentation::{completion_view, is_rejected, tool_info};
use crate::protocol::{
    PlanEntry, PlanEntryPriority, PlanEntryStatus, SessionUpdate, ToolCallStatus,
};
use crate::stream::record::{StreamRecord, ToolPayload};

/// One open tool call awaiting completion.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Sanitized call identifier used as the notification key.
    pub tool_call_id: String,
    /// Payload captured at start time.
    pub payload: ToolPayload,
}

/// Per-session cache of open tool calls, keyed by sanitized call id.
///
/// A given call id has at most one open entry at a time: `started` inserts,
/// the matching `completed` removes — even when the start was missed and
/// the entry had to be synthesized from the completion payload.
#[derive(Debug, Default)]
pub struct ToolUseCache {
    entries: HashMap<String, CacheEntry>,
}

impl ToolUseCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache has no open entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry is open for `call_id`.
    #[must_use]
    pub fn contains(&self, call_id: &str) -> bool {
        self.entries.contains_key(call_id)
    }
}

/// A tool call whose execution was declined by the agent's environment.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedToolCall {
    /// Sanitized call identifier.
    pub tool_call_id: String,
    /// Title computed at tool-start classification.
    pub title: String,
    /// Raw tool arguments.
    pub raw_input: Value,
}

/// Output of mapping one stream record.
#[derive(Debug, Default)]
pub struct MapperOutput {
    /// Notifications to forward to the client, in order.
    pub notifications: Vec<SessionUpdate>,
    /// Backend session id discovered from a `system/init` record.
    pub backend_session_id: Option<String>,
    /// Permission-mode string echoed by the agent, unparsed.
    pub current_mode_id: Option<String>,
    /// Rejected tool call surfaced by a `completed` record.
    pub rejected_tool_call: Option<RejectedToolCall>,
}

/// Translate one stream record into protocol notifications and signals.
#[must_use]
pub fn map_record(record: &StreamRecord, cache: &mut ToolUseCache) -> MapperOutput {
    let mut output = MapperOutput::default();

    match record {
        StreamRecord::Init {
            backend_session_id,
            permission_mode,
        } => {
            output.backend_session_id = Some(backend_session_id.clone());
            output.current_mode_id.clone_from(permission_mode);
        }

        StreamRecord::ThinkingDelta { text } => {
            if !text.is_empty() {
                output
                    .notifications
                    .push(SessionUpdate::AgentThoughtChunk { text: text.clone() });
            }
        }

        StreamRecord::Assistant { segments } => {
            for segment in segments {
                output
                    .notifications
                    .push(SessionUpdate::AgentMessageChunk {
                        text: segment.clone(),
                    });
            }
        }

        StreamRecord::ToolStarted { call_id, payload } => {
            map_tool_started(call_id, payload, cache, &mut output);
        }

        StreamRecord::ToolCompleted { call_id, payload } => {
            map_tool_completed(call_id, payload, cache, &mut output);
        }

        StreamRecord::Result(_) | StreamRecord::Unknown => {}
    }

    output
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Handle a `tool_call/started` record: report the pending call and cache it.
fn map_tool_started(
    call_id: &str,
    payload: &ToolPayload,
    cache: &mut ToolUseCache,
    output: &mut MapperOutput,
) {
    let info = tool_info(payload.normalized_name(), &payload.args);

    output.notifications.push(SessionUpdate::ToolCall {
        tool_call_id: call_id.to_owned(),
        status: ToolCallStatus::Pending,
        title: info.title,
        kind: info.kind,
        raw_input: payload.args.clone(),
        content: info.content,
        locations: info.locations,
        meta: Some(json!({
            "toolName": payload.raw_name.clone(),
            "rawInput": payload.args.clone(),
        })),
    });

    let previous = cache.entries.insert(
        call_id.to_owned(),
        CacheEntry {
            tool_call_id: call_id.to_owned(),
            payload: payload.clone(),
        },
    );
    if previous.is_some() {
        debug!(call_id, "tool call started twice without completion");
    }
}

/// Handle a `tool_call/completed` record: resolve the cached entry (or
/// synthesize one from the completion payload), classify the result, and
/// report the terminal update. The todo tool additionally emits a plan
/// notification.
fn map_tool_completed(
    call_id: &str,
    payload: &ToolPayload,
    cache: &mut ToolUseCache,
    output: &mut MapperOutput,
) {
    let entry = cache.entries.remove(call_id).unwrap_or_else(|| {
        debug!(call_id, "tool completion without a cached start, synthesizing");
        CacheEntry {
            tool_call_id: call_id.to_owned(),
            payload: payload.clone(),
        }
    });

    let info = tool_info(entry.payload.normalized_name(), &entry.payload.args);
    let rejected = payload.result.as_ref().is_some_and(is_rejected);

    let view = completion_view(
        payload.normalized_name(),
        &payload.args,
        payload.result.as_ref(),
    );

    output.notifications.push(SessionUpdate::ToolCallUpdate {
        tool_call_id: entry.tool_call_id.clone(),
        status: if rejected {
            ToolCallStatus::Failed
        } else {
            ToolCallStatus::Completed
        },
        raw_output: view.raw_output.map(Value::String),
        content: if view.content.is_empty() {
            None
        } else {
            Some(view.content)
        },
        meta: view
            .display_output
            .map(|display| json!({ "displayOutput": display })),
    });

    if payload.normalized_name() == "updateTodos" {
        output.notifications.push(SessionUpdate::Plan {
            entries: todo_plan_entries(&payload.args),
        });
    }

    if rejected {
        output.rejected_tool_call = Some(RejectedToolCall {
            tool_call_id: entry.tool_call_id,
            title: info.title,
            raw_input: entry.payload.args,
        });
    }
}

/// Translate the todo tool's argument list into plan entries.
fn todo_plan_entries(args: &Value) -> Vec<PlanEntry> {
    args.get("todos")
        .and_then(Value::as_array)
        .map(|todos| {
            todos
                .iter()
                .map(|todo| PlanEntry {
                    content: todo
                        .get("content")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                    status: todo_status(
                        todo.get("status").and_then(Value::as_str).unwrap_or(""),
                    ),
                    priority: PlanEntryPriority::Medium,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Map the agent's todo status strings onto plan-entry statuses. Anything
/// unrecognized is treated as pending.
fn todo_status(raw: &str) -> PlanEntryStatus {
    match raw {
        "TODO_STATUS_COMPLETED" | "completed" => PlanEntryStatus::Completed,
        "TODO_STATUS_IN_PROGRESS" | "in_progress" => PlanEntryStatus::InProgress,
        _ => PlanEntryStatus::Pending,
    }
}
