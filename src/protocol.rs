//! Client-facing session protocol model.
//!
//! Serde shapes for everything the adapter exchanges with its client:
//! prompt content blocks, session update notifications, tool-call
//! reporting, plan entries, and the permission round trip. The stdio
//! carrier for these shapes lives in [`crate::server`]; this module is
//! transport-agnostic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Prompt content ────────────────────────────────────────────────────────────

/// Embedded resource payload carried inside a [`ContentBlock::Resource`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedResource {
    /// Resource URI.
    pub uri: String,
    /// Inline text content, when the client embedded it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One segment of a structured user prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain prompt text.
    Text {
        /// The text content.
        text: String,
    },
    /// Image attachment. Rendered as a placeholder in the flat prompt.
    Image {},
    /// Audio attachment. Rendered as a placeholder in the flat prompt.
    Audio {},
    /// Mention of a resource by link.
    ResourceLink {
        /// Display name of the resource.
        name: String,
        /// Resource URI.
        uri: String,
    },
    /// Resource mention with optional embedded content.
    Resource {
        /// The embedded resource payload.
        resource: EmbeddedResource,
    },
}

/// Flatten a structured prompt into the single text argument passed to the
/// agent binary.
///
/// Text segments are concatenated in order. Resource links and resource
/// mentions are rendered inline as `@name (uri)`; any resource carrying
/// embedded text additionally contributes a trailing
/// `<context uri="…">…</context>` block. Image and audio segments become
/// `[image]` / `[audio]` placeholders.
#[must_use]
pub fn flatten_prompt(blocks: &[ContentBlock]) -> String {
    let mut text = String::new();
    let mut contexts: Vec<(String, String)> = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => text.push_str(t),
            ContentBlock::Image {} => text.push_str("[image]"),
            ContentBlock::Audio {} => text.push_str("[audio]"),
            ContentBlock::ResourceLink { name, uri } => {
                text.push_str(&format!("@{name} ({uri})"));
            }
            ContentBlock::Resource { resource } => {
                text.push_str(&format!("@{uri} ({uri})", uri = resource.uri));
                if let Some(body) = &resource.text {
                    contexts.push((resource.uri.clone(), body.clone()));
                }
            }
        }
    }

    for (uri, body) in contexts {
        text.push_str(&format!("\n\n<context uri=\"{uri}\">\n{body}\n</context>"));
    }

    text
}

// ── Tool-call reporting ───────────────────────────────────────────────────────

/// Classification of a tool invocation for client display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Reads files or other data.
    Read,
    /// Edits or writes files.
    Edit,
    /// Executes a command.
    Execute,
    /// Planning / reasoning bookkeeping.
    Think,
    /// Anything unrecognized.
    Other,
}

/// Lifecycle status of a reported tool call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Reported at start; execution not yet finished.
    Pending,
    /// Finished successfully.
    Completed,
    /// Finished but the execution was rejected or failed.
    Failed,
}

/// One display content item attached to a tool call notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    /// Opaque markdown text block (already fenced where needed).
    Text {
        /// The text content.
        text: String,
    },
    /// Structured file diff.
    #[serde(rename_all = "camelCase")]
    Diff {
        /// File path the diff applies to.
        path: String,
        /// Full previous content, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_text: Option<String>,
        /// Full new content.
        new_text: String,
    },
}

/// A file location a tool call touches, for client navigation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolLocation {
    /// File path.
    pub path: String,
    /// Optional line anchor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

// ── Plan reporting ────────────────────────────────────────────────────────────

/// Status of one plan entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanEntryStatus {
    /// Not started.
    Pending,
    /// Currently being worked on.
    InProgress,
    /// Done.
    Completed,
}

/// Priority of one plan entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanEntryPriority {
    /// Low priority.
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
}

/// One item of the agent's surfaced task list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanEntry {
    /// Human-readable task description.
    pub content: String,
    /// Current status.
    pub status: PlanEntryStatus,
    /// Display priority.
    pub priority: PlanEntryPriority,
}

// ── Session updates ───────────────────────────────────────────────────────────

/// One `session/update` notification payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "sessionUpdate", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// Incremental reasoning text from the agent.
    AgentThoughtChunk {
        /// The thought text.
        text: String,
    },
    /// Incremental response text from the agent.
    AgentMessageChunk {
        /// The message text.
        text: String,
    },
    /// A tool call was started.
    #[serde(rename_all = "camelCase")]
    ToolCall {
        /// Sanitized call identifier.
        tool_call_id: String,
        /// Lifecycle status — always [`ToolCallStatus::Pending`] at start.
        status: ToolCallStatus,
        /// Human-readable title.
        title: String,
        /// Display classification.
        kind: ToolKind,
        /// Raw tool arguments, passed through for the client.
        raw_input: Value,
        /// Display content items.
        content: Vec<ContentItem>,
        /// Touched file locations, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        locations: Option<Vec<ToolLocation>>,
        /// Auxiliary metadata (raw tool name and arguments).
        #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
        meta: Option<Value>,
    },
    /// A previously reported tool call finished.
    #[serde(rename_all = "camelCase")]
    ToolCallUpdate {
        /// Sanitized call identifier.
        tool_call_id: String,
        /// Terminal status: completed or failed.
        status: ToolCallStatus,
        /// Raw extracted output text, when any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_output: Option<Value>,
        /// Display content items.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<Vec<ContentItem>>,
        /// Auxiliary metadata (e.g. exit-code-prefixed terminal output).
        #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
        meta: Option<Value>,
    },
    /// The agent's task list changed.
    Plan {
        /// Current plan entries, in order.
        entries: Vec<PlanEntry>,
    },
    /// The session's permission mode changed.
    #[serde(rename_all = "camelCase")]
    CurrentModeUpdate {
        /// New mode identifier.
        current_mode_id: String,
    },
}

// ── Permission round trip ─────────────────────────────────────────────────────

/// Client decision for a permission request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOutcome {
    /// Authorize this one tool call.
    AllowOnce,
    /// Authorize this call and all future calls (switch to bypass mode).
    AllowAlways,
    /// Decline re-authorization.
    Reject,
}

/// Permission request surfaced to the client for a rejected tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    /// Sanitized identifier of the rejected call.
    pub tool_call_id: String,
    /// Title computed at tool-start classification.
    pub title: String,
    /// Raw arguments of the rejected call.
    pub raw_input: Value,
}

// ── Prompt outcome ────────────────────────────────────────────────────────────

/// Terminal outcome of one prompt turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The agent finished normally.
    EndTurn,
    /// The agent hit its turn or budget limit.
    MaxTurns,
    /// The prompt was cancelled by the client.
    Cancelled,
}
