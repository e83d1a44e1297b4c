//! Tool presentation: pure classification and formatting helpers.
//!
//! Turns a tool invocation's name and arguments into display information
//! for the start notification, and a tool result into display content and
//! raw output text for the completion notification. Everything here is a
//! pure function of its inputs — no session state, no I/O.

use serde_json::Value;

use crate::protocol::{ContentItem, ToolKind, ToolLocation};

/// Derived display information for a tool invocation at start time.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInfo {
    /// Human-readable title.
    pub title: String,
    /// Display classification.
    pub kind: ToolKind,
    /// Initial display content items.
    pub content: Vec<ContentItem>,
    /// Touched file locations, when derivable from the arguments.
    pub locations: Option<Vec<ToolLocation>>,
}

/// Derived display information for a tool completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionView {
    /// Display content items.
    pub content: Vec<ContentItem>,
    /// Raw extracted output text (unprefixed).
    pub raw_output: Option<String>,
    /// Exit-code/signal-prefixed output for shell tools, when it differs
    /// from the raw text. Attached as display metadata only.
    pub display_output: Option<String>,
}

/// Classify a tool invocation by normalized name and build its start-time
/// display information.
#[must_use]
pub fn tool_info(normalized_name: &str, args: &Value) -> ToolInfo {
    let path = str_field(args, "path");

    match normalized_name {
        "shell" => ToolInfo {
            title: str_field(args, "command")
                .map_or_else(|| "Shell".to_owned(), |cmd| format!("`{cmd}`")),
            kind: ToolKind::Execute,
            content: Vec::new(),
            locations: None,
        },
        "read" => ToolInfo {
            title: path
                .as_deref()
                .map_or_else(|| "Read".to_owned(), |p| format!("Read {p}")),
            kind: ToolKind::Read,
            content: Vec::new(),
            locations: path.map(|p| {
                vec![ToolLocation {
                    path: p,
                    line: Some(0),
                }]
            }),
        },
        "edit" => ToolInfo {
            title: path
                .as_deref()
                .map_or_else(|| "Edit".to_owned(), |p| format!("Edit {p}")),
            kind: ToolKind::Edit,
            content: edit_start_content(args),
            locations: path.map(|p| vec![ToolLocation { path: p, line: None }]),
        },
        "write" => ToolInfo {
            title: path
                .as_deref()
                .map_or_else(|| "Write".to_owned(), |p| format!("Write {p}")),
            kind: ToolKind::Edit,
            content: write_start_content(args),
            locations: path.map(|p| vec![ToolLocation { path: p, line: None }]),
        },
        "updateTodos" => ToolInfo {
            title: "Update TODOs".to_owned(),
            kind: ToolKind::Think,
            content: Vec::new(),
            locations: None,
        },
        other => ToolInfo {
            title: if other.is_empty() {
                "Tool".to_owned()
            } else {
                other.to_owned()
            },
            kind: ToolKind::Other,
            content: Vec::new(),
            locations: None,
        },
    }
}

/// Whether a tool result indicates explicit rejection.
///
/// A result is rejected iff it is an object containing a nested `rejected`
/// object — the mere presence of an `error` field is not a rejection.
#[must_use]
pub fn is_rejected(result: &Value) -> bool {
    result
        .get("rejected")
        .is_some_and(serde_json::Value::is_object)
}

/// Build completion display content and output text for a finished tool.
///
/// Edit/write results with full-file snapshots become structured diffs; a
/// prebuilt `diff` string becomes fenced text. Everything else goes through
/// generic extraction ([`extract_result_text`]), falling back to a
/// pretty-printed dump of the whole result object. Shell results carry an
/// additional exit-code/signal-prefixed display variant.
#[must_use]
pub fn completion_view(normalized_name: &str, args: &Value, result: Option<&Value>) -> CompletionView {
    let Some(result) = result else {
        return CompletionView::default();
    };

    if matches!(normalized_name, "edit" | "write") {
        if let Some(content) = edit_completion_content(args, result) {
            return CompletionView {
                content,
                raw_output: None,
                display_output: None,
            };
        }
    }

    let raw = extract_result_text(result)
        .unwrap_or_else(|| serde_json::to_string_pretty(result).unwrap_or_default());

    let display_output = if normalized_name == "shell" {
        shell_summary(result).map(|summary| format!("{summary}\n{raw}"))
    } else {
        None
    };

    CompletionView {
        content: vec![ContentItem::Text { text: fenced(&raw) }],
        raw_output: Some(raw),
        display_output,
    }
}

/// Walk the result object for the first non-empty textual output.
///
/// Sub-objects are visited in priority order (`success`, `error`,
/// `rejected`); within each, candidate fields are tried in priority order:
/// interleaved output first, then stdout+stderr (joined with a newline when
/// both are present), then the generic content-carrying fields. Arrays of
/// strings or `{text}` objects are joined line-wise.
#[must_use]
pub fn extract_result_text(result: &Value) -> Option<String> {
    for key in ["success", "error", "rejected"] {
        if let Some(container) = result.get(key).filter(|v| v.is_object()) {
            if let Some(text) = extract_from_container(container) {
                return Some(text);
            }
        }
    }
    None
}

/// Wrap `text` in a markdown code fence that cannot be escaped by backtick
/// runs already present in the text: the fence is strictly longer than the
/// longest run found, with a minimum of three backticks.
#[must_use]
pub fn fenced(text: &str) -> String {
    let longest_run = text
        .split(|c: char| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest_run.max(2) + 1);
    let body = text.strip_suffix('\n').unwrap_or(text);
    format!("{fence}\n{body}\n{fence}")
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Non-empty string field lookup.
fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Start-time diff content for the edit tool, when its arguments carry one.
fn edit_start_content(args: &Value) -> Vec<ContentItem> {
    let Some(new_text) = str_field(args, "newText") else {
        return Vec::new();
    };
    vec![ContentItem::Diff {
        path: str_field(args, "path").unwrap_or_default(),
        old_text: args
            .get("oldText")
            .and_then(Value::as_str)
            .map(str::to_owned),
        new_text,
    }]
}

/// Start-time diff content for the write tool: full new content, no old text.
fn write_start_content(args: &Value) -> Vec<ContentItem> {
    let Some(content) = args.get("content").and_then(Value::as_str) else {
        return Vec::new();
    };
    vec![ContentItem::Diff {
        path: str_field(args, "path").unwrap_or_default(),
        old_text: None,
        new_text: content.to_owned(),
    }]
}

/// Completion content for edit/write results: prefer before/after full-file
/// snapshots as a structured diff, then a prebuilt diff string as fenced
/// text. Snapshots are looked up in the `success` sub-object first, then at
/// the result root.
fn edit_completion_content(args: &Value, result: &Value) -> Option<Vec<ContentItem>> {
    let path = str_field(args, "path").unwrap_or_default();

    for container in [result.get("success").unwrap_or(&Value::Null), result] {
        let old_text = container.get("oldText").and_then(Value::as_str);
        let new_text = container.get("newText").and_then(Value::as_str);
        if let (Some(old), Some(new)) = (old_text, new_text) {
            return Some(vec![ContentItem::Diff {
                path: path.clone(),
                old_text: Some(old.to_owned()),
                new_text: new.to_owned(),
            }]);
        }

        if let Some(diff) = container
            .get("diff")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
        {
            return Some(vec![ContentItem::Text { text: fenced(diff) }]);
        }
    }

    None
}

/// First non-empty textual output within one result sub-object.
fn extract_from_container(container: &Value) -> Option<String> {
    if let Some(text) = field_text(container, "interleavedOutput") {
        return Some(text);
    }

    let stdout = field_text(container, "stdout");
    let stderr = field_text(container, "stderr");
    match (stdout, stderr) {
        (Some(out), Some(err)) => return Some(format!("{out}\n{err}")),
        (Some(out), None) => return Some(out),
        (None, Some(err)) => return Some(err),
        (None, None) => {}
    }

    for key in ["content", "text", "output", "message", "result", "lines"] {
        if let Some(text) = field_text(container, key) {
            return Some(text);
        }
    }

    None
}

/// Textual value of one field: a non-empty string, or an array of strings /
/// `{text}` objects joined with newlines.
fn field_text(container: &Value, key: &str) -> Option<String> {
    match container.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    other => other
                        .get("text")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                })
                .collect::<Vec<_>>()
                .join("\n");
            if joined.is_empty() {
                None
            } else {
                Some(joined)
            }
        }
        _ => None,
    }
}

/// Exit-code/signal summary line for shell completions, when present.
fn shell_summary(result: &Value) -> Option<String> {
    let containers = [
        result,
        result.get("success").unwrap_or(&Value::Null),
        result.get("error").unwrap_or(&Value::Null),
        result.get("rejected").unwrap_or(&Value::Null),
    ];

    let exit_code = containers
        .iter()
        .find_map(|c| c.get("exitCode").and_then(Value::as_i64));
    let signal = containers
        .iter()
        .find_map(|c| c.get("signal").and_then(Value::as_str));

    let mut parts = Vec::new();
    if let Some(code) = exit_code {
        parts.push(format!("Exit code {code}"));
    }
    if let Some(sig) = signal {
        parts.push(format!("Signal {sig}"));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}
