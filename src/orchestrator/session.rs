//! Session state and permission modes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Operational permission policy applied to prompt execution.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionMode {
    /// Standard policy: the agent's environment may reject tool calls,
    /// and rejections solicit interactive confirmation.
    #[default]
    Default,
    /// Edits are pre-authorized; other rejections solicit confirmation.
    AcceptEdits,
    /// All permission checks bypassed (`--force`).
    Bypass,
    /// Plan-only execution (`--mode plan`).
    Plan,
    /// Ask-before-acting execution (`--mode ask`).
    Ask,
}

impl PermissionMode {
    /// All modes, in display order.
    pub const ALL: [Self; 5] = [
        Self::Default,
        Self::AcceptEdits,
        Self::Bypass,
        Self::Plan,
        Self::Ask,
    ];

    /// Stable identifier used in the client protocol.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "accept-edits",
            Self::Bypass => "bypass",
            Self::Plan => "plan",
            Self::Ask => "ask",
        }
    }

    /// Parse a mode identifier, tolerating the spelling variants agents
    /// echo (`acceptEdits`, `accept_edits`, `bypassPermissions`, …).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "default" => Some(Self::Default),
            "accept-edits" | "acceptEdits" | "accept_edits" => Some(Self::AcceptEdits),
            "bypass" | "bypassPermissions" | "bypass_permissions" => Some(Self::Bypass),
            "plan" => Some(Self::Plan),
            "ask" => Some(Self::Ask),
            _ => None,
        }
    }

    /// CLI flags this mode contributes to the agent invocation: plan/ask
    /// pass a mode flag, bypass passes the force flag, default and
    /// accept-edits pass nothing.
    #[must_use]
    pub fn cli_flags(self) -> Vec<String> {
        match self {
            Self::Default | Self::AcceptEdits => Vec::new(),
            Self::Bypass => vec!["--force".to_owned()],
            Self::Plan => vec!["--mode".to_owned(), "plan".to_owned()],
            Self::Ask => vec!["--mode".to_owned(), "ask".to_owned()],
        }
    }

    /// Whether a rejected tool call in this mode solicits interactive
    /// confirmation from the client.
    #[must_use]
    pub fn solicits_confirmation(self) -> bool {
        matches!(self, Self::Default | Self::AcceptEdits)
    }
}

/// Per-session mutable state owned by the orchestrator.
#[derive(Debug)]
pub struct SessionState {
    /// Adapter-side session identifier.
    pub session_id: String,
    /// Workspace directory for agent runs.
    pub cwd: PathBuf,
    /// The agent's own conversation handle, once known.
    pub backend_session_id: Option<String>,
    /// Current permission mode.
    pub mode: PermissionMode,
    /// Model override, when the client selected one.
    pub model_id: Option<String>,
    /// Whether the current prompt was cancelled.
    pub cancelled: bool,
    /// Cancel handle of the active run, when a prompt is in flight.
    pub active_run: Option<CancellationToken>,
}

impl SessionState {
    /// Create a fresh session.
    #[must_use]
    pub fn new(session_id: String, cwd: PathBuf, mode: PermissionMode) -> Self {
        Self {
            session_id,
            cwd,
            backend_session_id: None,
            mode,
            model_id: None,
            cancelled: false,
            active_run: None,
        }
    }

    /// Begin a prompt turn: clear the cancelled flag and install a fresh
    /// cancel handle for the run. At most one run may be active; callers
    /// must check [`Self::active_run`] before starting another.
    pub fn begin_prompt(&mut self) -> CancellationToken {
        self.cancelled = false;
        let token = CancellationToken::new();
        self.active_run = Some(token.clone());
        token
    }

    /// Finish the prompt turn, releasing the active-run handle.
    pub fn finish_prompt(&mut self) {
        self.active_run = None;
    }

    /// Cancel the current prompt: sets the cancelled flag and fires the
    /// active run's cancel handle, if any.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        if let Some(token) = &self.active_run {
            token.cancel();
        }
    }
}
