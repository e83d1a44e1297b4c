//! Auxiliary one-shot invocations of the agent binary.
//!
//! Besides the streaming prompt runs handled by [`crate::stream::reader`],
//! the agent binary is invoked in short-lived capture mode for model
//! listing, backend chat creation, and authentication. Output parsing is
//! deliberately conservative: unparseable model lines are skipped, and
//! unrecognized auth output is treated as not logged in.

use std::process::Stdio;
use std::sync::OnceLock;

use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::{AppError, Result};

/// One selectable agent model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    /// Model identifier passed back via `--model`.
    pub model_id: String,
    /// Human-readable model name.
    pub name: String,
    /// Whether the agent reports this model as currently selected.
    pub current: bool,
}

/// Authentication state reported by the agent binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    /// Authenticated as the named account.
    LoggedIn {
        /// Account name reported by the agent.
        account: String,
    },
    /// Not authenticated (or output was unrecognized).
    LoggedOut,
}

/// Handle for auxiliary invocations of a specific agent binary.
#[derive(Debug, Clone)]
pub struct AgentCli {
    program: String,
}

impl AgentCli {
    /// Create a handle for `program`.
    #[must_use]
    pub fn new(program: String) -> Self {
        Self { program }
    }

    /// List the models the agent offers via `--list-models`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Agent`] when the invocation itself fails.
    /// Unparseable output lines are skipped, so a malformed listing
    /// degrades to an empty result rather than an error.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let output = self.capture(&["--list-models"]).await?;
        Ok(parse_model_list(&output))
    }

    /// Create a new backend chat via `create-chat` and return its id.
    ///
    /// The id is the last non-empty trimmed line of the agent's output.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Agent`] when the invocation fails or produces
    /// no non-empty output line.
    pub async fn create_chat(&self) -> Result<String> {
        let output = self.capture(&["create-chat"]).await?;
        output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .next_back()
            .map(str::to_owned)
            .ok_or_else(|| AppError::Agent("create-chat produced no output".into()))
    }

    /// Query the authentication state via `status`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Auth`] when the invocation itself fails.
    pub async fn auth_status(&self) -> Result<AuthStatus> {
        let output = self
            .capture(&["status"])
            .await
            .map_err(|e| AppError::Auth(e.to_string()))?;
        Ok(scan_auth_output(&output))
    }

    /// Run the agent's `login` flow and return the resulting auth state.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Auth`] when the invocation itself fails.
    pub async fn login(&self) -> Result<AuthStatus> {
        let output = self
            .capture(&["login"])
            .await
            .map_err(|e| AppError::Auth(e.to_string()))?;
        Ok(scan_auth_output(&output))
    }

    /// Run the agent's `logout` flow and return the resulting auth state.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Auth`] when the invocation itself fails.
    pub async fn logout(&self) -> Result<AuthStatus> {
        let output = self
            .capture(&["logout"])
            .await
            .map_err(|e| AppError::Auth(e.to_string()))?;
        Ok(scan_auth_output(&output))
    }

    /// Run the agent with `args` and capture stdout + stderr as one string.
    async fn capture(&self, args: &[&str]) -> Result<String> {
        debug!(program = %self.program, ?args, "auxiliary agent invocation");

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| AppError::Agent(format!("failed to run agent {args:?}: {err}")))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        Ok(text)
    }
}

/// Parse `--list-models` output: one model per line, formatted as
/// `"<id> - <name>[ (current)]"`. Lines that do not match are skipped.
#[must_use]
pub fn parse_model_list(text: &str) -> Vec<ModelInfo> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        let re = Regex::new(r"^\s*(\S+)\s+-\s+(.*?)(\s+\(current\))?\s*$").unwrap();
        re
    });

    text.lines()
        .filter_map(|line| {
            let caps = re.captures(line)?;
            let name = caps.get(2).map_or("", |m| m.as_str());
            if name.is_empty() {
                return None;
            }
            Some(ModelInfo {
                model_id: caps.get(1).map_or("", |m| m.as_str()).to_owned(),
                name: name.to_owned(),
                current: caps.get(3).is_some(),
            })
        })
        .collect()
}

/// Scan status/login/logout output for the authentication state.
///
/// The scan is case-insensitive: a line containing `Logged in as <account>`
/// wins; everything else — including an explicit `Not logged in` — is
/// [`AuthStatus::LoggedOut`].
#[must_use]
pub fn scan_auth_output(text: &str) -> AuthStatus {
    const MARKER: &str = "logged in as ";

    for line in text.lines() {
        let lower = line.to_lowercase();
        if lower.contains("not logged in") {
            continue;
        }
        if let Some(pos) = lower.find(MARKER) {
            let account = line[pos + MARKER.len()..].trim();
            if !account.is_empty() {
                return AuthStatus::LoggedIn {
                    account: account.to_owned(),
                };
            }
        }
    }

    AuthStatus::LoggedOut
}
