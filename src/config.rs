//! Global configuration parsing and validation.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::orchestrator::session::PermissionMode;
use crate::{AppError, Result};

fn default_agent_bin() -> String {
    "agent".into()
}

fn default_drain_timeout_seconds() -> u64 {
    10
}

fn default_dot_dir() -> String {
    ".conduit".into()
}

fn default_history_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".conduit")
        .join("history")
}

/// Global configuration parsed from `conduit.toml`.
///
/// Every field has a default, so an absent or empty config file yields a
/// working configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ConduitConfig {
    /// Agent binary name or path.
    #[serde(default = "default_agent_bin")]
    pub agent_bin: String,
    /// Maximum wait for agent process exit after its stream closes, before
    /// force-killing. Applies only once a `result` record was observed.
    #[serde(default = "default_drain_timeout_seconds")]
    pub drain_timeout_seconds: u64,
    /// Dot-directory name scanned for custom commands and skills, in both
    /// the workspace and home scopes.
    #[serde(default = "default_dot_dir")]
    pub dot_dir: String,
    /// Directory holding per-session history logs.
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,
    /// Permission mode assigned to new sessions.
    #[serde(default)]
    pub default_mode: PermissionMode,
}

impl Default for ConduitConfig {
    fn default() -> Self {
        Self {
            agent_bin: default_agent_bin(),
            drain_timeout_seconds: default_drain_timeout_seconds(),
            dot_dir: default_dot_dir(),
            history_dir: default_history_dir(),
            default_mode: PermissionMode::default(),
        }
    }
}

impl ConduitConfig {
    /// Parse a configuration from TOML text and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] on TOML syntax errors or invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|err| AppError::Config(format!("failed to parse config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// The drain timeout as a [`Duration`].
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }

    /// Validate field values.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when a field is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.agent_bin.trim().is_empty() {
            return Err(AppError::Config("agent_bin must not be empty".into()));
        }
        if self.drain_timeout_seconds == 0 {
            return Err(AppError::Config(
                "drain_timeout_seconds must be at least 1".into(),
            ));
        }
        if self.dot_dir.trim().is_empty() || self.dot_dir.contains('/') {
            return Err(AppError::Config(
                "dot_dir must be a bare directory name".into(),
            ));
        }
        Ok(())
    }
}
