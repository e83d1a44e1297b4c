//! Append-only session history.
//!
//! One JSONL file per session under a configurable directory; each line is
//! one [`HistoryEntry`]. History is a best-effort collaborator: callers
//! log and continue when an append or replay fails.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::{AppError, Result};

/// Who produced a history entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    /// The user's prompt text.
    User,
    /// The agent's terminal result text.
    Agent,
}

/// One recorded exchange line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// Who produced the text.
    pub role: HistoryRole,
    /// The recorded text.
    pub text: String,
}

impl HistoryEntry {
    /// Build an entry stamped with the current time.
    #[must_use]
    pub fn now(role: HistoryRole, text: String) -> Self {
        Self {
            timestamp: Utc::now(),
            role,
            text,
        }
    }
}

/// Append/replay facility for per-session JSONL history files.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::History`] when the directory cannot be created.
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir).map_err(|err| {
            AppError::History(format!(
                "failed to create history directory {}: {err}",
                dir.display()
            ))
        })?;
        Ok(Self { dir })
    }

    /// Append one entry to the session's log.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::History`] on serialization or write failure.
    pub async fn append(&self, session_id: &str, entry: &HistoryEntry) -> Result<()> {
        let path = self.session_path(session_id);
        let mut line = serde_json::to_string(entry)
            .map_err(|err| AppError::History(format!("failed to serialize entry: {err}")))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| {
                AppError::History(format!("failed to open {}: {err}", path.display()))
            })?;

        file.write_all(line.as_bytes()).await.map_err(|err| {
            AppError::History(format!("failed to append to {}: {err}", path.display()))
        })?;
        file.flush()
            .await
            .map_err(|err| AppError::History(format!("failed to flush history: {err}")))?;
        Ok(())
    }

    /// Replay all entries of a session's log, oldest first.
    ///
    /// A missing log file yields an empty list. Unparseable lines are
    /// skipped with a warning so a partially corrupted log still replays.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::History`] on read failure other than a missing
    /// file.
    pub async fn replay(&self, session_id: &str) -> Result<Vec<HistoryEntry>> {
        let path = self.session_path(session_id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(AppError::History(format!(
                    "failed to read {}: {err}",
                    path.display()
                )));
            }
        };

        Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(session_id, %err, "skipping unparseable history line");
                    None
                }
            })
            .collect())
    }

    /// Log file path for a session, with the id sanitized for filesystem use.
    fn session_path(&self, session_id: &str) -> PathBuf {
        let safe: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.jsonl"))
    }
}
