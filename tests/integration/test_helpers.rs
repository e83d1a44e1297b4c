//! Shared fixtures for orchestrator integration tests: a recording client
//! and a scripted attempt runner, so the retry protocol can be exercised
//! without spawning a real agent process.

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use agent_conduit::config::ConduitConfig;
use agent_conduit::mapper::RejectedToolCall;
use agent_conduit::orchestrator::prompt::{
    AttemptReport, AttemptRequest, AttemptRunner, PromptOrchestrator, SessionClient,
};
use agent_conduit::orchestrator::session::PermissionMode;
use agent_conduit::protocol::{
    ContentBlock, PermissionOutcome, PermissionRequest, SessionUpdate,
};
use agent_conduit::stream::record::ResultRecord;
use agent_conduit::{AppError, Result};
use serde_json::json;
use tokio::sync::{oneshot, Notify};

// ── Recording client ─────────────────────────────────────────────────────────

/// How the client answers the next permission request.
pub enum Decision {
    /// Answer immediately.
    Immediate(PermissionOutcome),
    /// Hold the request until the test releases the sender.
    Gated(oneshot::Receiver<PermissionOutcome>),
}

/// [`SessionClient`] that records everything and answers permission
/// requests from a pre-stocked queue.
#[derive(Default)]
pub struct RecordingClient {
    updates: Mutex<Vec<SessionUpdate>>,
    permission_requests: Mutex<Vec<PermissionRequest>>,
    decisions: Mutex<VecDeque<Decision>>,
    /// Signalled whenever a permission request arrives.
    pub permission_seen: Notify,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stock an immediate answer for the next permission request.
    pub fn push_decision(&self, outcome: PermissionOutcome) {
        self.decisions
            .lock()
            .unwrap()
            .push_back(Decision::Immediate(outcome));
    }

    /// Stock a gated answer; the returned sender releases it.
    pub fn push_gated_decision(&self) -> oneshot::Sender<PermissionOutcome> {
        let (tx, rx) = oneshot::channel();
        self.decisions
            .lock()
            .unwrap()
            .push_back(Decision::Gated(rx));
        tx
    }

    pub fn updates(&self) -> Vec<SessionUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn permission_requests(&self) -> Vec<PermissionRequest> {
        self.permission_requests.lock().unwrap().clone()
    }

    /// Mode ids from recorded `current_mode_update` notifications.
    pub fn mode_updates(&self) -> Vec<String> {
        self.updates()
            .into_iter()
            .filter_map(|update| match update {
                SessionUpdate::CurrentModeUpdate { current_mode_id } => Some(current_mode_id),
                _ => None,
            })
            .collect()
    }

    /// Texts of recorded `agent_message_chunk` notifications.
    pub fn message_chunks(&self) -> Vec<String> {
        self.updates()
            .into_iter()
            .filter_map(|update| match update {
                SessionUpdate::AgentMessageChunk { text } => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl SessionClient for RecordingClient {
    fn notify(
        &self,
        _session_id: &str,
        update: SessionUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.updates.lock().unwrap().push(update);
            Ok(())
        })
    }

    fn request_permission(
        &self,
        _session_id: &str,
        request: PermissionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<PermissionOutcome>> + Send + '_>> {
        Box::pin(async move {
            self.permission_requests.lock().unwrap().push(request);
            self.permission_seen.notify_one();

            let decision = self
                .decisions
                .lock()
                .unwrap()
                .pop_front()
                .expect("test must stock a decision before a permission request arrives");

            match decision {
                Decision::Immediate(outcome) => Ok(outcome),
                Decision::Gated(rx) => rx
                    .await
                    .map_err(|_| AppError::Protocol("gate dropped".into())),
            }
        })
    }
}

// ── Scripted runner ──────────────────────────────────────────────────────────

/// Behavior of one scripted attempt.
pub enum ScriptedAttempt {
    /// Resolve with the given report or error.
    Finish(Result<AttemptReport>),
    /// Block until the run's cancel token fires, then fail like a killed
    /// process would.
    WaitForCancelThenFail,
}

/// Inputs the runner observed for one attempt.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub prompt: String,
    pub force: bool,
    pub mode: PermissionMode,
    pub backend_session_id: Option<String>,
}

/// [`AttemptRunner`] that replays a pre-stocked script.
#[derive(Default)]
pub struct ScriptedRunner {
    script: Mutex<VecDeque<ScriptedAttempt>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedRunner {
    pub fn new(script: Vec<ScriptedAttempt>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl AttemptRunner for ScriptedRunner {
    fn run_attempt(
        &self,
        request: AttemptRequest,
    ) -> Pin<Box<dyn Future<Output = Result<AttemptReport>> + Send + '_>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(RecordedRequest {
                prompt: request.prompt.clone(),
                force: request.force,
                mode: request.mode,
                backend_session_id: request.backend_session_id.clone(),
            });

            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted runner ran out of attempts");

            match next {
                ScriptedAttempt::Finish(result) => result,
                ScriptedAttempt::WaitForCancelThenFail => {
                    request.cancel.cancelled().await;
                    Err(AppError::Agent("agent terminated by signal".into()))
                }
            }
        })
    }
}

// ── Report builders ──────────────────────────────────────────────────────────

pub fn success_result(text: &str) -> ResultRecord {
    ResultRecord {
        subtype: "success".to_owned(),
        is_error: false,
        text: Some(text.to_owned()),
    }
}

pub fn success_report(rejected: Vec<RejectedToolCall>) -> AttemptReport {
    AttemptReport {
        result: Some(success_result("done")),
        rejected,
        backend_session_id: None,
        mode_echo: None,
    }
}

pub fn rejected_call(id: &str) -> RejectedToolCall {
    RejectedToolCall {
        tool_call_id: id.to_owned(),
        title: format!("`touch {id}`"),
        raw_input: json!({"command": format!("touch {id}")}),
    }
}

// ── Orchestrator fixture ─────────────────────────────────────────────────────

/// Build an orchestrator over scripted collaborators plus a fresh session.
///
/// `history_dir` must outlive the orchestrator (pass a tempdir path).
pub async fn orchestrator_with(
    client: Arc<RecordingClient>,
    runner: Arc<ScriptedRunner>,
    workspace: &Path,
    history_dir: &Path,
    mode: Option<PermissionMode>,
) -> (Arc<PromptOrchestrator>, String) {
    let config = Arc::new(ConduitConfig {
        // A binary that cannot exist: create-chat degrades instantly.
        agent_bin: "/nonexistent/agent-conduit-test-bin".to_owned(),
        history_dir: history_dir.to_path_buf(),
        ..ConduitConfig::default()
    });

    let orchestrator = Arc::new(
        PromptOrchestrator::new(config, client, runner)
            .expect("orchestrator construction must succeed"),
    );
    let session_id = orchestrator
        .new_session(workspace.to_path_buf(), mode)
        .await
        .expect("session creation must succeed");

    (orchestrator, session_id)
}

/// A one-block text prompt.
pub fn text_prompt(text: &str) -> Vec<ContentBlock> {
    vec![ContentBlock::Text {
        text: text.to_owned(),
    }]
}
