//! Prompt orchestration: session registry, attempt execution, and the
//! bounded permission-retry protocol.
//!
//! One prompt turn runs through: flatten → built-in command dispatch →
//! custom-template resolution → attempt #1 through the stream/mapper
//! pipeline → (on rejection, in a confirmation-soliciting mode) one
//! permission round trip and at most one forced retry attempt. At most
//! one run is active per session; a new run only starts after the
//! previous one's completion has settled.
//!
//! Cancellation is authoritative here: once a session's cancelled flag is
//! set, every subsequent step of the turn short-circuits to a cancelled
//! outcome — including suppressing a pending permission decision's side
//! effects (mode switch, retry).

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent_cli::AgentCli;
use crate::config::ConduitConfig;
use crate::custom::loader::{load_custom_commands, CustomCommand};
use crate::custom::template;
use crate::history::{HistoryEntry, HistoryRole, HistoryStore};
use crate::mapper::{map_record, RejectedToolCall, ToolUseCache};
use crate::orchestrator::builtins::{self, BuiltinContext, BuiltinReply};
use crate::orchestrator::session::{PermissionMode, SessionState};
use crate::protocol::{
    flatten_prompt, ContentBlock, PermissionOutcome, PermissionRequest, SessionUpdate, StopReason,
};
use crate::stream::reader::{run_agent, AgentInvocation};
use crate::stream::record::{ResultRecord, StreamRecord};
use crate::{AppError, Result};

/// Result subtypes that map to the distinguished max-turn outcome rather
/// than a fatal error.
pub const TURN_LIMIT_SUBTYPES: &[&str] = &["max_turns", "max_turn_requests", "budget_exceeded"];

// ── Protocol seams ────────────────────────────────────────────────────────────

/// Outward interface to the surrounding client protocol.
///
/// Implementations deliver session-update notifications and drive the
/// permission round trip. The stdio transport implements this in
/// [`crate::server`]; tests substitute a recording client.
pub trait SessionClient: Send + Sync {
    /// Deliver one session-update notification.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when the client transport fails.
    fn notify(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Ask the client to re-authorize a rejected tool call.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when the client transport fails.
    fn request_permission(
        &self,
        session_id: &str,
        request: PermissionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<PermissionOutcome>> + Send + '_>>;
}

/// Inputs for one agent attempt.
#[derive(Debug, Clone)]
pub struct AttemptRequest {
    /// Session the attempt belongs to.
    pub session_id: String,
    /// Workspace directory.
    pub cwd: PathBuf,
    /// Flat prompt text.
    pub prompt: String,
    /// Backend conversation to resume, when known.
    pub backend_session_id: Option<String>,
    /// Model override, when selected.
    pub model_id: Option<String>,
    /// Session permission mode (ignored for flags when `force` is set).
    pub mode: PermissionMode,
    /// Whether to pass the force flag (retry attempts, bypass mode).
    pub force: bool,
    /// Cancel handle for this run.
    pub cancel: CancellationToken,
}

/// Signals gathered from one completed attempt.
#[derive(Debug, Default)]
pub struct AttemptReport {
    /// Terminal result record, when observed.
    pub result: Option<ResultRecord>,
    /// Rejected tool calls, in stream order.
    pub rejected: Vec<RejectedToolCall>,
    /// Backend session id discovered during the run.
    pub backend_session_id: Option<String>,
    /// Mode string echoed by the agent, unparsed.
    pub mode_echo: Option<String>,
}

/// Executes one agent attempt, streaming notifications to the client.
///
/// The production implementation is [`CliAttemptRunner`]; tests substitute
/// a scripted runner to exercise the retry protocol without a subprocess.
pub trait AttemptRunner: Send + Sync {
    /// Run one attempt to completion.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Agent`] on transport failures (spawn, parse,
    /// exit without result).
    fn run_attempt(
        &self,
        request: AttemptRequest,
    ) -> Pin<Box<dyn Future<Output = Result<AttemptReport>> + Send + '_>>;
}

// ── Production attempt runner ─────────────────────────────────────────────────

/// Attempt runner backed by the real agent subprocess.
pub struct CliAttemptRunner {
    config: Arc<ConduitConfig>,
    client: Arc<dyn SessionClient>,
}

impl CliAttemptRunner {
    /// Create a runner for `config`, streaming to `client`.
    #[must_use]
    pub fn new(config: Arc<ConduitConfig>, client: Arc<dyn SessionClient>) -> Self {
        Self { config, client }
    }
}

/// Mutable state accumulated while one attempt's records are processed.
#[derive(Default)]
struct AttemptState {
    cache: ToolUseCache,
    backend_session_id: Option<String>,
    mode_echo: Option<String>,
    rejected: Vec<RejectedToolCall>,
}

impl AttemptRunner for CliAttemptRunner {
    fn run_attempt(
        &self,
        request: AttemptRequest,
    ) -> Pin<Box<dyn Future<Output = Result<AttemptReport>> + Send + '_>> {
        Box::pin(async move {
            let invocation = build_invocation(&self.config.agent_bin, &request);
            let state = Arc::new(Mutex::new(AttemptState::default()));
            let session_id: Arc<str> = request.session_id.clone().into();

            let handler = {
                let state = Arc::clone(&state);
                let client = Arc::clone(&self.client);
                move |record: StreamRecord| {
                    let state = Arc::clone(&state);
                    let client = Arc::clone(&client);
                    let session_id = Arc::clone(&session_id);
                    async move {
                        // The reader invokes this strictly sequentially, so
                        // the lock is never contended; it only carries the
                        // state across invocations.
                        let mut state = state.lock().await;
                        let output = map_record(&record, &mut state.cache);

                        if let Some(id) = output.backend_session_id {
                            state.backend_session_id = Some(id);
                        }
                        if let Some(mode) = output.current_mode_id {
                            state.mode_echo = Some(mode);
                        }
                        if let Some(rejected) = output.rejected_tool_call {
                            state.rejected.push(rejected);
                        }

                        for update in output.notifications {
                            client.notify(&session_id, update).await?;
                        }
                        Ok(())
                    }
                }
            };

            let outcome = run_agent(
                &invocation,
                self.config.drain_timeout(),
                request.cancel.clone(),
                handler,
            )
            .await?;

            let mut state = state.lock().await;
            Ok(AttemptReport {
                result: outcome.result,
                rejected: std::mem::take(&mut state.rejected),
                backend_session_id: state.backend_session_id.take(),
                mode_echo: state.mode_echo.take(),
            })
        })
    }
}

/// Build the agent command line for one attempt.
///
/// `--print --output-format stream-json` always; `--resume` when a backend
/// session is known; `--workspace`, optional `--model`; then either the
/// force flag (retries, bypass) or the session mode's own flags; the flat
/// prompt text last.
#[must_use]
pub fn build_invocation(program: &str, request: &AttemptRequest) -> AgentInvocation {
    let mut args = vec![
        "--print".to_owned(),
        "--output-format".to_owned(),
        "stream-json".to_owned(),
    ];

    if let Some(backend) = &request.backend_session_id {
        args.push("--resume".to_owned());
        args.push(backend.clone());
    }

    args.push("--workspace".to_owned());
    args.push(request.cwd.to_string_lossy().into_owned());

    if let Some(model) = &request.model_id {
        args.push("--model".to_owned());
        args.push(model.clone());
    }

    if request.force {
        args.push("--force".to_owned());
    } else {
        args.extend(request.mode.cli_flags());
    }

    args.push(request.prompt.clone());

    AgentInvocation {
        program: program.to_owned(),
        args,
        cwd: request.cwd.clone(),
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Immutable view of session state taken at a turn boundary.
#[derive(Debug, Clone)]
struct TurnSnapshot {
    cwd: PathBuf,
    mode: PermissionMode,
    backend_session_id: Option<String>,
    model_id: Option<String>,
}

/// Owns per-session state and drives prompt turns end to end.
pub struct PromptOrchestrator {
    config: Arc<ConduitConfig>,
    client: Arc<dyn SessionClient>,
    runner: Arc<dyn AttemptRunner>,
    agent_cli: AgentCli,
    history: HistoryStore,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl PromptOrchestrator {
    /// Create an orchestrator with an explicit attempt runner.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::History`] when the history directory cannot be
    /// created.
    pub fn new(
        config: Arc<ConduitConfig>,
        client: Arc<dyn SessionClient>,
        runner: Arc<dyn AttemptRunner>,
    ) -> Result<Self> {
        let agent_cli = AgentCli::new(config.agent_bin.clone());
        let history = HistoryStore::new(config.history_dir.clone())?;
        Ok(Self {
            config,
            client,
            runner,
            agent_cli,
            history,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Create an orchestrator backed by the real agent subprocess runner.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::History`] when the history directory cannot be
    /// created.
    pub fn with_cli_runner(
        config: Arc<ConduitConfig>,
        client: Arc<dyn SessionClient>,
    ) -> Result<Self> {
        let runner = Arc::new(CliAttemptRunner::new(
            Arc::clone(&config),
            Arc::clone(&client),
        ));
        Self::new(config, client, runner)
    }

    /// Create a new session rooted at `cwd`.
    ///
    /// A backend chat is pre-created via `create-chat`; failure degrades to
    /// discovery from the first run's init record.
    ///
    /// # Errors
    ///
    /// This registration itself does not fail; the `Result` covers future
    /// validation.
    pub async fn new_session(&self, cwd: PathBuf, mode: Option<PermissionMode>) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        let mode = mode.unwrap_or(self.config.default_mode);
        let mut state = SessionState::new(session_id.clone(), cwd, mode);

        match self.agent_cli.create_chat().await {
            Ok(backend_id) => state.backend_session_id = Some(backend_id),
            Err(err) => {
                warn!(%err, "create-chat failed; backend session will be discovered on first run");
            }
        }

        info!(session_id, mode = mode.id(), "session created");
        self.sessions.lock().await.insert(session_id.clone(), state);
        Ok(session_id)
    }

    /// Re-register an existing session and replay its history.
    ///
    /// # Errors
    ///
    /// This registration itself does not fail; history read failures
    /// degrade to an empty replay.
    pub async fn load_session(
        &self,
        session_id: &str,
        cwd: PathBuf,
        mode: Option<PermissionMode>,
    ) -> Result<Vec<HistoryEntry>> {
        let mode = mode.unwrap_or(self.config.default_mode);
        let state = SessionState::new(session_id.to_owned(), cwd, mode);
        self.sessions
            .lock()
            .await
            .insert(session_id.to_owned(), state);

        let entries = match self.history.replay(session_id).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(session_id, %err, "history replay failed, continuing with empty history");
                Vec::new()
            }
        };

        info!(session_id, entries = entries.len(), "session loaded");
        Ok(entries)
    }

    /// Cancel the session's current prompt, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown session.
    pub async fn cancel(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let state = sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))?;
        state.cancel();
        info!(session_id, "session cancelled");
        Ok(())
    }

    /// Switch the session's permission mode at the client's request.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown session.
    pub async fn set_mode(&self, session_id: &str, mode: PermissionMode) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let state = sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))?;
        state.mode = mode;
        info!(session_id, mode = mode.id(), "session mode changed");
        Ok(())
    }

    /// Select a model for the session.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown session.
    pub async fn set_model(&self, session_id: &str, model_id: String) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let state = sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))?;
        info!(session_id, model_id, "session model changed");
        state.model_id = Some(model_id);
        Ok(())
    }

    /// Discard a session's state.
    pub async fn discard_session(&self, session_id: &str) {
        if let Some(mut state) = self.sessions.lock().await.remove(session_id) {
            state.cancel();
            info!(session_id, "session discarded");
        }
    }

    /// Run one prompt turn to completion.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] — unknown session.
    /// - [`AppError::Protocol`] — a prompt is already active.
    /// - [`AppError::Agent`] / [`AppError::AgentReported`] — attempt-level
    ///   failure per the error taxonomy. Cancellation is never an error.
    pub async fn prompt(&self, session_id: &str, blocks: &[ContentBlock]) -> Result<StopReason> {
        let cancel = {
            let mut sessions = self.sessions.lock().await;
            let state = sessions
                .get_mut(session_id)
                .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))?;
            if state.active_run.is_some() {
                return Err(AppError::Protocol(format!(
                    "a prompt is already active for session {session_id}"
                )));
            }
            state.begin_prompt()
        };

        let outcome = self.run_turn(session_id, blocks, cancel).await;

        if let Some(state) = self.sessions.lock().await.get_mut(session_id) {
            state.finish_prompt();
        }

        outcome
    }

    // ── Turn internals ────────────────────────────────────────────────────

    /// The per-prompt algorithm.
    async fn run_turn(
        &self,
        session_id: &str,
        blocks: &[ContentBlock],
        cancel: CancellationToken,
    ) -> Result<StopReason> {
        let snapshot = self.snapshot(session_id).await?;
        let mut text = flatten_prompt(blocks);
        self.record_history(session_id, HistoryRole::User, &text)
            .await;

        if let Some((name, args)) = builtins::split_command(&text) {
            let custom = load_custom_commands(&snapshot.cwd, &self.config.dot_dir);

            let ctx = BuiltinContext {
                agent_cli: &self.agent_cli,
                custom_commands: &custom,
                current_mode: snapshot.mode,
                current_model: snapshot.model_id.as_deref(),
            };
            if let Some(reply) = builtins::dispatch(name, args, &ctx).await {
                if self.is_cancelled(session_id).await {
                    return Ok(StopReason::Cancelled);
                }
                let message = self.apply_builtin_reply(session_id, reply).await?;
                self.client
                    .notify(session_id, SessionUpdate::AgentMessageChunk { text: message })
                    .await?;
                return Ok(StopReason::EndTurn);
            }

            if let Some(resolved) = resolve_custom(&custom, name, args) {
                debug!(session_id, command = name, "resolved custom command template");
                text = resolved;
            }
        }

        // Attempt #1.
        let Some(report) = self.run_attempt(session_id, &snapshot, &text, false, &cancel).await?
        else {
            return Ok(StopReason::Cancelled);
        };
        let outcome = classify_result(report.result.as_ref())?;

        if outcome == StopReason::EndTurn
            && snapshot.mode.solicits_confirmation()
            && !report.rejected.is_empty()
        {
            // Only the first rejected call is surfaced for re-authorization.
            let first = &report.rejected[0];
            return self
                .run_retry_cycle(session_id, &text, first, outcome, &cancel)
                .await;
        }

        self.record_result(session_id, report.result.as_ref()).await;
        Ok(outcome)
    }

    /// The permission round trip plus at most one forced retry attempt.
    async fn run_retry_cycle(
        &self,
        session_id: &str,
        prompt_text: &str,
        rejected: &RejectedToolCall,
        first_outcome: StopReason,
        cancel: &CancellationToken,
    ) -> Result<StopReason> {
        let request = PermissionRequest {
            tool_call_id: rejected.tool_call_id.clone(),
            title: rejected.title.clone(),
            raw_input: rejected.raw_input.clone(),
        };

        let decision = self.client.request_permission(session_id, request).await;

        // Cancellation observed while the decision was pending suppresses
        // everything — including the mode switch an allow-always decision
        // would have made.
        if self.is_cancelled(session_id).await {
            return Ok(StopReason::Cancelled);
        }
        let decision = decision?;
        info!(session_id, ?decision, "permission decision received");

        if decision == PermissionOutcome::Reject {
            return Ok(first_outcome);
        }

        if decision == PermissionOutcome::AllowAlways {
            self.set_mode(session_id, PermissionMode::Bypass).await?;
            self.client
                .notify(
                    session_id,
                    SessionUpdate::CurrentModeUpdate {
                        current_mode_id: PermissionMode::Bypass.id().to_owned(),
                    },
                )
                .await?;
        }

        // Exactly one retry, force flag set; its own rejections are final.
        let snapshot = self.snapshot(session_id).await?;
        let Some(report) = self
            .run_attempt(session_id, &snapshot, prompt_text, true, cancel)
            .await?
        else {
            return Ok(StopReason::Cancelled);
        };
        let outcome = classify_result(report.result.as_ref())?;
        self.record_result(session_id, report.result.as_ref()).await;
        Ok(outcome)
    }

    /// Run one attempt and apply its side signals. `Ok(None)` means the
    /// turn was cancelled (whether the attempt itself succeeded or not).
    async fn run_attempt(
        &self,
        session_id: &str,
        snapshot: &TurnSnapshot,
        prompt_text: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<AttemptReport>> {
        let request = AttemptRequest {
            session_id: session_id.to_owned(),
            cwd: snapshot.cwd.clone(),
            prompt: prompt_text.to_owned(),
            backend_session_id: snapshot.backend_session_id.clone(),
            model_id: snapshot.model_id.clone(),
            mode: snapshot.mode,
            force,
            cancel: cancel.clone(),
        };

        match self.runner.run_attempt(request).await {
            Ok(report) => {
                self.apply_side_signals(session_id, &report).await;
                if self.is_cancelled(session_id).await {
                    Ok(None)
                } else {
                    Ok(Some(report))
                }
            }
            Err(err) => {
                if self.is_cancelled(session_id).await {
                    debug!(session_id, %err, "attempt failed after cancellation, reporting cancelled");
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Persist backend-session and mode-echo signals from an attempt.
    async fn apply_side_signals(&self, session_id: &str, report: &AttemptReport) {
        let mut sessions = self.sessions.lock().await;
        let Some(state) = sessions.get_mut(session_id) else {
            return;
        };

        if let Some(backend_id) = &report.backend_session_id {
            state.backend_session_id = Some(backend_id.clone());
        }
        if let Some(raw) = &report.mode_echo {
            if let Some(mode) = PermissionMode::parse(raw) {
                state.mode = mode;
            } else {
                debug!(session_id, raw, "ignoring unrecognized mode echo");
            }
        }
    }

    /// Apply a built-in command's state change and return its message.
    async fn apply_builtin_reply(&self, session_id: &str, reply: BuiltinReply) -> Result<String> {
        match reply {
            BuiltinReply::Message(message) => Ok(message),
            BuiltinReply::SetMode { mode, message } => {
                self.set_mode(session_id, mode).await?;
                self.client
                    .notify(
                        session_id,
                        SessionUpdate::CurrentModeUpdate {
                            current_mode_id: mode.id().to_owned(),
                        },
                    )
                    .await?;
                Ok(message)
            }
            BuiltinReply::SetModel { model_id, message } => {
                self.set_model(session_id, model_id).await?;
                Ok(message)
            }
        }
    }

    /// Snapshot the session fields a turn needs.
    async fn snapshot(&self, session_id: &str) -> Result<TurnSnapshot> {
        let sessions = self.sessions.lock().await;
        let state = sessions
            .get(session_id)
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))?;
        Ok(TurnSnapshot {
            cwd: state.cwd.clone(),
            mode: state.mode,
            backend_session_id: state.backend_session_id.clone(),
            model_id: state.model_id.clone(),
        })
    }

    /// Whether the session's cancelled flag is set. Unknown sessions count
    /// as cancelled — a discarded session must not keep running.
    async fn is_cancelled(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .is_none_or(|state| state.cancelled)
    }

    /// Best-effort history append.
    async fn record_history(&self, session_id: &str, role: HistoryRole, text: &str) {
        if text.is_empty() {
            return;
        }
        let entry = HistoryEntry::now(role, text.to_owned());
        if let Err(err) = self.history.append(session_id, &entry).await {
            warn!(session_id, %err, "history append failed, continuing");
        }
    }

    /// Record the agent's terminal result text, when any.
    async fn record_result(&self, session_id: &str, result: Option<&ResultRecord>) {
        if let Some(text) = result.and_then(|r| r.text.as_deref()) {
            self.record_history(session_id, HistoryRole::Agent, text)
                .await;
        }
    }
}

// ── Free helpers ──────────────────────────────────────────────────────────────

/// Classify an attempt's terminal result per the outcome rules: success
/// with no error flag ends the turn; turn-limit markers map to the
/// max-turn outcome; anything else is a fatal agent-reported error.
///
/// # Errors
///
/// Returns [`AppError::Agent`] when no result record was observed, or
/// [`AppError::AgentReported`] for non-turn-limit error subtypes.
pub fn classify_result(result: Option<&ResultRecord>) -> Result<StopReason> {
    let Some(result) = result else {
        return Err(AppError::Agent(
            "attempt finished without a result record".into(),
        ));
    };

    if TURN_LIMIT_SUBTYPES.contains(&result.subtype.as_str()) {
        return Ok(StopReason::MaxTurns);
    }
    if result.subtype == "success" && !result.is_error {
        return Ok(StopReason::EndTurn);
    }

    Err(AppError::AgentReported(result.text.clone().unwrap_or_else(
        || format!("agent failed with result subtype '{}'", result.subtype),
    )))
}

/// Resolve a custom command or skill invocation into prompt text.
fn resolve_custom(commands: &[CustomCommand], name: &str, args: &str) -> Option<String> {
    let command = commands.iter().find(|c| c.name == name)?;
    Some(template::resolve(&command.template, args))
}
