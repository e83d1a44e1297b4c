//! Thin stdio front end for the client protocol.
//!
//! Carries the shapes of [`crate::protocol`] over newline-delimited JSON:
//! requests arrive on stdin, responses and notifications leave on stdout
//! (logging goes to stderr). Requests are dispatched to the
//! [`PromptOrchestrator`]; prompts run as spawned tasks so `session/cancel`
//! and `session/permission_response` stay serviceable mid-turn.
//!
//! This layer is deliberately thin wiring — no orchestration logic lives
//! here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

use crate::config::ConduitConfig;
use crate::orchestrator::prompt::{PromptOrchestrator, SessionClient};
use crate::orchestrator::session::PermissionMode;
use crate::protocol::{ContentBlock, PermissionOutcome, PermissionRequest, SessionUpdate};
use crate::{AppError, Result};

// ── Request shapes ────────────────────────────────────────────────────────────

/// One inbound request line.
#[derive(Debug, Deserialize)]
struct Request {
    /// Correlation id; requests without one get no response.
    id: Option<u64>,
    /// Method name, e.g. `session/prompt`.
    method: String,
    /// Method-specific parameters.
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
struct NewSessionParams {
    cwd: PathBuf,
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadSessionParams {
    session_id: String,
    cwd: PathBuf,
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptParams {
    session_id: String,
    prompt: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionIdParams {
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetModeParams {
    session_id: String,
    mode_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetModelParams {
    session_id: String,
    model_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionResponseParams {
    request_id: u64,
    outcome: PermissionOutcome,
}

// ── Stdio client ──────────────────────────────────────────────────────────────

/// Pending permission requests awaiting a `session/permission_response`.
type PendingPermissions = Mutex<HashMap<u64, oneshot::Sender<PermissionOutcome>>>;

/// [`SessionClient`] implementation writing NDJSON to stdout.
pub struct StdioClient {
    writer: Mutex<tokio::io::Stdout>,
    pending: PendingPermissions,
    next_request_id: AtomicU64,
}

impl StdioClient {
    /// Create a client over the process stdout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(tokio::io::stdout()),
            pending: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Serialize `value` and write it as one line.
    async fn write_line(&self, value: &Value) -> Result<()> {
        let mut line = serde_json::to_vec(value)
            .map_err(|err| AppError::Protocol(format!("failed to serialize message: {err}")))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|err| AppError::Protocol(format!("stdout write failed: {err}")))?;
        writer
            .flush()
            .await
            .map_err(|err| AppError::Protocol(format!("stdout flush failed: {err}")))
    }

    /// Write a success response for request `id`.
    async fn respond(&self, id: u64, result: Value) {
        let msg = json!({ "id": id, "result": result });
        if let Err(err) = self.write_line(&msg).await {
            warn!(%err, "failed to write response");
        }
    }

    /// Write an error response for request `id`.
    async fn respond_error(&self, id: u64, err: &AppError) {
        let msg = json!({ "id": id, "error": { "message": err.to_string() } });
        if let Err(write_err) = self.write_line(&msg).await {
            warn!(%write_err, "failed to write error response");
        }
    }

    /// Resolve a pending permission request with the client's decision.
    async fn resolve_permission(&self, request_id: u64, outcome: PermissionOutcome) {
        let sender = self.pending.lock().await.remove(&request_id);
        match sender {
            Some(sender) => {
                let _ = sender.send(outcome);
            }
            None => warn!(request_id, "permission response for unknown request"),
        }
    }
}

impl Default for StdioClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionClient for StdioClient {
    fn notify(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
        let session_id = session_id.to_owned();
        Box::pin(async move {
            let msg = json!({
                "method": "session/update",
                "params": { "sessionId": session_id, "update": update },
            });
            self.write_line(&msg).await
        })
    }

    fn request_permission(
        &self,
        session_id: &str,
        request: PermissionRequest,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<PermissionOutcome>> + Send + '_>> {
        let session_id = session_id.to_owned();
        Box::pin(async move {
            let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();
            self.pending.lock().await.insert(request_id, tx);

            let msg = json!({
                "method": "session/request_permission",
                "params": {
                    "requestId": request_id,
                    "sessionId": session_id,
                    "toolCallId": request.tool_call_id,
                    "title": request.title,
                    "rawInput": request.raw_input,
                    "options": ["allow_once", "allow_always", "reject"],
                },
            });
            self.write_line(&msg).await?;

            rx.await.map_err(|_| {
                AppError::Protocol("client disconnected while permission request pending".into())
            })
        })
    }
}

// ── Server loop ───────────────────────────────────────────────────────────────

/// Run the stdio server until stdin closes.
///
/// # Errors
///
/// Returns [`AppError::History`] when the orchestrator cannot be
/// constructed, or [`AppError::Io`] on stdin failure.
pub async fn run_stdio(config: Arc<ConduitConfig>) -> Result<()> {
    let client = Arc::new(StdioClient::new());
    let orchestrator = Arc::new(PromptOrchestrator::with_cli_runner(
        config,
        Arc::clone(&client) as Arc<dyn SessionClient>,
    )?);

    info!("stdio server ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|err| AppError::Io(format!("stdin read failed: {err}")))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                warn!(%err, "skipping malformed request line");
                continue;
            }
        };

        dispatch(&orchestrator, &client, request).await;
    }

    info!("stdin closed, shutting down");
    Ok(())
}

/// Dispatch one request, writing its response when it carries an id.
async fn dispatch(
    orchestrator: &Arc<PromptOrchestrator>,
    client: &Arc<StdioClient>,
    request: Request,
) {
    let id = request.id;

    match request.method.as_str() {
        "session/prompt" => {
            // Prompts run detached so cancel and permission responses can
            // be processed while the turn is in flight.
            let params: PromptParams = match parse_params(request.params) {
                Ok(params) => params,
                Err(err) => return report(client, id, Err(err)).await,
            };
            let orchestrator = Arc::clone(orchestrator);
            let client = Arc::clone(client);
            tokio::spawn(async move {
                let outcome = orchestrator
                    .prompt(&params.session_id, &params.prompt)
                    .await
                    .map(|stop| json!({ "stopReason": stop }));
                report(&client, id, outcome).await;
            });
        }

        "session/new" => {
            let outcome = match parse_params::<NewSessionParams>(request.params) {
                Ok(params) => match parse_mode(params.mode.as_deref()) {
                    Ok(mode) => orchestrator
                        .new_session(params.cwd, mode)
                        .await
                        .map(|session_id| json!({ "sessionId": session_id })),
                    Err(err) => Err(err),
                },
                Err(err) => Err(err),
            };
            report(client, id, outcome).await;
        }

        "session/load" => {
            let outcome = match parse_params::<LoadSessionParams>(request.params) {
                Ok(params) => match parse_mode(params.mode.as_deref()) {
                    Ok(mode) => orchestrator
                        .load_session(&params.session_id, params.cwd, mode)
                        .await
                        .map(|entries| json!({ "entries": entries })),
                    Err(err) => Err(err),
                },
                Err(err) => Err(err),
            };
            report(client, id, outcome).await;
        }

        "session/cancel" => {
            let outcome = match parse_params::<SessionIdParams>(request.params) {
                Ok(params) => orchestrator
                    .cancel(&params.session_id)
                    .await
                    .map(|()| json!({})),
                Err(err) => Err(err),
            };
            report(client, id, outcome).await;
        }

        "session/set_mode" => {
            let outcome = match parse_params::<SetModeParams>(request.params) {
                Ok(params) => match PermissionMode::parse(&params.mode_id) {
                    Some(mode) => orchestrator
                        .set_mode(&params.session_id, mode)
                        .await
                        .map(|()| json!({})),
                    None => Err(AppError::Protocol(format!(
                        "unknown mode '{}'",
                        params.mode_id
                    ))),
                },
                Err(err) => Err(err),
            };
            report(client, id, outcome).await;
        }

        "session/set_model" => {
            let outcome = match parse_params::<SetModelParams>(request.params) {
                Ok(params) => orchestrator
                    .set_model(&params.session_id, params.model_id)
                    .await
                    .map(|()| json!({})),
                Err(err) => Err(err),
            };
            report(client, id, outcome).await;
        }

        "session/permission_response" => {
            let outcome = match parse_params::<PermissionResponseParams>(request.params) {
                Ok(params) => {
                    client
                        .resolve_permission(params.request_id, params.outcome)
                        .await;
                    Ok(json!({}))
                }
                Err(err) => Err(err),
            };
            report(client, id, outcome).await;
        }

        other => {
            report(
                client,
                id,
                Err(AppError::Protocol(format!("unknown method '{other}'"))),
            )
            .await;
        }
    }
}

/// Deserialize request params into their typed shape.
fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|err| AppError::Protocol(format!("invalid params: {err}")))
}

/// Parse an optional mode identifier from request params.
fn parse_mode(raw: Option<&str>) -> Result<Option<PermissionMode>> {
    match raw {
        None => Ok(None),
        Some(raw) => PermissionMode::parse(raw)
            .map(Some)
            .ok_or_else(|| AppError::Protocol(format!("unknown mode '{raw}'"))),
    }
}

/// Write the response for a completed request, when it carried an id.
async fn report(client: &StdioClient, id: Option<u64>, outcome: Result<Value>) {
    let Some(id) = id else {
        if let Err(err) = outcome {
            warn!(%err, "request without id failed");
        }
        return;
    };

    match outcome {
        Ok(result) => client.respond(id, result).await,
        Err(err) => client.respond_error(id, &err).await,
    }
}
