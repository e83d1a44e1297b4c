//! Agent subprocess runner with ordered stream delivery.
//!
//! [`run_agent`] spawns the agent binary, frames its stdout into NDJSON
//! lines via [`StreamCodec`], parses each line into a [`StreamRecord`], and
//! feeds records to a caller-supplied asynchronous handler **strictly in
//! arrival order**: the handler future for record N is awaited to
//! completion before record N+1 is decoded. The sequential loop is the
//! queue — ordering is enforced structurally, not by scheduler accident.
//!
//! # Termination policy
//!
//! A run succeeds only once a `result` record has been observed among the
//! processed records and the stream has drained to EOF (the codec flushes
//! any unterminated tail as a final line). The process may keep running
//! after emitting `result` — e.g. to flush a trailing tool-call completion
//! — so the runner keeps reading until stdout closes, then waits up to a
//! bounded drain timeout for process exit before force-killing. A process
//! that exits without ever emitting `result` is a failure, reported with
//! its exit code and collected stderr (ANSI control sequences stripped).
//!
//! A line that fails to parse as JSON is fatal to the whole run.
//!
//! # Cancellation
//!
//! The cancellation token sends a termination signal to the child (SIGTERM
//! on unix). The run still resolves according to whatever was already
//! buffered and observed — cancellation never discards processed events.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use futures_util::StreamExt;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::stream::codec::StreamCodec;
use crate::stream::record::{parse_record, ResultRecord, StreamRecord};
use crate::{AppError, Result};

/// Command line for one agent run.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    /// Agent binary name or path.
    pub program: String,
    /// Full argument list, prompt text included.
    pub args: Vec<String>,
    /// Working directory for the child process.
    pub cwd: PathBuf,
}

/// Everything observed during one agent run.
#[derive(Debug)]
pub struct RunOutcome {
    /// All parsed records, in arrival order.
    pub events: Vec<StreamRecord>,
    /// The terminal `result` record, when one was observed.
    pub result: Option<ResultRecord>,
    /// Collected stderr with ANSI control sequences stripped.
    pub stderr: String,
    /// Child exit code, when the process exited on its own.
    pub exit_code: Option<i32>,
}

/// Spawn the agent and pump its stream through `handler`.
///
/// `handler` is invoked once per parsed record, in order, and awaited to
/// completion before the next record is processed. Records are also
/// collected into [`RunOutcome::events`].
///
/// # Errors
///
/// - [`AppError::Agent`] — spawn failure, malformed JSON line, handler
///   failure, or process exit without a `result` record (the error text
///   carries exit code and stripped stderr).
/// - [`AppError::Io`] — stream I/O failure.
pub async fn run_agent<H, F>(
    invocation: &AgentInvocation,
    drain_timeout: Duration,
    cancel: CancellationToken,
    handler: H,
) -> Result<RunOutcome>
where
    H: FnMut(StreamRecord) -> F,
    F: Future<Output = Result<()>>,
{
    debug!(
        program = %invocation.program,
        cwd = %invocation.cwd.display(),
        "spawning agent process"
    );

    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .current_dir(&invocation.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| AppError::Agent(format!("failed to spawn agent: {err}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Agent("failed to capture agent stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Agent("failed to capture agent stderr".into()))?;

    // Drain stderr concurrently so the child never blocks on a full pipe.
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        let mut stderr = stderr;
        let _ = stderr.read_to_string(&mut buf).await;
        buf
    });

    // The terminate closure borrows the child only while the pump runs;
    // the read loop keeps draining after the signal so nothing observed
    // is lost.
    let pump = {
        let child = &mut child;
        pump_records(stdout, cancel, || terminate_child(&mut *child), handler).await
    };

    if pump.is_err() {
        // Fatal stream error — ensure the child is gone before returning.
        let _ = child.start_kill();
    }

    // Settle the process before stderr: the collector only reaches EOF
    // once every write end is closed, so both waits are bounded by the
    // drain timeout.
    let exit_code = wait_with_drain(&mut child, drain_timeout).await;
    let stderr_text = match tokio::time::timeout(drain_timeout, stderr_task).await {
        Ok(Ok(buf)) => strip_ansi(&buf),
        Ok(Err(_)) | Err(_) => String::new(),
    };

    let (events, result) = pump?;

    if result.is_none() {
        return Err(AppError::Agent(format!(
            "agent exited without a result record (exit code {exit_code:?}): {stderr_text}"
        )));
    }

    Ok(RunOutcome {
        events,
        result,
        stderr: stderr_text,
        exit_code,
    })
}

/// Pump framed lines from `stream`, parsing and handing each record to
/// `handler` strictly sequentially: the handler future for one record is
/// awaited to completion before the next line is decoded, regardless of
/// where chunk boundaries fall in the underlying reads.
///
/// When `cancel` fires, `terminate` is invoked once and reading continues
/// until EOF, so records already in flight are still delivered.
///
/// Returns all parsed records plus the last observed `result` record.
///
/// # Errors
///
/// - [`AppError::Agent`] — a line failed to parse as JSON, or `handler`
///   returned an error.
/// - [`AppError::Io`] — underlying stream failure.
pub async fn pump_records<R, T, H, F>(
    stream: R,
    cancel: CancellationToken,
    mut terminate: T,
    mut handler: H,
) -> Result<(Vec<StreamRecord>, Option<ResultRecord>)>
where
    R: AsyncRead + Unpin,
    T: FnMut(),
    H: FnMut(StreamRecord) -> F,
    F: Future<Output = Result<()>>,
{
    let mut framed = FramedRead::new(stream, StreamCodec::new());
    let mut events = Vec::new();
    let mut result: Option<ResultRecord> = None;
    let mut signalled = false;

    loop {
        let item = if signalled {
            framed.next().await
        } else {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!("cancellation received, signalling agent process");
                    terminate();
                    signalled = true;
                    continue;
                }

                item = framed.next() => item,
            }
        };

        let Some(item) = item else {
            // EOF — the codec has flushed any unterminated tail.
            break;
        };

        let line = item?;
        if line.trim().is_empty() {
            continue;
        }

        let record = parse_record(&line)?;
        if let StreamRecord::Result(ref r) = record {
            result = Some(r.clone());
        }

        events.push(record.clone());
        handler(record).await?;
    }

    Ok((events, result))
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Wait up to `drain_timeout` for child exit, force-killing on expiry.
async fn wait_with_drain(child: &mut Child, drain_timeout: Duration) -> Option<i32> {
    match tokio::time::timeout(drain_timeout, child.wait()).await {
        Ok(Ok(status)) => status.code(),
        Ok(Err(err)) => {
            warn!(%err, "error waiting for agent process");
            None
        }
        Err(_elapsed) => {
            warn!(
                timeout = ?drain_timeout,
                "agent process did not exit within drain timeout, killing"
            );
            if let Err(err) = child.kill().await {
                warn!(%err, "failed to kill agent process after drain timeout");
            }
            None
        }
    }
}

/// Send a termination signal to the child: SIGTERM on unix so the agent can
/// flush, a hard kill elsewhere.
fn terminate_child(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let pid = nix::unistd::Pid::from_raw(pid.try_into().unwrap_or(0));
            if let Err(err) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM) {
                warn!(%err, "failed to signal agent process, falling back to kill");
                let _ = child.start_kill();
            }
            return;
        }
    }

    let _ = child.start_kill();
}

/// Strip ANSI escape sequences (CSI and OSC) from collected stderr.
#[must_use]
pub fn strip_ansi(text: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        let re = Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)").unwrap();
        re
    });
    re.replace_all(text, "").into_owned()
}
