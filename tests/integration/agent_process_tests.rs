//! Stream reader tests against a real child process (`sh` standing in for
//! the agent binary).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_conduit::stream::reader::{run_agent, AgentInvocation};
use agent_conduit::stream::record::StreamRecord;
use agent_conduit::AppError;
use tokio_util::sync::CancellationToken;

fn sh(script: &str) -> AgentInvocation {
    AgentInvocation {
        program: "sh".to_owned(),
        args: vec!["-c".to_owned(), script.to_owned()],
        cwd: std::env::temp_dir(),
    }
}

fn collector() -> (
    Arc<Mutex<Vec<StreamRecord>>>,
    impl FnMut(StreamRecord) -> std::pin::Pin<Box<dyn std::future::Future<Output = agent_conduit::Result<()>> + Send>>,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let seen = Arc::clone(&seen);
        move |record: StreamRecord| {
            let seen = Arc::clone(&seen);
            Box::pin(async move {
                seen.lock().unwrap().push(record);
                Ok(())
            })
                as std::pin::Pin<Box<dyn std::future::Future<Output = agent_conduit::Result<()>> + Send>>
        }
    };
    (seen, handler)
}

#[tokio::test]
async fn full_stream_resolves_with_ordered_events_and_exit_code() {
    let script = r#"
printf '{"type":"system","subtype":"init","session_id":"chat-1"}\n'
printf '{"type":"assistant","message":{"content":[{"type":"text","text":"hi"}]}}\n'
printf '{"type":"result","subtype":"success","result":"done"}\n'
"#;

    let (seen, handler) = collector();
    let outcome = run_agent(
        &sh(script),
        Duration::from_secs(5),
        CancellationToken::new(),
        handler,
    )
    .await
    .expect("run must succeed");

    assert_eq!(outcome.events.len(), 3);
    assert_eq!(outcome.exit_code, Some(0));
    let result = outcome.result.expect("result record observed");
    assert_eq!(result.subtype, "success");
    assert_eq!(result.text.as_deref(), Some("done"));

    let seen = seen.lock().unwrap();
    assert!(matches!(seen[0], StreamRecord::Init { .. }));
    assert!(matches!(seen[1], StreamRecord::Assistant { .. }));
    assert!(matches!(seen[2], StreamRecord::Result(_)));
}

#[tokio::test]
async fn trailing_tool_completion_after_result_is_still_observed() {
    // The process keeps writing after `result`; the reader must not stop
    // at the result record.
    let script = r#"
printf '{"type":"result","subtype":"success"}\n'
sleep 0.1
printf '{"type":"tool_call","subtype":"completed","id":"late-1","tool_call":{"shellToolCall":{"args":{"command":"x"},"result":{"success":{"stdout":"late"}}}}}\n'
"#;

    let (seen, handler) = collector();
    let outcome = run_agent(
        &sh(script),
        Duration::from_secs(5),
        CancellationToken::new(),
        handler,
    )
    .await
    .expect("run must succeed");

    assert_eq!(outcome.events.len(), 2);
    assert!(
        matches!(
            seen.lock().unwrap().last(),
            Some(StreamRecord::ToolCompleted { .. })
        ),
        "the trailing completion must be processed after the result record"
    );
}

#[tokio::test]
async fn exit_without_result_fails_with_stderr_and_exit_code() {
    let script = r#"
printf '{"type":"assistant","message":{"content":[]}}\n'
printf 'agent blew up' >&2
exit 3
"#;

    let (_seen, handler) = collector();
    let outcome = run_agent(
        &sh(script),
        Duration::from_secs(5),
        CancellationToken::new(),
        handler,
    )
    .await;

    match outcome {
        Err(AppError::Agent(msg)) => {
            assert!(msg.contains("without a result record"), "got: {msg}");
            assert!(msg.contains("agent blew up"), "stderr must be included: {msg}");
            assert!(msg.contains('3'), "exit code must be included: {msg}");
        }
        other => panic!("expected Err(AppError::Agent), got: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_line_is_fatal_to_the_run() {
    let script = r#"
printf 'this is not json\n'
printf '{"type":"result","subtype":"success"}\n'
"#;

    let (_seen, handler) = collector();
    let outcome = run_agent(
        &sh(script),
        Duration::from_secs(5),
        CancellationToken::new(),
        handler,
    )
    .await;

    assert!(
        matches!(outcome, Err(AppError::Agent(_))),
        "a malformed line must fail the run, got: {outcome:?}"
    );
}

#[tokio::test]
async fn drain_timeout_bounds_the_wait_for_a_lingering_process() {
    // The process emits its result, closes stdout, then lingers far past
    // the drain timeout. The run must still complete promptly.
    let script = r#"
printf '{"type":"result","subtype":"success"}\n'
exec 1>&-
exec sleep 30
"#;

    let (_seen, handler) = collector();
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        run_agent(
            &sh(script),
            Duration::from_millis(200),
            CancellationToken::new(),
            handler,
        ),
    )
    .await
    .expect("the drain timeout must bound the wait")
    .expect("run must still succeed");

    assert!(outcome.result.is_some());
    assert!(
        outcome.exit_code.is_none(),
        "a force-killed process has no exit code"
    );
}

#[tokio::test]
async fn cancellation_terminates_the_child_and_keeps_observed_events() {
    let script = r#"
printf '{"type":"assistant","message":{"content":[{"type":"text","text":"early"}]}}\n'
exec sleep 30
"#;

    let cancel = CancellationToken::new();
    let (seen, handler) = collector();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        })
    };

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        run_agent(&sh(script), Duration::from_millis(200), cancel, handler),
    )
    .await
    .expect("cancellation must unblock the run");

    canceller.await.unwrap();

    // No result record was ever emitted, so the attempt reports failure —
    // the orchestrator maps this to a cancelled outcome.
    assert!(matches!(outcome, Err(AppError::Agent(_))));
    assert_eq!(
        seen.lock().unwrap().len(),
        1,
        "events processed before cancellation are retained"
    );
}
