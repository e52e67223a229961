// End-to-end scheduler tests: validation, policy, confirmation, and
// batch completion semantics through the public API.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use warden_config::{ConfirmationMode, PolicyConfig, PolicyDecision, PolicyRule};
use warden_core::confirm::{ConfirmationBus, Topic};
use warden_core::policy::PolicyEngine;
use warden_core::scheduler::ToolCallScheduler;
use warden_core::tools::context::{ToolCallError, ToolInvocation, ToolOutput};
use warden_core::tools::registry::{ToolHandler, ToolRegistry};
use warden_core::tools::spec::{JsonSchema, ToolSpec};
use warden_protocol::{
    ConfirmationMessage, ConfirmationOutcome, ConfirmationResponse, ErrorKind, ToolCallRequest,
    ToolCallStatus, ToolResult,
};

/// Echoes its arguments back. Honors `delay_ms` and stops early when the
/// cancellation token fires during the delay.
struct EchoTool {
    executions: Arc<AtomicUsize>,
}

#[async_trait]
impl ToolHandler for EchoTool {
    async fn execute(
        &self,
        invocation: ToolInvocation,
        cancel: CancellationToken,
    ) -> Result<ToolOutput, ToolCallError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = invocation.arguments.get("delay_ms").and_then(Value::as_u64) {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ToolCallError::Interrupted),
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
            }
        }
        Ok(ToolOutput::json(invocation.arguments))
    }
}

/// Sleeps for `delay_ms` without ever looking at the cancellation token.
struct StubbornTool;

#[async_trait]
impl ToolHandler for StubbornTool {
    async fn execute(
        &self,
        invocation: ToolInvocation,
        _cancel: CancellationToken,
    ) -> Result<ToolOutput, ToolCallError> {
        let delay = invocation
            .arguments
            .get("delay_ms")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(ToolOutput::text("done"))
    }
}

struct FailingTool;

#[async_trait]
impl ToolHandler for FailingTool {
    async fn execute(
        &self,
        _invocation: ToolInvocation,
        _cancel: CancellationToken,
    ) -> Result<ToolOutput, ToolCallError> {
        Err(ToolCallError::Execution("disk on fire".to_string()))
    }
}

fn path_schema() -> JsonSchema {
    let mut properties = BTreeMap::new();
    properties.insert("path".to_string(), JsonSchema::string("File path"));
    JsonSchema::object(properties, &["path"])
}

struct Fixture {
    executions: Arc<AtomicUsize>,
    bus: ConfirmationBus,
    results_rx: mpsc::UnboundedReceiver<Vec<ToolResult>>,
    callback_count: Arc<AtomicUsize>,
    scheduler: Arc<ToolCallScheduler>,
}

fn fixture(rules: Vec<PolicyRule>, mode: ConfirmationMode) -> Fixture {
    let executions = Arc::new(AtomicUsize::new(0));
    let mut registry = ToolRegistry::new();
    registry.register(
        ToolSpec::new("read_file", "Reads a file", path_schema()),
        Arc::new(EchoTool {
            executions: Arc::clone(&executions),
        }),
    );
    registry.register(
        ToolSpec::new("write_file", "Writes a file", path_schema()),
        Arc::new(EchoTool {
            executions: Arc::clone(&executions),
        }),
    );
    registry.register(
        ToolSpec::new("shell", "Runs a command", {
            let mut properties = BTreeMap::new();
            properties.insert("command".to_string(), JsonSchema::string("Command line"));
            JsonSchema::object(properties, &["command"])
        }),
        Arc::new(EchoTool {
            executions: Arc::clone(&executions),
        }),
    );
    registry.register(
        ToolSpec::new("stubborn", "Ignores cancellation", path_schema()),
        Arc::new(StubbornTool),
    );
    registry.register(
        ToolSpec::new("broken", "Always fails", path_schema()),
        Arc::new(FailingTool),
    );

    let policy = PolicyEngine::new(&PolicyConfig {
        rules,
        default_decision: PolicyDecision::AskUser,
    })
    .expect("valid policy");

    let bus = ConfirmationBus::new();
    let (results_tx, results_rx) = mpsc::unbounded_channel();
    let callback_count = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&callback_count);
    let scheduler = ToolCallScheduler::new(
        Arc::new(registry),
        Arc::new(policy),
        bus.clone(),
        mode,
        Arc::new(move |results| {
            count.fetch_add(1, Ordering::SeqCst);
            let _ = results_tx.send(results);
        }),
    );

    Fixture {
        executions,
        bus,
        results_rx,
        callback_count,
        scheduler,
    }
}

fn allow_rule(tool: &str, priority: i32) -> PolicyRule {
    PolicyRule {
        tool: tool.to_string(),
        args: None,
        decision: PolicyDecision::Allow,
        priority,
        reason: None,
    }
}

fn deny_rule(tool: &str, priority: i32) -> PolicyRule {
    PolicyRule {
        tool: tool.to_string(),
        args: None,
        decision: PolicyDecision::Deny,
        priority,
        reason: Some(format!("`{tool}` is blocked here")),
    }
}

/// Answer every confirmation request with the same outcome. Subscribes
/// before returning, so requests published afterwards are never missed.
/// The returned counter tracks how many prompts were issued.
fn spawn_approver(
    bus: &ConfirmationBus,
    outcome: ConfirmationOutcome,
    payload: Option<Value>,
) -> Arc<AtomicUsize> {
    let prompts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&prompts);
    let mut subscription = bus.subscribe(Topic::Requests);
    let bus = bus.clone();
    tokio::spawn(async move {
        while let Some(message) = subscription.recv().await {
            if let ConfirmationMessage::Request(request) = message {
                seen.fetch_add(1, Ordering::SeqCst);
                let mut response = ConfirmationResponse::new(request.correlation_id, outcome);
                if let Some(payload) = payload.clone() {
                    response = response.with_payload(payload);
                }
                bus.publish(Topic::Responses, ConfirmationMessage::Response(response));
            }
        }
    });
    prompts
}

#[tokio::test]
async fn results_arrive_in_request_order() {
    let mut fx = fixture(vec![allow_rule("*", 0)], ConfirmationMode::Delegate);

    fx.scheduler.schedule(
        vec![
            ToolCallRequest::new("c1", "read_file", json!({ "path": "/a", "delay_ms": 40 })),
            ToolCallRequest::new("c2", "read_file", json!({ "path": "/b" })),
            ToolCallRequest::new("c3", "read_file", json!({ "path": "/c", "delay_ms": 15 })),
        ],
        CancellationToken::new(),
    );

    let results = fx.results_rx.recv().await.expect("batch results");
    let ids: Vec<&str> = results.iter().map(|r| r.call_id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2", "c3"]);
    assert!(results.iter().all(|r| r.status == ToolCallStatus::Success));
}

#[tokio::test]
async fn completion_callback_fires_exactly_once() {
    let mut fx = fixture(vec![allow_rule("*", 0)], ConfirmationMode::Delegate);

    fx.scheduler.schedule(
        vec![
            ToolCallRequest::new("c1", "read_file", json!({ "path": "/a" })),
            ToolCallRequest::new("c2", "broken", json!({ "path": "/b" })),
        ],
        CancellationToken::new(),
    );

    let results = fx.results_rx.recv().await.expect("batch results");
    assert_eq!(results.len(), 2);
    // A failed sibling still produces one aggregate callback, not zero and
    // not one per call.
    tokio::task::yield_now().await;
    assert_eq!(fx.callback_count.load(Ordering::SeqCst), 1);
    assert_eq!(results[1].status, ToolCallStatus::Failed);
    assert_eq!(
        results[1].error.as_ref().map(|e| e.kind),
        Some(ErrorKind::Execution)
    );
}

#[tokio::test]
async fn empty_batch_completes_immediately() {
    let mut fx = fixture(vec![], ConfirmationMode::Delegate);

    fx.scheduler.schedule(Vec::new(), CancellationToken::new());

    let results = fx.results_rx.recv().await.expect("batch results");
    assert!(results.is_empty());
    assert_eq!(fx.callback_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pre_cancelled_batch_cancels_every_call() {
    let mut fx = fixture(vec![allow_rule("*", 0)], ConfirmationMode::Delegate);
    let cancel = CancellationToken::new();
    cancel.cancel();

    fx.scheduler.schedule(
        vec![
            ToolCallRequest::new("c1", "read_file", json!({ "path": "/a" })),
            ToolCallRequest::new("c2", "read_file", json!({ "path": "/b" })),
        ],
        cancel,
    );

    let results = fx.results_rx.recv().await.expect("batch results");
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.status == ToolCallStatus::Cancelled));
    assert_eq!(fx.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn policy_deny_blocks_execution() {
    let mut fx = fixture(
        vec![deny_rule("shell", 10), allow_rule("*", 0)],
        ConfirmationMode::Delegate,
    );

    fx.scheduler.schedule(
        vec![ToolCallRequest::new(
            "c1",
            "shell",
            json!({ "command": "rm -rf /" }),
        )],
        CancellationToken::new(),
    );

    let results = fx.results_rx.recv().await.expect("batch results");
    assert_eq!(results[0].status, ToolCallStatus::Failed);
    let error = results[0].error.as_ref().expect("error info");
    assert_eq!(error.kind, ErrorKind::PolicyDenied);
    assert!(error.message.contains("blocked"));
    assert_eq!(fx.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn user_decline_yields_denied_without_execution() {
    let mut fx = fixture(vec![], ConfirmationMode::Delegate);
    let prompts = spawn_approver(&fx.bus, ConfirmationOutcome::Cancel, None);

    fx.scheduler.schedule(
        vec![ToolCallRequest::new(
            "c1",
            "write_file",
            json!({ "path": "/etc/passwd" }),
        )],
        CancellationToken::new(),
    );

    let results = fx.results_rx.recv().await.expect("batch results");
    assert_eq!(results[0].status, ToolCallStatus::Denied);
    assert_eq!(prompts.load(Ordering::SeqCst), 1);
    assert_eq!(fx.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn approved_call_executes() {
    let mut fx = fixture(vec![], ConfirmationMode::Delegate);
    spawn_approver(&fx.bus, ConfirmationOutcome::ProceedOnce, None);

    fx.scheduler.schedule(
        vec![ToolCallRequest::new(
            "c1",
            "write_file",
            json!({ "path": "/tmp/out" }),
        )],
        CancellationToken::new(),
    );

    let results = fx.results_rx.recv().await.expect("batch results");
    assert_eq!(results[0].status, ToolCallStatus::Success);
    assert_eq!(results[0].output, Some(json!({ "path": "/tmp/out" })));
}

#[tokio::test]
async fn proceed_always_skips_the_second_prompt() {
    let fx = fixture(vec![], ConfirmationMode::Delegate);
    let prompts = spawn_approver(&fx.bus, ConfirmationOutcome::ProceedAlways, None);

    let request = ToolCallRequest::new("c1", "write_file", json!({ "path": "/tmp/out" }));
    let first = fx
        .scheduler
        .schedule_single(request, CancellationToken::new())
        .await;
    assert_eq!(first.status, ToolCallStatus::Success);

    let request = ToolCallRequest::new("c2", "write_file", json!({ "path": "/tmp/out" }));
    let second = fx
        .scheduler
        .schedule_single(request, CancellationToken::new())
        .await;
    assert_eq!(second.status, ToolCallStatus::Success);
    assert_eq!(prompts.load(Ordering::SeqCst), 1);

    // Different arguments are a different action and prompt again.
    let request = ToolCallRequest::new("c3", "write_file", json!({ "path": "/tmp/other" }));
    let third = fx
        .scheduler
        .schedule_single(request, CancellationToken::new())
        .await;
    assert_eq!(third.status, ToolCallStatus::Success);
    assert_eq!(prompts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn modified_arguments_are_validated_and_adopted() {
    let fx = fixture(vec![], ConfirmationMode::Delegate);
    spawn_approver(
        &fx.bus,
        ConfirmationOutcome::ProceedOnce,
        Some(json!({ "path": "/tmp/redirected" })),
    );

    let request = ToolCallRequest::new("c1", "write_file", json!({ "path": "/etc/passwd" }));
    let result = fx
        .scheduler
        .schedule_single(request, CancellationToken::new())
        .await;

    assert_eq!(result.status, ToolCallStatus::Success);
    assert_eq!(result.output, Some(json!({ "path": "/tmp/redirected" })));
}

#[tokio::test]
async fn invalid_modified_arguments_fail_validation() {
    let fx = fixture(vec![], ConfirmationMode::Delegate);
    // The edited payload drops the required `path` field.
    spawn_approver(
        &fx.bus,
        ConfirmationOutcome::ProceedOnce,
        Some(json!({ "paht": "/tmp/typo" })),
    );

    let request = ToolCallRequest::new("c1", "write_file", json!({ "path": "/tmp/out" }));
    let result = fx
        .scheduler
        .schedule_single(request, CancellationToken::new())
        .await;

    assert_eq!(result.status, ToolCallStatus::Failed);
    let error = result.error.expect("error info");
    assert_eq!(error.kind, ErrorKind::Validation);
    assert_eq!(fx.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelling_the_batch_releases_an_awaiting_call() {
    let mut fx = fixture(vec![allow_rule("stubborn", 1)], ConfirmationMode::Delegate);
    // No approver attached: the write_file call parks in AwaitingApproval
    // until the batch token fires.
    let cancel = CancellationToken::new();

    fx.scheduler.schedule(
        vec![
            ToolCallRequest::new("c1", "stubborn", json!({ "path": "/a", "delay_ms": 60 })),
            ToolCallRequest::new("c2", "write_file", json!({ "path": "/b" })),
        ],
        cancel.clone(),
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let results = fx.results_rx.recv().await.expect("batch results");
    // The executing sibling ignores the token and runs to completion.
    assert_eq!(results[0].status, ToolCallStatus::Success);
    assert_eq!(results[1].status, ToolCallStatus::Cancelled);
}

#[tokio::test]
async fn cooperative_tool_reports_cancelled_not_failed() {
    let mut fx = fixture(vec![allow_rule("*", 0)], ConfirmationMode::Delegate);
    let cancel = CancellationToken::new();

    fx.scheduler.schedule(
        vec![ToolCallRequest::new(
            "c1",
            "read_file",
            json!({ "path": "/a", "delay_ms": 200 }),
        )],
        cancel.clone(),
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let results = fx.results_rx.recv().await.expect("batch results");
    assert_eq!(results[0].status, ToolCallStatus::Cancelled);
}

#[tokio::test]
async fn unknown_tool_and_bad_arguments_fail_validation() {
    let mut fx = fixture(vec![allow_rule("*", 0)], ConfirmationMode::Delegate);

    fx.scheduler.schedule(
        vec![
            ToolCallRequest::new("c1", "teleport", json!({})),
            ToolCallRequest::new("c2", "read_file", json!({ "path": 42 })),
            ToolCallRequest::new("c3", "read_file", json!({})),
        ],
        CancellationToken::new(),
    );

    let results = fx.results_rx.recv().await.expect("batch results");
    for result in &results {
        assert_eq!(result.status, ToolCallStatus::Failed);
        assert_eq!(
            result.error.as_ref().map(|e| e.kind),
            Some(ErrorKind::Validation)
        );
    }
    assert_eq!(fx.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn skip_mode_runs_without_prompting() {
    let fx = fixture(vec![], ConfirmationMode::Skip);
    // No approver exists; Skip mode never publishes a request.

    let request = ToolCallRequest::new("c1", "write_file", json!({ "path": "/tmp/out" }));
    let result = fx
        .scheduler
        .schedule_single(request, CancellationToken::new())
        .await;

    assert_eq!(result.status, ToolCallStatus::Success);
    assert_eq!(fx.executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn no_bookkeeping_survives_a_finished_batch() {
    let mut fx = fixture(vec![], ConfirmationMode::Delegate);
    spawn_approver(&fx.bus, ConfirmationOutcome::Cancel, None);

    fx.scheduler.schedule(
        vec![
            ToolCallRequest::new("c1", "read_file", json!({ "path": "/a" })),
            ToolCallRequest::new("c2", "write_file", json!({ "path": "/b" })),
        ],
        CancellationToken::new(),
    );

    let results = fx.results_rx.recv().await.expect("batch results");
    assert_eq!(results.len(), 2);
    assert!(fx.scheduler.active_calls().is_empty());
    assert_eq!(fx.bus.subscriber_count(Topic::Responses), 0);
}

#[tokio::test]
async fn legacy_boolean_approval_still_works() {
    let fx = fixture(vec![], ConfirmationMode::Delegate);
    let mut subscription = fx.bus.subscribe(Topic::Requests);
    let bus = fx.bus.clone();
    tokio::spawn(async move {
        while let Some(message) = subscription.recv().await {
            if let ConfirmationMessage::Request(request) = message {
                bus.publish(
                    Topic::Responses,
                    ConfirmationMessage::Response(ConfirmationResponse::legacy(
                        request.correlation_id,
                        true,
                    )),
                );
            }
        }
    });

    let request = ToolCallRequest::new("c1", "write_file", json!({ "path": "/tmp/out" }));
    let result = fx
        .scheduler
        .schedule_single(request, CancellationToken::new())
        .await;
    assert_eq!(result.status, ToolCallStatus::Success);
}
