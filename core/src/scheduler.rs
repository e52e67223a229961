// Tool Call Scheduler
// Owns the lifecycle of every tool call in a batch: validation, policy,
// approval, execution, and ordered result aggregation

use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use warden_config::{ConfirmationMode, PolicyDecision};
use warden_protocol::{
    CallState, ConfirmationMessage, ConfirmationOutcome, ConfirmationRequest, ErrorKind,
    ToolCallRequest, ToolResult,
};

use crate::confirm::{ConfirmError, ConfirmationBus, ConfirmationCoordinator, Topic};
use crate::policy::PolicyEngine;
use crate::tools::context::ToolInvocation;
use crate::tools::registry::ToolRegistry;
use crate::tools::validation;

/// Callback invoked exactly once per batch, with results in original
/// request order.
pub type OnAllComplete = Arc<dyn Fn(Vec<ToolResult>) + Send + Sync>;

/// Outcome of the approval step, before execution.
enum Approval {
    Proceed { modified: Option<Value> },
    Declined,
}

/// Schedules batches of tool calls produced by one model turn.
///
/// All state is constructor-injected and instance-owned; the only thing
/// shared across schedulers is the confirmation bus itself. Each instance
/// carries a session id that namespaces its correlation ids, so several
/// sessions can share one process-wide bus without cross-talk.
pub struct ToolCallScheduler {
    session_id: String,
    registry: Arc<ToolRegistry>,
    policy: Arc<PolicyEngine>,
    bus: ConfirmationBus,
    coordinator: ConfirmationCoordinator,
    mode: ConfirmationMode,
    on_all_complete: OnAllComplete,
    /// Live call states, insertion-ordered. Entries exist from schedule
    /// until batch completion; an empty map means no pending state.
    active: Mutex<IndexMap<String, CallState>>,
}

impl ToolCallScheduler {
    pub fn new(
        registry: Arc<ToolRegistry>,
        policy: Arc<PolicyEngine>,
        bus: ConfirmationBus,
        mode: ConfirmationMode,
        on_all_complete: OnAllComplete,
    ) -> Arc<Self> {
        let coordinator = ConfirmationCoordinator::new(bus.clone());
        Arc::new(Self {
            session_id: Uuid::new_v4().to_string(),
            registry,
            policy,
            bus,
            coordinator,
            mode,
            on_all_complete,
            active: Mutex::new(IndexMap::new()),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Non-terminal bookkeeping currently held by the scheduler. Empty
    /// once every scheduled batch has completed.
    pub fn active_calls(&self) -> Vec<(String, CallState)> {
        self.lock_active()
            .iter()
            .map(|(id, state)| (id.clone(), *state))
            .collect()
    }

    /// Schedule a batch. Returns immediately; every call runs concurrently
    /// and `on_all_complete` fires exactly once when all of them reach a
    /// terminal state, in original request order. The cancellation token
    /// is scoped to the whole batch.
    pub fn schedule(self: &Arc<Self>, requests: Vec<ToolCallRequest>, cancel: CancellationToken) {
        if requests.is_empty() {
            (self.on_all_complete)(Vec::new());
            return;
        }

        info!(
            session_id = %self.session_id,
            count = requests.len(),
            "scheduling tool call batch"
        );
        {
            let mut active = self.lock_active();
            for request in &requests {
                active.insert(request.call_id.clone(), CallState::Validating);
            }
        }

        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            let scheduler = Arc::clone(self);
            let cancel = cancel.clone();
            let call_id = request.call_id.clone();
            let tool_name = request.tool_name.clone();
            let handle = tokio::spawn(async move { scheduler.run_call(request, cancel).await });
            handles.push((call_id, tool_name, handle));
        }

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut results = Vec::with_capacity(handles.len());
            for (call_id, tool_name, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(%call_id, "tool call task aborted: {e}");
                        ToolResult::failed(
                            call_id,
                            tool_name,
                            ErrorKind::Internal,
                            format!("tool call task aborted: {e}"),
                        )
                    }
                };
                results.push(result);
            }
            {
                let mut active = scheduler.lock_active();
                for result in &results {
                    active.shift_remove(&result.call_id);
                }
            }
            debug!(count = results.len(), "tool call batch complete");
            (scheduler.on_all_complete)(results);
        });
    }

    /// Single-call convenience for headless callers: runs one request
    /// through the full pipeline and resolves with its result directly,
    /// without going through `on_all_complete`.
    pub async fn schedule_single(
        self: &Arc<Self>,
        request: ToolCallRequest,
        cancel: CancellationToken,
    ) -> ToolResult {
        self.lock_active()
            .insert(request.call_id.clone(), CallState::Validating);
        let result = self.run_call(request, cancel).await;
        self.lock_active().shift_remove(&result.call_id);
        result
    }

    /// Drive one call through the state machine to a terminal result.
    async fn run_call(&self, request: ToolCallRequest, cancel: CancellationToken) -> ToolResult {
        let ToolCallRequest {
            call_id,
            tool_name,
            arguments,
        } = request;

        self.set_state(&call_id, CallState::Validating);
        if cancel.is_cancelled() {
            self.set_state(&call_id, CallState::Cancelled);
            return ToolResult::cancelled(call_id, tool_name, "batch cancelled before start");
        }

        // Validating: schema check against the declared contract. No side
        // effects have occurred on any failure path here.
        let Some(spec) = self.registry.spec(&tool_name) else {
            self.set_state(&call_id, CallState::Failed);
            return ToolResult::failed(
                call_id,
                &tool_name,
                ErrorKind::Validation,
                format!("unknown tool `{tool_name}`"),
            );
        };
        if let Err(e) = validation::validate_arguments(spec, &arguments) {
            self.set_state(&call_id, CallState::Failed);
            return ToolResult::failed(call_id, tool_name, ErrorKind::Validation, e.to_string());
        }

        // Policy lookup.
        let decision = self.policy.evaluate(&tool_name, &arguments);
        debug!(
            %call_id,
            %tool_name,
            decision = ?decision.decision,
            reason = %decision.reason,
            "policy decision"
        );

        let mut arguments = arguments;
        match decision.decision {
            PolicyDecision::Allow => {}
            PolicyDecision::Deny => {
                // Execution never starts for a policy deny.
                self.set_state(&call_id, CallState::Failed);
                return ToolResult::failed(
                    call_id,
                    tool_name,
                    ErrorKind::PolicyDenied,
                    decision.reason,
                );
            }
            PolicyDecision::AskUser => match self.mode {
                ConfirmationMode::Skip => {
                    debug!(call_id, "confirmation skipped by configuration");
                }
                ConfirmationMode::Delegate => {
                    match self
                        .await_approval(&call_id, &tool_name, &arguments, &cancel)
                        .await
                    {
                        Ok(Approval::Proceed { modified }) => {
                            if let Some(modified) = modified {
                                // The approver edited the arguments; they
                                // go through the same schema check as the
                                // originals.
                                if let Err(e) = validation::validate_arguments(spec, &modified) {
                                    self.set_state(&call_id, CallState::Failed);
                                    return ToolResult::failed(
                                        call_id,
                                        tool_name,
                                        ErrorKind::Validation,
                                        format!("modified arguments rejected: {e}"),
                                    );
                                }
                                arguments = modified;
                            }
                        }
                        Ok(Approval::Declined) => {
                            self.set_state(&call_id, CallState::Denied);
                            return ToolResult::denied(
                                call_id,
                                tool_name,
                                "the user declined this action",
                            );
                        }
                        Err(ConfirmError::Cancelled) => {
                            self.set_state(&call_id, CallState::Cancelled);
                            return ToolResult::cancelled(
                                call_id,
                                tool_name,
                                "cancelled while awaiting approval",
                            );
                        }
                        Err(e @ ConfirmError::Leak(_)) => {
                            self.set_state(&call_id, CallState::Failed);
                            return ToolResult::failed(
                                call_id,
                                tool_name,
                                ErrorKind::Internal,
                                e.to_string(),
                            );
                        }
                    }
                }
            },
        }

        // Executing: the tool is opaque; cancellation is cooperative.
        self.set_state(&call_id, CallState::Executing);
        let Some(handler) = self.registry.handler(&tool_name) else {
            self.set_state(&call_id, CallState::Failed);
            return ToolResult::failed(
                call_id,
                &tool_name,
                ErrorKind::Validation,
                format!("unknown tool `{tool_name}`"),
            );
        };
        let invocation = ToolInvocation {
            call_id: call_id.clone(),
            name: tool_name.clone(),
            arguments,
        };
        match handler.execute(invocation, cancel.child_token()).await {
            Ok(output) => {
                self.set_state(&call_id, CallState::Success);
                ToolResult::success(call_id, tool_name, output.content)
            }
            Err(_) if cancel.is_cancelled() => {
                self.set_state(&call_id, CallState::Cancelled);
                ToolResult::cancelled(call_id, tool_name, "cancelled during execution")
            }
            Err(e) => {
                self.set_state(&call_id, CallState::Failed);
                ToolResult::failed(call_id, tool_name, ErrorKind::Execution, e.to_string())
            }
        }
    }

    /// Publish a confirmation request and wait for its correlated
    /// response. The coordinator subscribes before we publish, so the
    /// response cannot be lost to ordering.
    async fn await_approval(
        &self,
        call_id: &str,
        tool_name: &str,
        arguments: &Value,
        cancel: &CancellationToken,
    ) -> Result<Approval, ConfirmError> {
        self.set_state(call_id, CallState::AwaitingApproval);

        // Correlation ids are unique process-wide, not just per batch:
        // the bus is shared by every session in the process.
        let correlation_id = format!("{}:{call_id}", self.session_id);
        let pending = self.coordinator.begin(&correlation_id)?;

        let request = ConfirmationRequest {
            correlation_id,
            tool_name: tool_name.to_string(),
            arguments: arguments.clone(),
            proposed_action: format!("run tool `{tool_name}`"),
        };
        let delivered = self.bus.publish(Topic::Requests, ConfirmationMessage::Request(request));
        if delivered == 0 {
            warn!(
                call_id,
                tool_name, "no approver subscribed to confirmation requests; only cancellation can release this call"
            );
        }

        let reply = pending.wait(cancel).await?;
        match reply.outcome {
            ConfirmationOutcome::ProceedOnce => Ok(Approval::Proceed {
                modified: reply.payload,
            }),
            ConfirmationOutcome::ProceedAlways => {
                // Future identical calls skip the prompt for the rest of
                // the session.
                self.policy.allow_for_session(tool_name, arguments);
                Ok(Approval::Proceed {
                    modified: reply.payload,
                })
            }
            ConfirmationOutcome::Cancel => Ok(Approval::Declined),
        }
    }

    fn set_state(&self, call_id: &str, state: CallState) {
        let mut active = self.lock_active();
        if let Some(entry) = active.get_mut(call_id) {
            debug_assert!(
                !entry.is_terminal(),
                "call {call_id} transitioned after reaching a terminal state"
            );
            *entry = state;
        }
        debug!(call_id, ?state, "tool call state");
    }

    fn lock_active(&self) -> MutexGuard<'_, IndexMap<String, CallState>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
