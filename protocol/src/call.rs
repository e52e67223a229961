// Tool Call Types
// Requests, lifecycle states, and terminal results for scheduled tool calls

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool call requested by the model. Immutable once produced; `call_id`
/// is unique within a batch and is the correlation key for the call's
/// whole lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    /// Raw arguments as produced by the model.
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Lifecycle state of a scheduled tool call.
///
/// Transitions run strictly forward:
/// `Validating -> {AwaitingApproval | Executing} -> terminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Validating,
    AwaitingApproval,
    Executing,
    Success,
    Denied,
    Failed,
    Cancelled,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Denied | Self::Failed | Self::Cancelled
        )
    }
}

/// Terminal status carried on a tool result.
///
/// `Denied` and `Cancelled` mean the user or operator declined the action;
/// `Failed` means the action was attempted (or blocked by policy) and did
/// not succeed. The distinction lets the model decide whether to retry,
/// ask differently, or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Success,
    Failed,
    Denied,
    Cancelled,
}

/// Stable error classification on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    PolicyDenied,
    ConfirmationCancelled,
    Execution,
    Internal,
}

/// Structured error payload attached to non-success results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

/// Terminal result of one tool call, delivered back to the model layer in
/// original request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub status: ToolCallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, tool_name: impl Into<String>, output: Value) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            status: ToolCallStatus::Success,
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            status: ToolCallStatus::Failed,
            output: None,
            error: Some(ErrorInfo {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn denied(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            status: ToolCallStatus::Denied,
            output: None,
            error: Some(ErrorInfo {
                kind: ErrorKind::ConfirmationCancelled,
                message: message.into(),
            }),
        }
    }

    pub fn cancelled(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            status: ToolCallStatus::Cancelled,
            output: None,
            error: Some(ErrorInfo {
                kind: ErrorKind::ConfirmationCancelled,
                message: message.into(),
            }),
        }
    }
}
