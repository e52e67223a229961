// Confirmation Wire Contract
// Messages exchanged between the scheduler and approval front ends

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    /// Approve this call only.
    ProceedOnce,
    /// Approve this call and identical future calls for the session.
    ProceedAlways,
    /// Decline the call.
    Cancel,
}

/// Approval request published on the bus. Any subscriber capable of
/// receiving a request and eventually publishing exactly one matching
/// response is a valid approver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub correlation_id: String,
    pub tool_name: String,
    pub arguments: Value,
    /// Human-readable description of what would run, for prompt display.
    pub proposed_action: String,
}

/// Approval response published by whichever approver is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationResponse {
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ConfirmationOutcome>,
    /// Legacy boolean form. Migration shim only: `true` maps to
    /// [`ConfirmationOutcome::ProceedOnce`], `false` to `Cancel`, and it is
    /// ignored whenever `outcome` is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
    /// Modified arguments supplied by the approver; the scheduler adopts
    /// them (after re-validation) in place of the requested arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ConfirmationResponse {
    pub fn new(correlation_id: impl Into<String>, outcome: ConfirmationOutcome) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: Some(outcome),
            confirmed: None,
            payload: None,
        }
    }

    /// Legacy boolean response shape.
    pub fn legacy(correlation_id: impl Into<String>, confirmed: bool) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: None,
            confirmed: Some(confirmed),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Effective outcome after applying the legacy shim. A response with
    /// neither field resolves to `Cancel` (fail closed).
    pub fn resolved_outcome(&self) -> ConfirmationOutcome {
        match (self.outcome, self.confirmed) {
            (Some(outcome), _) => outcome,
            (None, Some(true)) => ConfirmationOutcome::ProceedOnce,
            (None, Some(false)) | (None, None) => ConfirmationOutcome::Cancel,
        }
    }
}

/// Union of confirmation messages carried on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmationMessage {
    Request(ConfirmationRequest),
    Response(ConfirmationResponse),
}
