// Configuration Types
// Policy rule definitions and confirmation strategy settings

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A policy decision for a matched tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    Allow,
    Deny,
    AskUser,
}

/// One static policy rule. Rules are evaluated highest priority first;
/// within a priority, configuration order decides, except that an explicit
/// `deny` is never overridden by an `allow` at the same priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Glob pattern over tool names (`"shell"`, `"mcp_*"`, `"*"`).
    pub tool: String,
    /// Exact-match subset over the call's arguments. A rule with
    /// `args = { path = "/tmp" }` matches any call whose arguments contain
    /// that key with that value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<BTreeMap<String, serde_json::Value>>,
    pub decision: PolicyDecision,
    #[serde(default)]
    pub priority: i32,
    /// Reason surfaced with the decision for audit/UI display; a default
    /// is derived from the rule when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Ordered rule list plus the fail-closed default decision.
///
/// The default decision applies when no rule matches. `ask_user` is the
/// only safe default; `allow` is rejected at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    #[serde(default = "default_decision")]
    pub default_decision: PolicyDecision,
}

fn default_decision() -> PolicyDecision {
    PolicyDecision::AskUser
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_decision: PolicyDecision::AskUser,
        }
    }
}

/// How the scheduler solicits approval when policy says `ask_user`.
///
/// Interactive prompts and delegated remote listeners are both just bus
/// subscribers; the scheduler does not distinguish them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationMode {
    /// Publish a confirmation request on the bus and wait for a response.
    #[default]
    Delegate,
    /// Skip confirmation entirely; `ask_user` behaves as a direct allow.
    Skip,
}
