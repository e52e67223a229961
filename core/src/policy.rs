// Policy Engine
// Pure decision function over configured rules plus the session allow-list

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use glob::Pattern;
use serde_json::Value;
use tracing::debug;

use warden_config::{PolicyConfig, PolicyDecision, PolicyRule};

/// A decision with its audit reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub decision: PolicyDecision,
    pub reason: String,
}

/// Startup-fatal policy construction errors. At evaluation time the engine
/// is already valid; `evaluate` is total.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("rule {index}: invalid tool pattern `{pattern}`: {source}")]
    InvalidPattern {
        index: usize,
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("default_decision must not be `allow`")]
    AllowByDefault,
}

struct CompiledRule {
    pattern: Pattern,
    tool: String,
    args: Option<BTreeMap<String, Value>>,
    decision: PolicyDecision,
    priority: i32,
    reason: String,
}

impl CompiledRule {
    fn matches(&self, tool_name: &str, arguments: &Value) -> bool {
        if !self.pattern.matches(tool_name) {
            return false;
        }
        let Some(expected) = &self.args else {
            return true;
        };
        let Some(map) = arguments.as_object() else {
            return false;
        };
        expected
            .iter()
            .all(|(key, value)| map.get(key) == Some(value))
    }
}

fn compile(index: usize, rule: &PolicyRule) -> Result<CompiledRule, PolicyError> {
    let pattern = Pattern::new(&rule.tool).map_err(|source| PolicyError::InvalidPattern {
        index,
        pattern: rule.tool.clone(),
        source,
    })?;
    let reason = rule.reason.clone().unwrap_or_else(|| {
        format!(
            "rule `{}` (priority {}) says {:?}",
            rule.tool, rule.priority, rule.decision
        )
    });
    Ok(CompiledRule {
        pattern,
        tool: rule.tool.clone(),
        args: rule.args.clone(),
        decision: rule.decision,
        priority: rule.priority,
        reason,
    })
}

/// Evaluates tool calls against the static rule set and the session-scoped
/// allow-list. Safe to call concurrently from multiple schedulers; the
/// allow-list is the only mutable state and sits behind one mutex.
pub struct PolicyEngine {
    /// Sorted by priority descending; configuration order within a priority.
    rules: Vec<CompiledRule>,
    default_decision: PolicyDecision,
    session_allowlist: Mutex<HashSet<String>>,
}

impl PolicyEngine {
    /// Compile the rule set once. Malformed configuration is a startup
    /// error, never a per-call one.
    pub fn new(config: &PolicyConfig) -> Result<Self, PolicyError> {
        if config.default_decision == PolicyDecision::Allow {
            return Err(PolicyError::AllowByDefault);
        }
        let mut rules = Vec::with_capacity(config.rules.len());
        for (index, rule) in config.rules.iter().enumerate() {
            rules.push(compile(index, rule)?);
        }
        // Stable sort keeps configuration order within equal priorities.
        rules.sort_by_key(|rule| std::cmp::Reverse(rule.priority));
        Ok(Self {
            rules,
            default_decision: config.default_decision,
            session_allowlist: Mutex::new(HashSet::new()),
        })
    }

    /// Evaluate one tool call. Total: every input yields exactly one of
    /// Allow / Deny / AskUser with a reason.
    pub fn evaluate(&self, tool_name: &str, arguments: &Value) -> Decision {
        if self.session_allows(tool_name, arguments) {
            return Decision {
                decision: PolicyDecision::Allow,
                reason: format!("`{tool_name}` was approved for this session"),
            };
        }

        let mut hit: Option<&CompiledRule> = None;
        for rule in &self.rules {
            if let Some(first) = hit {
                if rule.priority < first.priority || first.decision == PolicyDecision::Deny {
                    break;
                }
                // Deny takes precedence over a non-deny match at the same
                // priority regardless of configuration order.
                if rule.decision == PolicyDecision::Deny && rule.matches(tool_name, arguments) {
                    hit = Some(rule);
                }
                continue;
            }
            if rule.matches(tool_name, arguments) {
                hit = Some(rule);
            }
        }

        match hit {
            Some(rule) => Decision {
                decision: rule.decision,
                reason: rule.reason.clone(),
            },
            None => Decision {
                decision: self.default_decision,
                reason: format!(
                    "no rule matched `{tool_name}`; default decision is {:?}",
                    self.default_decision
                ),
            },
        }
    }

    /// Record a `ProceedAlways` outcome: identical future calls (same tool,
    /// same arguments) evaluate to Allow for the rest of the session.
    pub fn allow_for_session(&self, tool_name: &str, arguments: &Value) {
        let key = allowlist_key(tool_name, arguments);
        debug!(tool_name, "adding session allow-list entry");
        self.lock_allowlist().insert(key);
    }

    fn session_allows(&self, tool_name: &str, arguments: &Value) -> bool {
        self.lock_allowlist()
            .contains(&allowlist_key(tool_name, arguments))
    }

    fn lock_allowlist(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        match self.session_allowlist.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[cfg(test)]
    fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

// Allow-list entries key on the serialized (tool, arguments) pair, so only
// byte-identical argument payloads match.
fn allowlist_key(tool_name: &str, arguments: &Value) -> String {
    format!("{tool_name}\u{1f}{arguments}")
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("rules", &self.rules.iter().map(|r| &r.tool).collect::<Vec<_>>())
            .field("default_decision", &self.default_decision)
            .finish_non_exhaustive()
    }
}
