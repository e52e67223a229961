// Configuration Loading
// TOML parsing plus startup-time validation; malformed rules never reach
// the policy engine

use std::path::Path;

use tracing::debug;

use crate::types::{PolicyConfig, PolicyDecision};

/// Startup-fatal configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse policy config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("rule {index}: {reason}")]
    InvalidRule { index: usize, reason: String },
    #[error("default_decision must not be `allow`; use `ask_user` or `deny`")]
    AllowByDefault,
}

impl PolicyConfig {
    /// Parse and validate a TOML policy document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: PolicyConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate rule patterns and the default decision. Called by every
    /// loading path so the engine only ever sees a valid rule set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_decision == PolicyDecision::Allow {
            return Err(ConfigError::AllowByDefault);
        }
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.tool.trim().is_empty() {
                return Err(ConfigError::InvalidRule {
                    index,
                    reason: "tool pattern must not be empty".to_string(),
                });
            }
            if let Err(e) = glob::Pattern::new(&rule.tool) {
                return Err(ConfigError::InvalidRule {
                    index,
                    reason: format!("invalid tool pattern `{}`: {e}", rule.tool),
                });
            }
        }
        Ok(())
    }
}

/// Load a policy configuration from a TOML file.
pub fn load_policy_config(path: &Path) -> Result<PolicyConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config = PolicyConfig::from_toml_str(&raw)?;
    debug!(
        rules = config.rules.len(),
        path = %path.display(),
        "loaded policy config"
    );
    Ok(config)
}
