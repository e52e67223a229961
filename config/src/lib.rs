// Warden Configuration
// Policy rules and confirmation settings, validated at startup

pub mod loader;
pub mod types;

pub use loader::{load_policy_config, ConfigError};
pub use types::{ConfirmationMode, PolicyConfig, PolicyDecision, PolicyRule};
