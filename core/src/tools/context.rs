// Tool Invocation Context

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Invocation payload passed to a tool handler after validation.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolInvocation {
    pub fn parse_arguments<T: DeserializeOwned>(&self) -> Result<T, ToolCallError> {
        serde_json::from_value(self.arguments.clone()).map_err(|e| {
            ToolCallError::InvalidArguments(format!("invalid arguments for {}: {e}", self.name))
        })
    }
}

/// Output from a tool handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: Value,
}

impl ToolOutput {
    pub fn json(content: Value) -> Self {
        Self { content }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Value::String(content.into()),
        }
    }
}

/// Failures raised by tool handlers or dispatch.
#[derive(Debug, Clone)]
pub enum ToolCallError {
    InvalidArguments(String),
    ToolNotFound(String),
    Execution(String),
    /// The handler observed the cancellation signal and stopped early.
    Interrupted,
}

impl fmt::Display for ToolCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolCallError::InvalidArguments(msg) => write!(f, "invalid arguments: {msg}"),
            ToolCallError::ToolNotFound(name) => write!(f, "tool not found: {name}"),
            ToolCallError::Execution(msg) => write!(f, "{msg}"),
            ToolCallError::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for ToolCallError {}
