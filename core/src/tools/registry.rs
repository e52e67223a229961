// Tool Registry
// Name-keyed lookup table of opaque tool capabilities

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::tools::context::{ToolCallError, ToolInvocation, ToolOutput};
use crate::tools::spec::ToolSpec;

/// Opaque tool capability: a declared parameter contract plus an execute
/// entry point.
///
/// Handlers honor the cancellation token on a best-effort basis; the
/// scheduler imposes no other constraint on their internal behavior.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn execute(
        &self,
        invocation: ToolInvocation,
        cancel: CancellationToken,
    ) -> Result<ToolOutput, ToolCallError>;
}

struct RegisteredTool {
    spec: ToolSpec,
    handler: Arc<dyn ToolHandler>,
}

/// Registry of tools available to the scheduler. Populated before the
/// scheduler is constructed and immutable afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec, handler: Arc<dyn ToolHandler>) {
        let name = spec.name.clone();
        self.tools.insert(name, RegisteredTool { spec, handler });
    }

    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|tool| &tool.spec)
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).map(|tool| Arc::clone(&tool.handler))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn list_specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|tool| tool.spec.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::spec::JsonSchema;
    use std::collections::BTreeMap;

    struct NoopTool;

    #[async_trait]
    impl ToolHandler for NoopTool {
        async fn execute(
            &self,
            _invocation: ToolInvocation,
            _cancel: CancellationToken,
        ) -> Result<ToolOutput, ToolCallError> {
            Ok(ToolOutput::text("ok"))
        }
    }

    #[test]
    fn registered_tool_is_found_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(
            ToolSpec::new("noop", "Does nothing", JsonSchema::object(BTreeMap::new(), &[])),
            Arc::new(NoopTool),
        );

        assert!(registry.contains("noop"));
        assert!(registry.spec("noop").is_some());
        assert!(registry.handler("noop").is_some());
        assert!(!registry.contains("missing"));
    }
}
