// Tool Specs
// Declarative parameter contracts used during the Validating state

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// JSON schema representation for tool parameter contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonSchema {
    String {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Number {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Boolean {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Array {
        items: Box<JsonSchema>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Object {
        properties: BTreeMap<String, JsonSchema>,
        #[serde(skip_serializing_if = "Option::is_none")]
        required: Option<Vec<String>>,
    },
}

impl JsonSchema {
    pub fn string(description: &str) -> Self {
        JsonSchema::String {
            description: Some(description.to_string()),
        }
    }

    pub fn number(description: &str) -> Self {
        JsonSchema::Number {
            description: Some(description.to_string()),
        }
    }

    pub fn boolean(description: &str) -> Self {
        JsonSchema::Boolean {
            description: Some(description.to_string()),
        }
    }

    pub fn array(items: JsonSchema, description: &str) -> Self {
        JsonSchema::Array {
            items: Box::new(items),
            description: Some(description.to_string()),
        }
    }

    pub fn object(properties: BTreeMap<String, JsonSchema>, required: &[&str]) -> Self {
        JsonSchema::Object {
            properties,
            required: if required.is_empty() {
                None
            } else {
                Some(required.iter().map(|s| s.to_string()).collect())
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            JsonSchema::String { .. } => "string",
            JsonSchema::Number { .. } => "number",
            JsonSchema::Boolean { .. } => "boolean",
            JsonSchema::Array { .. } => "array",
            JsonSchema::Object { .. } => "object",
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
    }
}

/// Declared contract of a registered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: JsonSchema,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: JsonSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}
