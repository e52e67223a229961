// Argument Validation
// Schema checks run during the Validating state; failures are terminal for
// the one call and never have side effects

use serde_json::Value;

use crate::tools::spec::{JsonSchema, ToolSpec};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("arguments must be a JSON object")]
    NotAnObject,
    #[error("missing required argument `{0}`")]
    MissingRequired(String),
    #[error("argument `{name}` has wrong type: expected {expected}")]
    WrongType { name: String, expected: &'static str },
}

/// Validate a call's arguments against the tool's declared contract.
///
/// Required properties must be present and every declared property that is
/// present must match its declared type. Undeclared properties pass
/// through untouched; tools own their own strictness beyond the schema.
pub fn validate_arguments(spec: &ToolSpec, arguments: &Value) -> Result<(), ValidationError> {
    check_value(&spec.input_schema, arguments, "arguments")
}

fn check_value(schema: &JsonSchema, value: &Value, path: &str) -> Result<(), ValidationError> {
    let ok = match schema {
        JsonSchema::String { .. } => value.is_string(),
        JsonSchema::Number { .. } => value.is_number(),
        JsonSchema::Boolean { .. } => value.is_boolean(),
        JsonSchema::Array { items, .. } => {
            let Some(elements) = value.as_array() else {
                return Err(wrong_type(path, schema));
            };
            for (i, element) in elements.iter().enumerate() {
                check_value(items, element, &format!("{path}[{i}]"))?;
            }
            true
        }
        JsonSchema::Object {
            properties,
            required,
        } => {
            let Some(map) = value.as_object() else {
                return if path == "arguments" {
                    Err(ValidationError::NotAnObject)
                } else {
                    Err(wrong_type(path, schema))
                };
            };
            if let Some(required) = required {
                for name in required {
                    if !map.contains_key(name) {
                        return Err(ValidationError::MissingRequired(name.clone()));
                    }
                }
            }
            for (name, property_schema) in properties {
                if let Some(property) = map.get(name) {
                    check_value(property_schema, property, name)?;
                }
            }
            true
        }
    };

    if ok { Ok(()) } else { Err(wrong_type(path, schema)) }
}

fn wrong_type(path: &str, schema: &JsonSchema) -> ValidationError {
    ValidationError::WrongType {
        name: path.to_string(),
        expected: schema.type_name(),
    }
}
