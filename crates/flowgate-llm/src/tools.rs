//! Locally executed tools the model may call during a generation.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use flowgate_utils::error::{GenerationError, SchemaError};

use crate::schema::Schema;
use crate::types::{ToolCallRequest, ToolDefinition};

/// Tool implementation: validated arguments in, JSON output out.
pub type ToolFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

#[derive(Clone)]
struct Tool {
    description: String,
    input: Schema,
    handler: ToolFn,
}

/// Named set of tools offered for one generation.
///
/// Tools are pure functions of their arguments; the registry is immutable once
/// shared and can be reused across generations.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<(String, Tool)>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Its input schema becomes the declared parameters.
    ///
    /// # Errors
    ///
    /// `SchemaError::InvalidDefinition` if a tool with the same name exists.
    pub fn register<F>(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input: Schema,
        handler: F,
    ) -> Result<Self, SchemaError>
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(SchemaError::InvalidDefinition {
                schema: input.name().to_string(),
                reason: format!("tool '{name}' registered twice"),
            });
        }
        self.tools.push((
            name,
            Tool {
                description: description.into(),
                input,
                handler: Arc::new(handler),
            },
        ));
        Ok(self)
    }

    fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Declarations in registration order, as sent to the provider.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|(name, tool)| ToolDefinition {
                name: name.clone(),
                description: tool.description.clone(),
                parameters: tool.input.to_json_schema(),
            })
            .collect()
    }

    /// Execute a requested call.
    ///
    /// # Errors
    ///
    /// - `GenerationError::UnknownTool` for names not in the registry
    /// - `GenerationError::Schema` when arguments do not match the input schema
    /// - `GenerationError::ToolFailed` when the tool itself reports an error
    pub fn call(&self, request: &ToolCallRequest) -> Result<Value, GenerationError> {
        let tool = self
            .get(&request.name)
            .ok_or_else(|| GenerationError::UnknownTool {
                name: request.name.clone(),
                available: self.names(),
            })?;

        let args = tool.input.parse(request.arguments.clone())?.into_json();
        debug!(tool = %request.name, call_id = %request.id, "Executing tool call");

        (tool.handler)(&args).map_err(|reason| GenerationError::ToolFailed {
            name: request.name.clone(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        let input = Schema::builder("add_args")
            .field("a", FieldType::Integer)
            .field("b", FieldType::Integer)
            .build()
            .unwrap();
        ToolRegistry::new()
            .register("add", "Add two integers", input, |args| {
                let a = args["a"].as_i64().ok_or("a missing")?;
                let b = args["b"].as_i64().ok_or("b missing")?;
                a.checked_add(b)
                    .map(|sum| json!({"sum": sum}))
                    .ok_or_else(|| "overflow".to_string())
            })
            .unwrap()
    }

    fn request(name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    #[test]
    fn test_call_registered_tool() {
        let out = registry().call(&request("add", json!({"a": 2, "b": 3}))).unwrap();
        assert_eq!(out, json!({"sum": 5}));
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let err = registry()
            .call(&request("delete_everything", json!({})))
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::UnknownTool {
                name: "delete_everything".to_string(),
                available: vec!["add".to_string()],
            }
        );
    }

    #[test]
    fn test_nonconforming_arguments_are_schema_violations() {
        let err = registry()
            .call(&request("add", json!({"a": 2, "b": 3, "c": 4})))
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Schema(SchemaError::UnexpectedField { .. })
        ));
    }

    #[test]
    fn test_tool_failure_is_reported() {
        let err = registry()
            .call(&request("add", json!({"a": i64::MAX, "b": 1})))
            .unwrap_err();
        assert!(matches!(err, GenerationError::ToolFailed { ref reason, .. } if reason == "overflow"));
    }

    #[test]
    fn test_definitions_are_strict() {
        let defs = registry().definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "add");
        assert_eq!(defs[0].parameters["additionalProperties"], false);
        assert_eq!(defs[0].parameters["required"], json!(["a", "b"]));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let input = Schema::builder("noop_args").build().unwrap();
        let result = registry().register("add", "again", input, |_| Ok(Value::Null));
        assert!(result.is_err());
    }
}
