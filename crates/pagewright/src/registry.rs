//! The tool registry: every capability the model may invoke, keyed by
//! name. Built once at startup, immutable afterward, shared as
//! `Arc<ToolRegistry>` across submissions without locking.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::errors::{SetupError, ToolError};
use crate::models::content::Content;
use crate::models::tool::Tool;

/// The invoke capability behind a registered tool. Implementations run
/// with arguments that already passed schema validation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<Vec<Content>, ToolError>;
}

struct Registered {
    tool: Tool,
    handler: Box<dyn ToolHandler>,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Registered>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tool descriptor with its handler. Names are unique for
    /// the lifetime of the registry.
    pub fn register(&mut self, tool: Tool, handler: Box<dyn ToolHandler>) -> Result<(), SetupError> {
        if self.tools.contains_key(&tool.name) {
            return Err(SetupError::DuplicateTool(tool.name));
        }
        debug!(tool = %tool.name, "registered tool");
        self.tools
            .insert(tool.name.clone(), Registered { tool, handler });
        Ok(())
    }

    /// All descriptors, sorted by name so the model request is stable
    /// across runs.
    pub fn list(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.tools.values().map(|r| r.tool.clone()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate the arguments against the tool's schema, then execute.
    /// Handler failures come back as `Err(ToolError)` and are the
    /// caller's data, not a registry failure.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Vec<Content>, ToolError> {
        let registered = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        validate_arguments(&registered.tool.input_schema, &arguments)?;
        registered.handler.call(arguments).await
    }
}

/// Check a JSON argument object against the schema subset our tool
/// descriptors use: object schemas with `properties`, `required`, a
/// `type` per property and optional `additionalProperties: false`.
/// Reports every mismatch, not just the first.
fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), ToolError> {
    let Some(args) = arguments.as_object() else {
        return Err(ToolError::InvalidArguments(
            "arguments must be a JSON object".to_string(),
        ));
    };

    let mut mismatches = Vec::new();

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|f| f.as_str()) {
            if !args.contains_key(field) {
                mismatches.push(format!("missing required field '{field}'"));
            }
        }
    }

    let properties = schema.get("properties").and_then(|p| p.as_object());

    if let Some(properties) = properties {
        for (field, value) in args {
            match properties.get(field) {
                Some(property) => {
                    if let Some(expected) = property.get("type").and_then(|t| t.as_str()) {
                        if !matches_type(value, expected) {
                            mismatches.push(format!(
                                "field '{field}' expected type '{expected}', got '{}'",
                                type_name(value)
                            ));
                        }
                    }
                }
                None => {
                    let closed = schema
                        .get("additionalProperties")
                        .and_then(|a| a.as_bool())
                        .map(|allowed| !allowed)
                        .unwrap_or(false);
                    if closed {
                        mismatches.push(format!("unknown field '{field}'"));
                    }
                }
            }
        }
    }

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments(mismatches.join("; ")))
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        // JSON Schema integers exclude fractional numbers
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
