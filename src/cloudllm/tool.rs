//! Tool contract and name-indexed registry.
//!
//! Adapted from the parameter/metadata builder pattern used for multi-protocol
//! tool routing elsewhere in this crate's lineage, simplified down to the
//! single local-execution contract this runtime's core actually needs: a
//! tool declares a [`ToolSpec`] and implements one asynchronous `run`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cloudllm::error::ToolError;

/// The semantic types a tool parameter may declare. Limited to the JSON
/// primitive + compound vocabulary the schema projection understands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Integer,
    Number,
    Boolean,
    String,
    Array,
    Object,
}

impl ParameterType {
    fn as_json_schema_str(&self) -> &'static str {
        match self {
            ParameterType::Integer => "integer",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::String => "string",
            ParameterType::Array => "array",
            ParameterType::Object => "object",
        }
    }
}

/// A single declared parameter: semantic type, description, and whether
/// the model must supply it.
#[derive(Debug, Clone)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: ParameterType,
    pub description: Option<String>,
    pub required: bool,
    pub items: Option<ParameterType>,
    pub properties: Option<HashMap<String, ToolParameter>>,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: ParameterType) -> Self {
        ToolParameter {
            name: name.into(),
            param_type,
            description: None,
            required: false,
            items: None,
            properties: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_items(mut self, item_type: ParameterType) -> Self {
        self.items = Some(item_type);
        self
    }

    pub fn with_properties(mut self, properties: HashMap<String, ToolParameter>) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Project this parameter into its JSON-Schema `properties` entry.
    /// Optional parameters still emit `type: T`; they are simply excluded
    /// from the enclosing object's `required` array by the caller.
    fn to_json_schema(&self) -> Value {
        let mut schema = serde_json::Map::new();
        schema.insert(
            "type".into(),
            Value::String(self.param_type.as_json_schema_str().into()),
        );
        if let Some(desc) = &self.description {
            schema.insert("description".into(), Value::String(desc.clone()));
        }
        if let Some(items) = &self.items {
            schema.insert(
                "items".into(),
                serde_json::json!({ "type": items.as_json_schema_str() }),
            );
        }
        if let Some(properties) = &self.properties {
            let mut props = serde_json::Map::new();
            for (name, param) in properties {
                props.insert(name.clone(), param.to_json_schema());
            }
            schema.insert("properties".into(), Value::Object(props));
        }
        Value::Object(schema)
    }
}

/// A tool's self-description.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        ToolSpec {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Project to `{type: "function", function: {name, description, parameters}}`
    /// with `required` computed from the non-optional parameters.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            properties.insert(param.name.clone(), param.to_json_schema());
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": Value::Object(properties),
                    "required": required,
                }
            }
        })
    }
}

/// A tool's single asynchronous operation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's self-description.
    fn spec(&self) -> ToolSpec;

    /// Execute the tool with the given named arguments, already parsed
    /// from the model's JSON arguments payload.
    async fn run(&self, args: Value) -> Result<Value, ToolError>;
}

/// Name-indexed registry of tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Unlike [`crate::cloudllm::roster::Roster::register`], this
    /// fails on a duplicate name rather than silently replacing it — tool
    /// identity is load-bearing for in-flight tool-call rounds in a way
    /// that agent-card identity is not.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.spec().name;
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateName(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// `{type: "function", function: {...}}` schemas for every registered
    /// tool, suitable for inclusion in a chat-completion request's `tools`.
    pub fn schemas(&self) -> Vec<Value> {
        self.tools.values().map(|t| t.spec().to_json_schema()).collect()
    }

    /// Execute a tool by name, wrapping every failure mode the tool-call
    /// loop needs to distinguish (not-found, parse failure, execution
    /// failure) into a single [`ToolError`].
    pub async fn execute(&self, name: &str, raw_arguments: &str) -> Result<Value, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let args: Value = serde_json::from_str(raw_arguments).unwrap_or_else(|_| serde_json::json!({}));
        tool.run(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn spec(&self) -> ToolSpec {
            ToolSpec::new("echo", "echoes its input")
                .with_parameter(ToolParameter::new("text", ParameterType::String).required())
                .with_parameter(ToolParameter::new("loud", ParameterType::Boolean))
        }

        async fn run(&self, args: Value) -> Result<Value, ToolError> {
            Ok(args.get("text").cloned().unwrap_or(Value::Null))
        }
    }

    #[test]
    fn optional_parameters_are_typed_but_not_required() {
        let schema = Echo.spec().to_json_schema();
        let required = schema["function"]["parameters"]["required"].as_array().unwrap();
        assert_eq!(required, &vec![Value::String("text".into())]);
        let loud = &schema["function"]["parameters"]["properties"]["loud"];
        assert_eq!(loud["type"], "boolean");
    }

    #[tokio::test]
    async fn register_rejects_duplicate_names() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();
        let err = registry.register(Arc::new(Echo)).unwrap_err();
        assert!(matches!(err, ToolError::DuplicateName(name) if name == "echo"));
    }

    #[tokio::test]
    async fn execute_reports_not_found_for_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute("missing", "{}").await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn execute_falls_back_to_empty_object_on_parse_failure() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();
        let result = registry.execute("echo", "not json").await.unwrap();
        assert_eq!(result, Value::Null);
    }
}
