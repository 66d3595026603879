//! Declarative agent identity, loaded from a YAML document.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::cloudllm::error::ConfigError;

/// An agent's declarative identity: name, role, description, plus whatever
/// additional namespaced attributes (capabilities, skills, ...) the
/// document carries. Extra attributes are preserved verbatim and exposed
/// through [`AgentCard::get_path`] for dotted-path access.
#[derive(Debug, Clone)]
pub struct AgentCard {
    pub name: String,
    pub role: String,
    pub description: String,
    extra: Value,
}

impl AgentCard {
    /// Load a card from a YAML file at `path`.
    ///
    /// Distinguishes a missing file from a malformed document, as required
    /// by the construction contract: callers that want to react
    /// differently to "no such card" versus "card is broken" can match on
    /// the returned [`ConfigError`] variant.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        Self::from_yaml_str(&raw).map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Parse a card from an in-memory YAML document (used directly by tests
    /// and by callers that load cards from a source other than the
    /// filesystem).
    pub fn from_yaml_str(raw: &str) -> Result<Self, String> {
        let parsed: serde_yaml::Value = serde_yaml::from_str(raw).map_err(|e| e.to_string())?;
        let value: Value = serde_json::to_value(parsed).map_err(|e| e.to_string())?;
        let obj = value
            .as_object()
            .ok_or_else(|| "card document must be a mapping".to_string())?;

        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing required field: name".to_string())?
            .to_string();
        let role = obj
            .get("role")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing required field: role".to_string())?
            .to_string();
        let description = obj
            .get("description")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing required field: description".to_string())?
            .to_string();

        Ok(AgentCard {
            name,
            role,
            description,
            extra: value,
        })
    }

    /// Resolve a dotted path (e.g. `"capabilities.skills"`) against the
    /// card's nested attributes, including the top-level fields.
    pub fn get_path(&self, dotted_path: &str) -> Option<&Value> {
        let mut current = &self.extra;
        for segment in dotted_path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// The canonical persona text combining name, role, and description.
    pub fn prompt(&self) -> String {
        format!(
            "You are {}, your role is {}, your description is {}",
            self.name, self.role, self.description
        )
    }
}

/// The sibling `_prompt.yaml` document: system and user prompt templates
/// with free-form named placeholders, per the agent prompt file contract.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub system_prompt: String,
    pub user_prompt: String,
    pub extra_fields: HashMap<String, String>,
}

impl PromptTemplate {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        Self::from_yaml_str(&raw).map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, String> {
        let parsed: serde_yaml::Value = serde_yaml::from_str(raw).map_err(|e| e.to_string())?;
        let value: Value = serde_json::to_value(parsed).map_err(|e| e.to_string())?;
        let obj = value
            .as_object()
            .ok_or_else(|| "prompt document must be a mapping".to_string())?;

        let system_prompt = obj
            .get("system_prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing required field: system_prompt".to_string())?
            .to_string();
        let user_prompt = obj
            .get("user_prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing required field: user_prompt".to_string())?
            .to_string();

        let mut extra_fields = HashMap::new();
        for (k, v) in obj.iter() {
            if k == "system_prompt" || k == "user_prompt" {
                continue;
            }
            if let Some(s) = v.as_str() {
                extra_fields.insert(k.clone(), s.to_string());
            }
        }

        Ok(PromptTemplate {
            system_prompt,
            user_prompt,
            extra_fields,
        })
    }

    /// Substitute `{agent_card}`, `{agent_message}`, and any caller-supplied
    /// named fields into a template string. Unrecognized placeholders are
    /// left untouched.
    pub fn render(template: &str, fields: &HashMap<&str, String>) -> String {
        let mut rendered = template.to_string();
        for (key, value) in fields {
            rendered = rendered.replace(&format!("{{{}}}", key), value);
        }
        rendered
    }
}

/// Derive the `..._card.yaml` / `..._prompt.yaml` filename stem for a type
/// name using camel-to-snake conversion, e.g. `BrowserOperator` ->
/// `browser_operator`.
pub fn camel_to_snake(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len() + 4);
    for (i, ch) in type_name.chars().enumerate() {
        if ch.is_uppercase() {
            if i != 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
