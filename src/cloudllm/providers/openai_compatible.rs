//! The OpenAI-compatible adapter family: accepts the uniform chat-message
//! contract verbatim, since the backend already speaks the same role
//! taxonomy and tool-schema shape.
//!
//! Backends in this family (OpenAI itself, DeepSeek, Zhipu, and any other
//! endpoint that mirrors `POST /chat/completions`) need no role-taxonomy
//! translation and no synthetic tool-call id reconstruction — the API
//! returns real ids. See [`crate::cloudllm::provider::synthesize_tool_call_id`] for
//! the helper non-compatible backends would need instead.

use async_trait::async_trait;
use serde_json::Value;

use crate::cloudllm::error::ProviderError;
use crate::cloudllm::provider::{ChatMessage, ChatRole, Completion, ProviderAdapter, ToolCall, ToolChoice, Usage};

/// A chat-completion client targeting any OpenAI-compatible
/// `/chat/completions` endpoint.
pub struct OpenAICompatibleAdapter {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
    task_id: std::sync::Mutex<Option<String>>,
}

impl OpenAICompatibleAdapter {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url.into();
        OpenAICompatibleAdapter {
            api_key: api_key.into(),
            http: crate::cloudllm::provider::shared_http_client(&base_url),
            base_url,
            model: model.into(),
            task_id: std::sync::Mutex::new(None),
        }
    }

    /// Task id currently set for log correlation, if any.
    fn current_task_id(&self) -> Option<String> {
        self.task_id.lock().expect("task id mutex poisoned").clone()
    }

    fn role_str(role: ChatRole) -> &'static str {
        match role {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
        }
    }

    fn build_request_body(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
        tool_choice: Option<ToolChoice>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                let mut obj = serde_json::Map::new();
                obj.insert("role".into(), Value::String(Self::role_str(m.role).into()));
                obj.insert(
                    "content".into(),
                    match &m.content {
                        Some(c) => Value::String(c.clone()),
                        None => Value::Null,
                    },
                );
                if !m.tool_calls.is_empty() {
                    let calls: Vec<Value> = m
                        .tool_calls
                        .iter()
                        .map(|c| {
                            serde_json::json!({
                                "id": c.id,
                                "type": "function",
                                "function": { "name": c.name, "arguments": c.arguments_json },
                            })
                        })
                        .collect();
                    obj.insert("tool_calls".into(), Value::Array(calls));
                }
                if let Some(call_id) = &m.tool_call_id {
                    obj.insert("tool_call_id".into(), Value::String(call_id.clone()));
                }
                Value::Object(obj)
            })
            .collect();

        let mut body = serde_json::Map::new();
        body.insert("model".into(), Value::String(self.model.clone()));
        body.insert("messages".into(), Value::Array(messages));
        body.insert("temperature".into(), serde_json::json!(temperature));
        body.insert("stream".into(), Value::Bool(false));
        if let Some(max_tokens) = max_tokens {
            body.insert("max_tokens".into(), serde_json::json!(max_tokens));
        }
        if let Some(tools) = tools {
            if !tools.is_empty() {
                body.insert("tools".into(), Value::Array(tools.to_vec()));
            }
        }
        if let Some(choice) = tool_choice {
            body.insert(
                "tool_choice".into(),
                match choice {
                    ToolChoice::Auto => Value::String("auto".into()),
                    ToolChoice::None => Value::String("none".into()),
                    ToolChoice::Required => Value::String("required".into()),
                    ToolChoice::Function(name) => serde_json::json!({ "function": { "name": name } }),
                },
            );
        }
        Value::Object(body)
    }

    fn parse_completion(&self, body: &Value) -> Result<Completion, ProviderError> {
        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown provider error")
                .to_string();
            log::error!("provider.{}: provider returned an error object: {}", self.model, message);
            return Err(ProviderError::new(self.model.clone(), message));
        }

        let choice = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .ok_or_else(|| {
                log::error!("provider.{}: response had no choices", self.model);
                ProviderError::new(self.model.clone(), "response had no choices")
            })?;

        let finish_reason = choice.get("finish_reason").and_then(Value::as_str).map(String::from);

        let usage = body
            .get("usage")
            .map(|u| Usage {
                prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
                completion_tokens: u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
                total_tokens: u.get("total_tokens").and_then(Value::as_u64).unwrap_or(0),
            })
            .unwrap_or_default();

        let message = choice.get("message").ok_or_else(|| {
            log::error!("provider.{}: choice had no message", self.model);
            ProviderError::new(self.model.clone(), "choice had no message")
        })?;

        let tool_calls = message.get("tool_calls").and_then(Value::as_array);

        if let Some(raw_calls) = tool_calls.filter(|c| !c.is_empty()) {
            let calls = raw_calls
                .iter()
                .map(|c| {
                    let function = &c["function"];
                    ToolCall {
                        id: c.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                        name: function.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                        arguments_json: function
                            .get("arguments")
                            .and_then(Value::as_str)
                            .unwrap_or("{}")
                            .to_string(),
                    }
                })
                .collect();
            return Ok(Completion::ToolCallResponse {
                calls,
                finish_reason,
                usage,
            });
        }

        let content = message
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                log::error!("provider.{}: response had neither tool_calls nor content", self.model);
                ProviderError::new(self.model.clone(), "response had neither tool_calls nor content")
            })?
            .to_string();

        Ok(Completion::TextResponse {
            content,
            finish_reason,
            usage,
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAICompatibleAdapter {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn set_task_id(&self, task_id: Option<&str>) {
        *self.task_id.lock().expect("task id mutex poisoned") = task_id.map(String::from);
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
        tool_choice: Option<ToolChoice>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<Completion, ProviderError> {
        let body = self.build_request_body(messages, tools, tool_choice, temperature, max_tokens);
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let task_id = self.current_task_id();

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                log::error!("provider.{} (task={:?}): transport error: {}", self.model, task_id, e);
                ProviderError::new(self.model.clone(), format!("transport error: {}", e))
            })?;

        let status = response.status();
        let response_text = response.text().await.map_err(|e| {
            log::error!("provider.{} (task={:?}): failed to read response body: {}", self.model, task_id, e);
            ProviderError::new(self.model.clone(), format!("failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            log::error!(
                "provider.{} (task={:?}): non-success status {}: {}",
                self.model,
                task_id,
                status,
                response_text
            );
            return Err(ProviderError::new(self.model.clone(), response_text).with_status(status.as_u16()));
        }

        let response_json: Value = serde_json::from_str(&response_text).map_err(|e| {
            log::error!("provider.{} (task={:?}): malformed JSON response: {}", self.model, task_id, e);
            ProviderError::new(self.model.clone(), format!("malformed JSON response: {}", e))
        })?;

        self.parse_completion(&response_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> OpenAICompatibleAdapter {
        OpenAICompatibleAdapter::new("test-key", "https://api.example.com/v1", "gpt-test")
    }

    #[test]
    fn request_body_carries_model_and_messages() {
        let body = adapter().build_request_body(
            &[ChatMessage::system("be helpful"), ChatMessage::user("hi")],
            None,
            None,
            0.0,
            Some(256),
        );
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn parses_text_completion() {
        let raw = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "hello" }, "finish_reason": "stop" }],
            "usage": { "prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4 },
        });
        let completion = adapter().parse_completion(&raw).unwrap();
        match completion {
            Completion::TextResponse { content, usage, .. } => {
                assert_eq!(content, "hello");
                assert_eq!(usage.total_tokens, 4);
            }
            _ => panic!("expected a text response"),
        }
    }

    #[test]
    fn parses_tool_call_completion_preserving_order() {
        let raw = serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [
                        { "id": "c1", "type": "function", "function": { "name": "shell", "arguments": "{\"run\":\"a\"}" } },
                        { "id": "c2", "type": "function", "function": { "name": "shell", "arguments": "{\"run\":\"b\"}" } },
                    ]
                },
                "finish_reason": "tool_calls"
            }],
        });
        let completion = adapter().parse_completion(&raw).unwrap();
        let calls = completion.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[1].id, "c2");
    }

    #[test]
    fn surfaces_provider_errors() {
        let raw = serde_json::json!({ "error": { "message": "rate limited" } });
        let err = adapter().parse_completion(&raw).unwrap_err();
        assert_eq!(err.message, "rate limited");
    }
}
