//! Uniform chat-completion contract over heterogeneous LLM backends.
//!
//! The shared HTTP client pool mirrors the connection-pooling setup used
//! throughout this crate's lineage: one persistent, keep-alive
//! [`reqwest::Client`] per base URL, reused across every adapter instance
//! that targets the same endpoint.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::cloudllm::error::ProviderError;

lazy_static! {
    static ref HTTP_CLIENT_POOL: Mutex<HashMap<String, reqwest::Client>> = Mutex::new(HashMap::new());
}

/// Borrow (creating if necessary) the shared, connection-pooled HTTP client
/// for `base_url`. Safe for concurrent use by every adapter instance that
/// targets the same provider.
pub fn shared_http_client(base_url: &str) -> reqwest::Client {
    let mut pool = HTTP_CLIENT_POOL.lock().expect("http client pool mutex poisoned");
    if let Some(client) = pool.get(base_url) {
        return client.clone();
    }
    let client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(Duration::from_secs(300))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build shared http client");
    pool.insert(base_url.to_string(), client.clone());
    client
}

/// A role in the uniform chat-message taxonomy. Adapters for backends
/// without a native system role must translate `System` themselves (e.g.
/// by concatenating it onto the first user turn).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments_json: String,
}

/// One message in the uniform wire contract, as sent to (or received from)
/// a provider adapter.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::System,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        ChatMessage {
            role: ChatRole::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Aggregate token accounting, normalized across backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A normalized completion. Exactly one of the two shapes is produced per
/// the invariant in the testable properties: a response either carries
/// tool calls (non-empty) or has non-null text content, never neither.
#[derive(Debug, Clone)]
pub enum Completion {
    TextResponse {
        content: String,
        finish_reason: Option<String>,
        usage: Usage,
    },
    ToolCallResponse {
        calls: Vec<ToolCall>,
        finish_reason: Option<String>,
        usage: Usage,
    },
}

impl Completion {
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Completion::ToolCallResponse { calls, .. } => calls,
            Completion::TextResponse { .. } => &[],
        }
    }

    pub fn text_content(&self) -> Option<&str> {
        match self {
            Completion::TextResponse { content, .. } => Some(content.as_str()),
            Completion::ToolCallResponse { .. } => None,
        }
    }
}

/// How the model should choose among the declared tools.
#[derive(Debug, Clone)]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Function(String),
}

/// A uniform chat-completion request/response contract over one LLM
/// backend. OpenAI-compatible backends accept `messages` verbatim; other
/// families must translate role taxonomy and tool schemas themselves (see
/// [`synthesize_tool_call_id`] for backends that don't supply call ids).
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn model_name(&self) -> &str;

    /// Correlate subsequent log lines with a task id. Called by
    /// [`crate::cloudllm::swarm::Swarm`] on bind/unbind; adapters with nothing to log
    /// can ignore it, hence the no-op default.
    fn set_task_id(&self, _task_id: Option<&str>) {}

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
        tool_choice: Option<ToolChoice>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<Completion, ProviderError>;
}

/// Reconstruct a synthetic tool-call id for backends that don't supply one
/// natively, as `call_{function_name}_{hash(arguments)}`.
pub fn synthesize_tool_call_id(function_name: &str, arguments_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(arguments_json.as_bytes());
    let digest = hasher.finalize();
    let short_hash = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect::<String>();
    format!("call_{}_{}", function_name, short_hash)
}
