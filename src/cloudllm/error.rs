//! The unified error taxonomy for the runtime.
//!
//! Every fallible operation in this crate resolves to one of the variants
//! below. None of them is allowed to escape [`crate::cloudllm::task::Task::invoke`];
//! the pump is the single point of capture (see [`crate::task`]).

use std::error::Error;
use std::fmt;

/// Errors raised while loading or resolving static configuration: agent
/// cards, prompt templates, and provider credentials.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// The declarative document could not be found on disk.
    FileNotFound(String),
    /// The document was found but failed to parse as YAML.
    ParseError(String),
    /// `get_api_config` was asked for a provider it doesn't recognize.
    UnknownProvider(String),
    /// The provider is recognized but no credential is available for it.
    MissingCredential(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "config error: file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "config error: parse failure: {}", msg),
            ConfigError::UnknownProvider(p) => write!(f, "config error: unknown provider: {}", p),
            ConfigError::MissingCredential(p) => {
                write!(f, "config error: missing credential for provider: {}", p)
            }
        }
    }
}

impl Error for ConfigError {}

/// Errors raised by a [`crate::cloudllm::provider::ProviderAdapter`] implementation.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub status_code: Option<u16>,
    pub message: String,
    pub model: String,
    pub retriable: bool,
}

impl ProviderError {
    pub fn new(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
            model: model.into(),
            retriable: false,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self.retriable = matches!(status_code, 429 | 500..=599);
        self
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(
                f,
                "provider error (model={}, status={}): {}",
                self.model, code, self.message
            ),
            None => write!(f, "provider error (model={}): {}", self.model, self.message),
        }
    }
}

impl Error for ProviderError {}

/// Errors raised inside [`crate::cloudllm::tool::ToolRegistry`] and the tool-call loop.
#[derive(Debug, Clone)]
pub enum ToolError {
    /// No tool is registered under the requested name.
    NotFound(String),
    /// A tool of that name is already registered (distinct from Roster's
    /// replace-with-warning policy: tool registration is not idempotent).
    DuplicateName(String),
    /// The tool's `run` returned an application-level failure.
    ExecutionFailed(String),
    /// Arguments failed to parse as JSON.
    InvalidArguments(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "tool not found: {}", name),
            ToolError::DuplicateName(name) => write!(f, "tool already registered: {}", name),
            ToolError::ExecutionFailed(msg) => write!(f, "tool execution failed: {}", msg),
            ToolError::InvalidArguments(msg) => write!(f, "invalid tool arguments: {}", msg),
        }
    }
}

impl Error for ToolError {}

/// The agent's final assistant content failed the output grammar:
/// `{receiver: string, next_receiver?: string, content: string|structured}`.
#[derive(Debug, Clone)]
pub struct AgentOutputError {
    pub agent_name: String,
    pub reason: String,
}

impl fmt::Display for AgentOutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "agent {} produced an invalid output: {}",
            self.agent_name, self.reason
        )
    }
}

impl Error for AgentOutputError {}

/// The pump's iteration ceiling was reached before a user-addressed message
/// was dequeued.
#[derive(Debug, Clone)]
pub struct SchedulerTimeout {
    pub task_id: String,
    pub processed: usize,
}

impl fmt::Display for SchedulerTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task timeout; processed {} messages", self.processed)
    }
}

impl Error for SchedulerTimeout {}

/// A message addressed an agent name that is not registered in the roster.
#[derive(Debug, Clone)]
pub struct RouteError {
    pub receiver: String,
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent {} not found", self.receiver)
    }
}

impl Error for RouteError {}

/// Any error an [`crate::cloudllm::agent::AgentBase`] invocation can surface to the
/// pump. The pump never needs to distinguish further than this when
/// deciding how to route the failure back to the coordinator.
#[derive(Debug, Clone)]
pub enum AgentInvokeError {
    Provider(ProviderError),
    Output(AgentOutputError),
    ToolLimitReached { agent_name: String, last_response: String },
}

impl fmt::Display for AgentInvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentInvokeError::Provider(e) => write!(f, "{}", e),
            AgentInvokeError::Output(e) => write!(f, "{}", e),
            AgentInvokeError::ToolLimitReached { agent_name, .. } => write!(
                f,
                "agent {} exceeded the tool-call limit",
                agent_name
            ),
        }
    }
}

impl Error for AgentInvokeError {}

impl From<ProviderError> for AgentInvokeError {
    fn from(e: ProviderError) -> Self {
        AgentInvokeError::Provider(e)
    }
}

impl From<AgentOutputError> for AgentInvokeError {
    fn from(e: AgentOutputError) -> Self {
        AgentInvokeError::Output(e)
    }
}
