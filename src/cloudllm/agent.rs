//! Persona + model + tools: the tool-call loop and the routing contract
//! that every concrete agent persona is built from.
//!
//! Concrete personas (what a "Coordinator" or "BrowserOperator" actually
//! does) are out of scope for this core; what lives here is the machinery
//! every persona shares: card/prompt auto-resolution, the bounded
//! tool-call loop, routing-instruction rendering, and output parsing.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::cloudllm::card::{camel_to_snake, AgentCard, PromptTemplate};
use crate::cloudllm::error::{AgentInvokeError, AgentOutputError, ConfigError};
use crate::cloudllm::message::Message;
use crate::cloudllm::provider::{ChatMessage, Completion, ProviderAdapter, ToolCall, ToolChoice};
use crate::cloudllm::roster::Roster;
use crate::cloudllm::tool::ToolRegistry;

/// The per-agent bound on tool-call round-trips.
pub const DEFAULT_MAX_FUNCTION_CALLS: u32 = 10;

/// A read-only view of the task an agent is currently bound to, used only
/// to render routing instructions. Agents never own their task: the
/// handle is set on bind and cleared on unbind by [`crate::cloudllm::swarm::Swarm`],
/// breaking the `Task -> Agent -> Task` reference cycle.
pub struct TaskHandle {
    pub task_id: String,
    pub coordinator_name: String,
    roster: Arc<RwLock<Roster>>,
}

impl TaskHandle {
    pub fn new(task_id: impl Into<String>, coordinator_name: impl Into<String>, roster: Arc<RwLock<Roster>>) -> Self {
        TaskHandle {
            task_id: task_id.into(),
            coordinator_name: coordinator_name.into(),
            roster,
        }
    }

    fn directory_prompt(&self) -> String {
        self.roster.read().expect("roster lock poisoned").directory_prompt()
    }
}

/// Render the routing section appended to a bound agent's system prompt:
/// directory enumeration, the `"user"` sentinel instruction, the optional
/// `next_receiver` hint, and the required output grammar.
pub fn render_routing_section(task: &TaskHandle, next_receiver_hint: Option<&str>) -> String {
    let mut section = format!(
        "Registered agents:\n{}\n\nSet \"receiver\" to \"user\" when the task is complete, \
         otherwise to one of the registered agent names above.",
        task.directory_prompt()
    );
    if let Some(hint) = next_receiver_hint {
        section.push_str(&format!(
            "\nThe previous message suggested routing next to \"{}\"; honor it unless you have a better reason not to.",
            hint
        ));
    }
    section.push_str(
        "\nReply with a single JSON object: {\"receiver\": string, \"next_receiver\": string (optional), \"content\": string}.",
    );
    section
}

/// The parsed shape of an agent's final assistant content.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput {
    pub receiver: String,
    pub next_receiver: Option<String>,
    pub content: Value,
}

/// Parse an agent's final assistant content against the output grammar:
/// `{receiver: string, next_receiver?: string, content: string|structured}`.
pub fn parse_agent_output(agent_name: &str, raw: &str) -> Result<AgentOutput, AgentOutputError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| AgentOutputError {
        agent_name: agent_name.to_string(),
        reason: format!("not valid JSON: {}", e),
    })?;
    let obj = value.as_object().ok_or_else(|| AgentOutputError {
        agent_name: agent_name.to_string(),
        reason: "top-level value is not a JSON object".to_string(),
    })?;
    let receiver = obj
        .get("receiver")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentOutputError {
            agent_name: agent_name.to_string(),
            reason: "missing required field: receiver".to_string(),
        })?
        .to_string();
    let next_receiver = obj.get("next_receiver").and_then(Value::as_str).map(String::from);
    let content = obj
        .get("content")
        .cloned()
        .ok_or_else(|| AgentOutputError {
            agent_name: agent_name.to_string(),
            reason: "missing required field: content".to_string(),
        })?;
    Ok(AgentOutput {
        receiver,
        next_receiver,
        content,
    })
}

/// Execute the bounded tool-call loop starting from an already-issued
/// first completion. Returns the first completion with no `tool_calls`, or
/// an error once the round-trip count would exceed `max_function_calls + 1`.
pub async fn run_tool_call_loop(
    adapter: &dyn ProviderAdapter,
    tools: &ToolRegistry,
    agent_name: &str,
    working_messages: &mut Vec<ChatMessage>,
    mut completion: Completion,
    temperature: f32,
    max_tokens: Option<u32>,
    max_function_calls: u32,
) -> Result<Completion, AgentInvokeError> {
    let tool_schemas = tools.schemas();
    let schemas_arg: Option<&[Value]> = if tool_schemas.is_empty() { None } else { Some(&tool_schemas) };

    // `iteration` counts completion requests already made; the initial
    // `completion` passed in counts as request #1.
    let mut iteration: u32 = 1;

    loop {
        let calls: Vec<ToolCall> = completion.tool_calls().to_vec();
        if calls.is_empty() {
            return Ok(completion);
        }
        if iteration >= max_function_calls + 1 {
            return Err(AgentInvokeError::ToolLimitReached {
                agent_name: agent_name.to_string(),
                last_response: completion_to_debug_string(&completion),
            });
        }

        working_messages.push(ChatMessage::assistant(completion.text_content().map(String::from), calls.clone()));

        for call in &calls {
            let result = tools.execute(&call.name, &call.arguments_json).await;
            let rendered = match result {
                Ok(value) => format!(
                    "tool={} arguments={} status=success result={}",
                    call.name, call.arguments_json, value
                ),
                Err(e) => {
                    log::warn!("agent.{}: tool '{}' call failed: {}", agent_name, call.name, e);
                    format!("tool={} arguments={} status=error result={}", call.name, call.arguments_json, e)
                }
            };
            working_messages.push(ChatMessage::tool_result(call.id.clone(), rendered));
        }

        completion = adapter
            .chat(working_messages, schemas_arg, Some(ToolChoice::Auto), temperature, max_tokens)
            .await?;
        iteration += 1;
    }
}

fn completion_to_debug_string(completion: &Completion) -> String {
    match completion {
        Completion::TextResponse { content, .. } => content.clone(),
        Completion::ToolCallResponse { calls, .. } => {
            format!("{} pending tool call(s)", calls.len())
        }
    }
}

/// Persona + model + tools. The concrete reasoning step (`invoke`) is left
/// to [`AgentBehavior`] implementations; this struct owns everything
/// common: identity, sampling parameters, the bound adapter, the tool
/// registry, and the current task binding.
pub struct Agent {
    pub card: AgentCard,
    pub prompt_template: PromptTemplate,
    pub provider_name: String,
    pub adapter: Arc<dyn ProviderAdapter>,
    pub tools: ToolRegistry,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_function_calls: u32,
    task: RwLock<Option<Arc<TaskHandle>>>,
}

impl Agent {
    pub fn new(
        card: AgentCard,
        prompt_template: PromptTemplate,
        provider_name: impl Into<String>,
        adapter: Arc<dyn ProviderAdapter>,
        tools: ToolRegistry,
    ) -> Self {
        Agent {
            card,
            prompt_template,
            provider_name: provider_name.into(),
            adapter,
            tools,
            temperature: 0.0,
            max_tokens: None,
            max_function_calls: DEFAULT_MAX_FUNCTION_CALLS,
            task: RwLock::new(None),
        }
    }

    /// Auto-resolve the card and prompt documents for a persona type name
    /// (e.g. `"BrowserOperator"`) by camel-to-snake converting it and
    /// looking for `{snake}_card.yaml` / `{snake}_prompt.yaml` in `dir`.
    /// Missing card or prompt fail construction with a distinct error kind.
    pub fn auto_resolve(
        type_name: &str,
        dir: impl AsRef<Path>,
        provider_name: impl Into<String>,
        adapter: Arc<dyn ProviderAdapter>,
        tools: ToolRegistry,
    ) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let stem = camel_to_snake(type_name);
        let card = AgentCard::from_path(dir.join(format!("{}_card.yaml", stem)))?;
        let prompt_template = PromptTemplate::from_path(dir.join(format!("{}_prompt.yaml", stem)))?;
        Ok(Agent::new(card, prompt_template, provider_name, adapter, tools))
    }

    pub fn name(&self) -> &str {
        &self.card.name
    }

    /// Bind this agent to a task, enabling routing-instruction rendering.
    pub fn bind_task(&self, task: Arc<TaskHandle>) {
        *self.task.write().expect("task lock poisoned") = Some(task);
    }

    /// Clear the task binding at task end.
    pub fn unbind_task(&self) {
        *self.task.write().expect("task lock poisoned") = None;
    }

    fn bound_task(&self) -> Option<Arc<TaskHandle>> {
        self.task.read().expect("task lock poisoned").clone()
    }

    fn build_system_prompt(&self, next_receiver_hint: Option<&str>) -> String {
        let mut fields: HashMap<&str, String> = HashMap::new();
        fields.insert("agent_card", self.card.prompt());
        let mut system_prompt = PromptTemplate::render(&self.prompt_template.system_prompt, &fields);
        if let Some(task) = self.bound_task() {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(&render_routing_section(&task, next_receiver_hint));
        }
        system_prompt
    }

    fn build_user_prompt(&self, inbound: &Message) -> String {
        let content_text = match &inbound.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let mut fields: HashMap<&str, String> = HashMap::new();
        fields.insert("agent_card", self.card.prompt());
        fields.insert("agent_message", content_text);
        PromptTemplate::render(&self.prompt_template.user_prompt, &fields)
    }

    /// The default reasoning step: compose the two prompt templates, call
    /// the bound provider, run the tool-call loop, then parse the final
    /// content against the output grammar and emit the outbound message.
    pub async fn invoke(&self, inbound: &Message) -> Result<Option<Message>, AgentInvokeError> {
        log::info!("agent.{}: invoked by '{}'", self.name(), inbound.sender);
        let next_receiver_hint = inbound.next_receiver.as_deref();
        let mut working_messages = vec![
            ChatMessage::system(self.build_system_prompt(next_receiver_hint)),
            ChatMessage::user(self.build_user_prompt(inbound)),
        ];

        let tool_schemas = self.tools.schemas();
        let schemas_arg: Option<&[Value]> = if tool_schemas.is_empty() { None } else { Some(&tool_schemas) };

        let initial = self
            .adapter
            .chat(&working_messages, schemas_arg, Some(ToolChoice::Auto), self.temperature, self.max_tokens)
            .await?;

        let final_completion = run_tool_call_loop(
            self.adapter.as_ref(),
            &self.tools,
            self.name(),
            &mut working_messages,
            initial,
            self.temperature,
            self.max_tokens,
            self.max_function_calls,
        )
        .await?;

        let text = final_completion
            .text_content()
            .ok_or_else(|| AgentOutputError {
                agent_name: self.name().to_string(),
                reason: "final completion carried tool_calls instead of content".to_string(),
            })?;

        let output = parse_agent_output(self.name(), text)?;

        log::info!("agent.{}: resolved, routing to '{}'", self.name(), output.receiver);
        let mut builder = Message::builder(output.content).sender(self.name()).receiver(output.receiver);
        if let Some(next) = output.next_receiver {
            builder = builder.next_receiver(next);
        }
        if let Some(task_id) = inbound.task_id.clone() {
            builder = builder.task_id(task_id);
        }
        Ok(Some(builder.build()))
    }
}

/// Alternate entry point for personas that need full control over message
/// composition instead of the two-template default. Not required by the
/// core pump, which only calls [`Agent::invoke`]; provided so a concrete
/// persona crate can override composition while still reusing
/// [`run_tool_call_loop`] and [`parse_agent_output`].
#[async_trait]
pub trait AgentBehavior: Send + Sync {
    async fn invoke(&self, inbound: &Message) -> Result<Option<Message>, AgentInvokeError>;
}

#[async_trait]
impl AgentBehavior for Agent {
    async fn invoke(&self, inbound: &Message) -> Result<Option<Message>, AgentInvokeError> {
        Agent::invoke(self, inbound).await
    }
}
