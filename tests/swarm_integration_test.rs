use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use swarmcore::cloudllm::card::{AgentCard, PromptTemplate};
use swarmcore::cloudllm::error::ProviderError;
use swarmcore::cloudllm::provider::{ChatMessage, Completion, ProviderAdapter, ToolChoice, Usage};
use swarmcore::cloudllm::tool::{ParameterType, Tool, ToolParameter, ToolRegistry, ToolSpec};
use swarmcore::{Agent, Swarm};

struct ScriptedAdapter {
    replies: Vec<&'static str>,
    calls: AtomicU32,
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _tools: Option<&[Value]>,
        _tool_choice: Option<ToolChoice>,
        _temperature: f32,
        _max_tokens: Option<u32>,
    ) -> Result<Completion, ProviderError> {
        let i = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        Ok(Completion::TextResponse {
            content: self.replies.get(i).copied().unwrap_or(self.replies.last().unwrap()).to_string(),
            finish_reason: Some("stop".into()),
            usage: Usage::default(),
        })
    }
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("echo", "echoes back its input")
            .with_parameter(ToolParameter::new("text", ParameterType::String).required())
    }

    async fn run(&self, args: Value) -> Result<Value, swarmcore::cloudllm::error::ToolError> {
        Ok(args.get("text").cloned().unwrap_or(Value::Null))
    }
}

fn build_agent(name: &str, role: &str, replies: Vec<&'static str>) -> Arc<Agent> {
    let card = AgentCard::from_yaml_str(&format!("name: {}\nrole: {}\ndescription: integration test agent\n", name, role)).unwrap();
    let prompt = PromptTemplate::from_yaml_str("system_prompt: 'You help the user.'\nuser_prompt: '{agent_message}'\n").unwrap();
    let adapter = Arc::new(ScriptedAdapter {
        replies,
        calls: AtomicU32::new(0),
    });
    Arc::new(Agent::new(card, prompt, "test-provider", adapter, ToolRegistry::new()))
}

#[tokio::test]
async fn single_agent_swarm_answers_directly() {
    let dir = tempfile::tempdir().unwrap();
    let swarm = Swarm::new(dir.path());
    swarm
        .register_agent(build_agent("Eric", "coordinator", vec![r#"{"receiver":"user","content":"pong"}"#]))
        .await;

    let terminal = swarm.invoke("ping", None).await;

    assert_eq!(terminal.sender, "Eric");
    assert_eq!(terminal.receiver, "user");
    assert_eq!(terminal.content, Value::String("pong".into()));
}

#[tokio::test]
async fn coordinator_delegates_to_a_specialist_and_the_specialist_finishes_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let swarm = Swarm::new(dir.path());
    swarm
        .register_agent(build_agent("Eric", "coordinator", vec![r#"{"receiver":"Researcher","content":"look up X"}"#]))
        .await;
    swarm
        .register_agent(build_agent("Researcher", "specialist", vec![r#"{"receiver":"user","content":"X is 42"}"#]))
        .await;

    let terminal = swarm.invoke("what is X?", None).await;

    assert_eq!(terminal.sender, "Researcher");
    assert_eq!(terminal.content, Value::String("X is 42".into()));
}

#[tokio::test]
async fn agent_with_a_tool_resolves_after_one_tool_call_round_trip() {
    let card = AgentCard::from_yaml_str("name: Coder\nrole: coordinator\ndescription: runs tools\n").unwrap();
    let prompt = PromptTemplate::from_yaml_str("system_prompt: sys\nuser_prompt: '{agent_message}'\n").unwrap();

    struct ToolThenTextAdapter {
        step: AtomicU32,
    }

    #[async_trait]
    impl ProviderAdapter for ToolThenTextAdapter {
        fn model_name(&self) -> &str {
            "tool-then-text"
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _tools: Option<&[Value]>,
            _tool_choice: Option<ToolChoice>,
            _temperature: f32,
            _max_tokens: Option<u32>,
        ) -> Result<Completion, ProviderError> {
            if self.step.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Completion::ToolCallResponse {
                    calls: vec![swarmcore::cloudllm::provider::ToolCall {
                        id: "c1".to_string(),
                        name: "echo".to_string(),
                        arguments_json: r#"{"text":"hi"}"#.to_string(),
                    }],
                    finish_reason: Some("tool_calls".into()),
                    usage: Usage::default(),
                })
            } else {
                Ok(Completion::TextResponse {
                    content: r#"{"receiver":"user","content":"hi"}"#.to_string(),
                    finish_reason: Some("stop".into()),
                    usage: Usage::default(),
                })
            }
        }
    }

    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(EchoTool)).unwrap();
    let adapter = Arc::new(ToolThenTextAdapter { step: AtomicU32::new(0) });
    let agent = Arc::new(Agent::new(card, prompt, "test-provider", adapter, tools));

    let dir = tempfile::tempdir().unwrap();
    let swarm = Swarm::new(dir.path());
    swarm.register_agent(agent).await;

    let terminal = swarm.invoke("say hi", None).await;

    assert_eq!(terminal.content, Value::String("hi".into()));
}
