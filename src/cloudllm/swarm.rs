//! The façade: registers agents into a shared roster, owns one [`Task`]
//! per `task_id`, and binds/unbinds agents around each pump run.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use uuid::Uuid;

use crate::cloudllm::agent::{Agent, TaskHandle};
use crate::cloudllm::card::AgentCard;
use crate::cloudllm::message::Message;
use crate::cloudllm::roster::Roster;
use crate::cloudllm::task::Task;

/// Default coordinator name, used when none is configured. Resolved as an
/// Open Question: the original hard-coded a single name; here it is a
/// configurable default instead of a load-bearing constant.
pub const DEFAULT_COORDINATOR_NAME: &str = "Eric";

/// Owns the roster, the live agent set, and one [`Task`] per `task_id`.
pub struct Swarm {
    coordinator_name: String,
    data_root: PathBuf,
    roster: Arc<RwLock<Roster>>,
    agents: Arc<RwLock<HashMap<String, Arc<Agent>>>>,
    // Held across `.await` while a task's pump runs, so this one needs the
    // async-aware lock rather than `std::sync::RwLock`.
    tasks: tokio::sync::RwLock<HashMap<String, Task>>,
}

impl Swarm {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Swarm {
            coordinator_name: DEFAULT_COORDINATOR_NAME.to_string(),
            data_root: data_root.into(),
            roster: Arc::new(RwLock::new(Roster::new())),
            agents: Arc::new(RwLock::new(HashMap::new())),
            tasks: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Override the coordinator name (the fallback receiver for a fresh
    /// task's initial user message).
    pub fn with_coordinator_name(mut self, name: impl Into<String>) -> Self {
        self.coordinator_name = name.into();
        self
    }

    pub fn coordinator_name(&self) -> &str {
        &self.coordinator_name
    }

    /// Register an agent into both the name-indexed map and the roster
    /// directory. Re-registering a name replaces the prior entry, matching
    /// [`Roster::register`]'s move-to-end-of-directory semantics.
    pub async fn register_agent(&self, agent: Arc<Agent>) {
        let card: AgentCard = agent.card.clone();
        self.roster.write().expect("roster lock poisoned").register(card);
        self.agents
            .write()
            .expect("agents lock poisoned")
            .insert(agent.name().to_string(), agent);
    }

    pub async fn unregister_agent(&self, name: &str) {
        self.roster.write().expect("roster lock poisoned").unregister(name);
        self.agents.write().expect("agents lock poisoned").remove(name);
    }

    pub async fn is_registered(&self, name: &str) -> bool {
        self.agents.read().expect("agents lock poisoned").contains_key(name)
    }

    /// Run one user turn to completion. `task_id` selects an existing task
    /// to resume (create-if-absent) or, when `None`, starts a fresh one
    /// with a generated id. Returns the single terminal message the pump
    /// produced for this invocation.
    pub async fn invoke(&self, user_input: impl Into<Value>, task_id: Option<String>) -> Message {
        let task_id = task_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        {
            let mut tasks = self.tasks.write().await;
            tasks.entry(task_id.clone()).or_insert_with(|| {
                Task::new(
                    task_id.clone(),
                    self.coordinator_name.clone(),
                    self.roster.clone(),
                    self.agents.clone(),
                    self.data_root.clone(),
                )
            });
        }

        self.bind_agents(&task_id).await;
        let terminal = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(&task_id).expect("just inserted above");
            task.invoke(user_input).await
        };
        self.unbind_agents().await;

        terminal
    }

    async fn bind_agents(&self, task_id: &str) {
        let handle = Arc::new(TaskHandle::new(task_id.to_string(), self.coordinator_name.clone(), self.roster.clone()));
        for agent in self.agents.read().expect("agents lock poisoned").values() {
            agent.bind_task(handle.clone());
            agent.adapter.set_task_id(Some(task_id));
        }
    }

    async fn unbind_agents(&self) {
        for agent in self.agents.read().expect("agents lock poisoned").values() {
            agent.unbind_task();
            agent.adapter.set_task_id(None);
        }
    }

    /// Number of messages processed so far for a given task, or `None` if
    /// the task has never run.
    pub async fn task_history_len(&self, task_id: &str) -> Option<usize> {
        self.tasks.read().await.get(task_id).map(|t| t.history.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::card::PromptTemplate;
    use crate::cloudllm::error::ProviderError;
    use crate::cloudllm::provider::{ChatMessage, Completion, ProviderAdapter, ToolChoice, Usage};
    use crate::cloudllm::tool::ToolRegistry;
    use async_trait::async_trait;

    struct EchoAdapter;

    #[async_trait]
    impl ProviderAdapter for EchoAdapter {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _tools: Option<&[Value]>,
            _tool_choice: Option<ToolChoice>,
            _temperature: f32,
            _max_tokens: Option<u32>,
        ) -> Result<Completion, ProviderError> {
            Ok(Completion::TextResponse {
                content: r#"{"receiver":"user","content":"pong"}"#.to_string(),
                finish_reason: Some("stop".into()),
                usage: Usage::default(),
            })
        }
    }

    fn agent(name: &str) -> Arc<Agent> {
        let card = AgentCard::from_yaml_str(&format!("name: {}\nrole: coordinator\ndescription: test\n", name)).unwrap();
        let prompt = PromptTemplate::from_yaml_str("system_prompt: sys\nuser_prompt: '{agent_message}'\n").unwrap();
        Arc::new(Agent::new(card, prompt, "test", Arc::new(EchoAdapter), ToolRegistry::new()))
    }

    #[tokio::test]
    async fn registers_and_routes_to_default_coordinator() {
        let dir = tempfile::tempdir().unwrap();
        let swarm = Swarm::new(dir.path());
        swarm.register_agent(agent(DEFAULT_COORDINATOR_NAME)).await;
        let terminal = swarm.invoke("ping", None).await;
        assert_eq!(terminal.content, Value::String("pong".into()));
    }

    #[tokio::test]
    async fn custom_coordinator_name_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let swarm = Swarm::new(dir.path()).with_coordinator_name("Ada");
        swarm.register_agent(agent("Ada")).await;
        let terminal = swarm.invoke("ping", None).await;
        assert_eq!(terminal.sender, "Ada");
    }

    #[tokio::test]
    async fn resuming_a_task_id_reuses_history() {
        let dir = tempfile::tempdir().unwrap();
        let swarm = Swarm::new(dir.path());
        swarm.register_agent(agent(DEFAULT_COORDINATOR_NAME)).await;
        swarm.invoke("first", Some("task-a".to_string())).await;
        let len_after_first = swarm.task_history_len("task-a").await.unwrap();
        swarm.invoke("second", Some("task-a".to_string())).await;
        let len_after_second = swarm.task_history_len("task-a").await.unwrap();
        assert!(len_after_second > len_after_first);
    }

    #[tokio::test]
    async fn unregistering_removes_from_roster_and_map() {
        let dir = tempfile::tempdir().unwrap();
        let swarm = Swarm::new(dir.path());
        swarm.register_agent(agent(DEFAULT_COORDINATOR_NAME)).await;
        assert!(swarm.is_registered(DEFAULT_COORDINATOR_NAME).await);
        swarm.unregister_agent(DEFAULT_COORDINATOR_NAME).await;
        assert!(!swarm.is_registered(DEFAULT_COORDINATOR_NAME).await);
    }
}
