//! The scheduler: a bounded-iteration message pump. This is the heart of
//! the system (see `SPEC_FULL.md` §4.7).

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::Value;

use crate::cloudllm::agent::Agent;
use crate::cloudllm::error::{RouteError, SchedulerTimeout};
use crate::cloudllm::message::{Message, SYSTEM_SENTINEL, USER_SENTINEL};
use crate::cloudllm::roster::Roster;

/// Fixed iteration ceiling. Counts empty-queue cooperative-yield ticks as
/// well as productive ticks (a known, deliberately preserved quirk of the
/// scheduler this pump is modeled on — see `SPEC_FULL.md` §9).
pub const MAX_ITERATIONS: u32 = 50;

/// Duration of the cooperative yield when the pending queue is empty.
const EMPTY_QUEUE_YIELD: Duration = Duration::from_millis(5);

/// One end-to-end user-initiated conversation, scheduled to completion by
/// the pump.
pub struct Task {
    pub task_id: String,
    pub coordinator_name: String,
    pub roster: Arc<RwLock<Roster>>,
    pub agents: Arc<RwLock<HashMap<String, Arc<Agent>>>>,
    pending: VecDeque<Message>,
    pub history: Vec<Message>,
    pub iterations: u32,
    data_root: PathBuf,
}

impl Task {
    pub fn new(
        task_id: impl Into<String>,
        coordinator_name: impl Into<String>,
        roster: Arc<RwLock<Roster>>,
        agents: Arc<RwLock<HashMap<String, Arc<Agent>>>>,
        data_root: PathBuf,
    ) -> Self {
        Task {
            task_id: task_id.into(),
            coordinator_name: coordinator_name.into(),
            roster,
            agents,
            pending: VecDeque::new(),
            history: Vec::new(),
            iterations: 0,
            data_root,
        }
    }

    /// Construct the initial user message and run the pump to completion.
    /// `iterations` is reset here: it bounds a single pump run, not the
    /// task's lifetime, so resuming an existing `task_id` gets a fresh
    /// `MAX_ITERATIONS` budget rather than inheriting whatever was left
    /// over from the previous call.
    pub async fn invoke(&mut self, user_input: impl Into<Value>) -> Message {
        log::info!("task.{}: starting pump run, history so far: {}", self.task_id, self.history.len());
        self.iterations = 0;
        let initial = Message::builder(user_input)
            .sender(USER_SENTINEL)
            .receiver(self.coordinator_name.clone())
            .task_id(self.task_id.clone())
            .build();
        self.pending.push_back(initial);
        self.pump().await
    }

    /// Drain `pending` until a user-addressed message is dequeued, an
    /// agent returns no reply, or the iteration ceiling is reached. Never
    /// panics or propagates an agent/provider error — every failure mode
    /// is converted into a routed or terminal [`Message`].
    async fn pump(&mut self) -> Message {
        loop {
            if self.iterations >= MAX_ITERATIONS {
                return self.timeout_message();
            }

            if self.pending.is_empty() {
                tokio::time::sleep(EMPTY_QUEUE_YIELD).await;
                self.iterations += 1;
                continue;
            }

            let message = self.pending.pop_front().expect("checked non-empty above");
            self.history.push(message.clone());
            self.snapshot_history().await;

            if message.is_for_user() {
                return message;
            }

            let agent = self.agents.read().expect("agents lock poisoned").get(&message.receiver).cloned();
            match agent {
                None => {
                    log::warn!(
                        "task.{}: agent '{}' not found, rerouting to coordinator",
                        self.task_id,
                        message.receiver
                    );
                    self.pending.push_back(self.route_error_message(&message.receiver));
                }
                Some(agent) => match agent.invoke(&message).await {
                    Ok(Some(reply)) => self.pending.push_back(reply),
                    Ok(None) => {
                        log::info!(
                            "task.{}: agent '{}' returned no reply, stopping early",
                            self.task_id,
                            agent.name()
                        );
                        return self.early_stop_message(agent.name());
                    }
                    Err(e) => {
                        log::error!("task.{}: agent '{}' error: {}", self.task_id, agent.name(), e);
                        self.pending.push_back(self.agent_error_message(agent.name(), &e.to_string()));
                    }
                },
            }

            self.iterations += 1;
        }
    }

    fn route_error_message(&self, missing_receiver: &str) -> Message {
        let err = RouteError {
            receiver: missing_receiver.to_string(),
        };
        Message::builder(Value::String(err.to_string()))
            .sender(SYSTEM_SENTINEL)
            .receiver(self.coordinator_name.clone())
            .task_id(self.task_id.clone())
            .build()
    }

    fn agent_error_message(&self, agent_name: &str, error: &str) -> Message {
        Message::builder(Value::String(format!("agent {} error: {}", agent_name, error)))
            .sender(agent_name)
            .receiver(self.coordinator_name.clone())
            .task_id(self.task_id.clone())
            .build()
    }

    fn timeout_message(&self) -> Message {
        let err = SchedulerTimeout {
            task_id: self.task_id.clone(),
            processed: self.history.len(),
        };
        Message::builder(Value::String(err.to_string()))
            .sender(SYSTEM_SENTINEL)
            .receiver(USER_SENTINEL)
            .task_id(self.task_id.clone())
            .build()
    }

    fn early_stop_message(&self, agent_name: &str) -> Message {
        Message::builder(Value::String(format!(
            "agent {} returned no reply; task ended early after {} messages",
            agent_name,
            self.history.len()
        )))
        .sender(SYSTEM_SENTINEL)
        .receiver(USER_SENTINEL)
        .task_id(self.task_id.clone())
        .build()
    }

    /// Write the current history as a JSON array to
    /// `<data_root>/<task_id>/message_history.json`. Writes to a temp file
    /// and renames over the target for best-effort atomicity; failures are
    /// logged, never propagated.
    async fn snapshot_history(&self) {
        let dir = self.data_root.join(&self.task_id);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            log::warn!("task.{}: failed to create snapshot dir: {}", self.task_id, e);
            return;
        }
        let snapshot: Vec<Value> = self.history.iter().map(|m| Value::Object(m.to_map())).collect();
        let body = match serde_json::to_vec_pretty(&snapshot) {
            Ok(body) => body,
            Err(e) => {
                log::warn!("task.{}: failed to serialize history snapshot: {}", self.task_id, e);
                return;
            }
        };
        let target = dir.join("message_history.json");
        let tmp = dir.join("message_history.json.tmp");
        if let Err(e) = tokio::fs::write(&tmp, &body).await {
            log::warn!("task.{}: failed to write history snapshot: {}", self.task_id, e);
            return;
        }
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            log::warn!("task.{}: failed to finalize history snapshot: {}", self.task_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::card::AgentCard;
    use crate::cloudllm::provider::{ChatMessage, Completion, ProviderAdapter, ToolChoice, Usage};
    use crate::cloudllm::tool::ToolRegistry;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

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
        ) -> Result<Completion, crate::cloudllm::error::ProviderError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let content = self.replies.get(i).copied().unwrap_or(self.replies.last().unwrap());
            Ok(Completion::TextResponse {
                content: content.to_string(),
                finish_reason: Some("stop".into()),
                usage: Usage::default(),
            })
        }
    }

    fn card(name: &str) -> AgentCard {
        AgentCard::from_yaml_str(&format!("name: {}\nrole: worker\ndescription: test\n", name)).unwrap()
    }

    fn prompt() -> crate::cloudllm::card::PromptTemplate {
        crate::cloudllm::card::PromptTemplate::from_yaml_str("system_prompt: sys\nuser_prompt: '{agent_message}'\n").unwrap()
    }

    async fn build_task(agents: Vec<(&str, Vec<&'static str>)>, coordinator: &str) -> (Task, tempfile::TempDir) {
        let mut roster = Roster::new();
        let mut agent_map = HashMap::new();
        for (name, replies) in agents {
            roster.register(card(name));
            let adapter = Arc::new(ScriptedAdapter {
                replies,
                calls: AtomicU32::new(0),
            });
            let agent = Arc::new(Agent::new(card(name), prompt(), "test", adapter, ToolRegistry::new()));
            agent_map.insert(name.to_string(), agent);
        }
        let dir = tempfile::tempdir().unwrap();
        let task = Task::new(
            "t-1",
            coordinator,
            Arc::new(RwLock::new(roster)),
            Arc::new(RwLock::new(agent_map)),
            dir.path().to_path_buf(),
        );
        (task, dir)
    }

    #[tokio::test]
    async fn s1_immediate_user_reply() {
        let (mut task, _dir) = build_task(vec![("Echo", vec![r#"{"receiver":"user","content":"hello"}"#])], "Echo").await;
        let terminal = task.invoke("hello").await;
        assert_eq!(terminal.sender, "Echo");
        assert_eq!(terminal.receiver, "user");
        assert_eq!(terminal.content, Value::String("hello".into()));
        assert_eq!(task.history.len(), 2);
    }

    #[tokio::test]
    async fn s2_one_hop_route_via_coordinator() {
        let (mut task, _dir) = build_task(
            vec![
                ("Eric", vec![r#"{"receiver":"Worker","content":"do X"}"#]),
                ("Worker", vec![r#"{"receiver":"user","content":"done X"}"#]),
            ],
            "Eric",
        )
        .await;
        let terminal = task.invoke("start").await;
        assert_eq!(terminal.sender, "Worker");
        assert_eq!(terminal.content, Value::String("done X".into()));
        assert_eq!(task.history.len(), 3);
    }

    #[tokio::test]
    async fn s3_unknown_recipient_rerouted_to_coordinator() {
        let (mut task, _dir) = build_task(
            vec![(
                "Eric",
                vec![
                    r#"{"receiver":"Ghost","content":"?"}"#,
                    r#"{"receiver":"user","content":"resolved"}"#,
                ],
            )],
            "Eric",
        )
        .await;
        let terminal = task.invoke("start").await;
        assert_eq!(terminal.content, Value::String("resolved".into()));
        assert!(task.history.iter().any(|m| m.sender == "system" && m.content.as_str().unwrap().contains("Ghost not found")));
    }

    #[tokio::test]
    async fn s6_task_timeout_after_max_iterations() {
        let (mut task, _dir) = build_task(
            vec![
                ("Eric", vec![r#"{"receiver":"Worker","content":"ping"}"#]),
                ("Worker", vec![r#"{"receiver":"Eric","content":"pong"}"#]),
            ],
            "Eric",
        )
        .await;
        let terminal = task.invoke("start").await;
        assert_eq!(terminal.sender, "system");
        assert_eq!(terminal.receiver, "user");
        assert!(terminal.content.as_str().unwrap().contains("timeout"));
        assert!(task.iterations <= MAX_ITERATIONS);
        assert_eq!(task.iterations, MAX_ITERATIONS);
    }

    #[tokio::test]
    async fn every_history_message_carries_the_task_id() {
        let (mut task, _dir) = build_task(vec![("Echo", vec![r#"{"receiver":"user","content":"hi"}"#])], "Echo").await;
        task.invoke("hi").await;
        assert!(task.history.iter().all(|m| m.task_id.as_deref() == Some("t-1")));
    }
}
