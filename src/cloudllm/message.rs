//! The envelope that flows through a task's message pump.
//!
//! Grounded on the provider-facing [`crate::cloudllm::provider::ChatMessage`] role
//! taxonomy and on the reference scheduler's `AgentMessage`, but promoted to
//! a first-class, round-trip-safe record: unlike the source this crate is
//! modeled on, `from_map` never silently drops a field that `to_map` wrote.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

/// The literal receiver that terminates a task when dequeued.
pub const USER_SENTINEL: &str = "user";
/// The literal sender used for scheduler-synthesized messages.
pub const SYSTEM_SENTINEL: &str = "system";

/// An immutable envelope for one turn of conversation.
///
/// Messages are created once by their initiator (a user, an agent, or the
/// pump's error/timeout synthesizer) and are never mutated afterward; the
/// pump only ever appends them to `history`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_id: String,
    pub sender: String,
    pub receiver: String,
    pub next_receiver: Option<String>,
    pub content: Value,
    pub task_id: Option<String>,
    pub token_usage: u64,
    pub metadata: HashMap<String, Value>,
    pub timestamp: String,
}

/// Builder-style construction; only `content` is required, everything else
/// defaults the way the reference scheduler's constructor does.
pub struct MessageBuilder {
    sender: String,
    receiver: String,
    next_receiver: Option<String>,
    content: Value,
    task_id: Option<String>,
    token_usage: u64,
    metadata: HashMap<String, Value>,
}

impl Message {
    /// Start building a message with the given content.
    pub fn builder(content: impl Into<Value>) -> MessageBuilder {
        MessageBuilder {
            sender: String::new(),
            receiver: String::new(),
            next_receiver: None,
            content: content.into(),
            task_id: None,
            token_usage: 0,
            metadata: HashMap::new(),
        }
    }

    /// Convenience constructor for a plain text message with sender/receiver
    /// already known, used heavily by the pump's synthetic messages.
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, content: impl Into<Value>) -> Self {
        Message::builder(content)
            .sender(sender)
            .receiver(receiver)
            .build()
    }

    pub fn is_for_user(&self) -> bool {
        self.receiver == USER_SENTINEL
    }

    /// Canonical mapping for persistence (history snapshots, round-trip law).
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("message_id".into(), Value::String(self.message_id.clone()));
        map.insert("sender".into(), Value::String(self.sender.clone()));
        map.insert("receiver".into(), Value::String(self.receiver.clone()));
        map.insert(
            "next_receiver".into(),
            match &self.next_receiver {
                Some(r) => Value::String(r.clone()),
                None => Value::Null,
            },
        );
        map.insert("content".into(), self.content.clone());
        map.insert(
            "task_id".into(),
            match &self.task_id {
                Some(t) => Value::String(t.clone()),
                None => Value::Null,
            },
        );
        map.insert("token_usage".into(), Value::from(self.token_usage));
        map.insert(
            "metadata".into(),
            Value::Object(self.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        );
        map.insert("timestamp".into(), Value::String(self.timestamp.clone()));
        map
    }

    /// Reconstruct a message from a mapping produced by [`Message::to_map`].
    /// Preserves `message_id` and `timestamp` when present, generating fresh
    /// ones otherwise; every other field round-trips exactly, including
    /// `next_receiver`.
    pub fn from_map(map: &Map<String, Value>) -> Message {
        let sender = map
            .get("sender")
            .and_then(Value::as_str)
            .unwrap_or(USER_SENTINEL)
            .to_string();
        let receiver = map
            .get("receiver")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let next_receiver = map
            .get("next_receiver")
            .and_then(Value::as_str)
            .map(|s| s.to_string());
        let content = map.get("content").cloned().unwrap_or(Value::Null);
        let task_id = map.get("task_id").and_then(Value::as_str).map(|s| s.to_string());
        let token_usage = map.get("token_usage").and_then(Value::as_u64).unwrap_or(0);
        let metadata = map
            .get("metadata")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let message_id = map
            .get("message_id")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let timestamp = map
            .get("timestamp")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .unwrap_or_else(|| Utc::now().to_rfc3339());

        Message {
            message_id,
            sender,
            receiver,
            next_receiver,
            content,
            task_id,
            token_usage,
            metadata,
            timestamp,
        }
    }
}

impl MessageBuilder {
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = receiver.into();
        self
    }

    pub fn next_receiver(mut self, next_receiver: impl Into<String>) -> Self {
        self.next_receiver = Some(next_receiver.into());
        self
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn token_usage(mut self, token_usage: u64) -> Self {
        self.token_usage = token_usage;
        self
    }

    pub fn metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn build(self) -> Message {
        Message {
            message_id: Uuid::new_v4().to_string(),
            sender: self.sender,
            receiver: self.receiver,
            next_receiver: self.next_receiver,
            content: self.content,
            task_id: self.task_id,
            token_usage: self.token_usage,
            metadata: self.metadata,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
