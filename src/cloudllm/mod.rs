// src/cloudllm/mod.rs

pub mod agent;
pub mod card;
pub mod config;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;
pub mod roster;
pub mod swarm;
pub mod task;
pub mod tool;

// Let's explicitly export the core runtime types so callers don't have to
// navigate through the whole hierarchy, and instead reach them as
// cloudllm::Agent, cloudllm::Swarm, etc.
pub use agent::{Agent, AgentBehavior};
pub use message::Message;
pub use roster::Roster;
pub use swarm::Swarm;
pub use task::Task;
