pub mod cloudllm;

pub use cloudllm::{Agent, AgentBehavior, Message, Roster, Swarm, Task};
// pub use cloudllm::providers::openai_compatible::OpenAICompatibleAdapter;
