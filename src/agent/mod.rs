//! Agents
//!
//! An agent is a conversational participant of the network:
//! - Directional connection strengths toward its peers
//! - A rolling private context and an idle "think" loop
//! - Workload and skills used for collaborator selection
//! - Ownership of the tasks its messages spawn

pub mod analysis;
pub mod node;
pub mod prompts;
mod work;

pub use analysis::{MessageAnalysis, MessageKind};
pub use node::{Agent, AgentProfile, AgentState, DEFAULT_SKILLS};
