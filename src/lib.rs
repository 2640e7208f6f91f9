//! agentnet
//!
//! Orchestration engine for a small network of conversational agents.
//!
//! # Features
//!
//! - **Weighted Connections**: Per-peer strength driven by interaction quality
//! - **Conversation Routing**: Session-scoped fan-out with a turn ceiling
//! - **Task Delegation**: Skill/workload collaborator selection and plans
//! - **Background Loops**: Think, collaboration pulse and progress poll
//! - **Identity Ledger**: Agents are registered externally before they exist
//! - **Event Bus**: Every change streamed over WebSocket / SSE
//!
//! # Architecture
//!
//! ```text
//! Client ──► WebSocket ──► AgentNetwork ──► CompletionOracle
//!                              │
//!                              ├── AgentRegistry (Agents + Connections)
//!                              ├── ConversationRouter (Session)
//!                              ├── TaskScheduler (Pulse + Poll)
//!                              ├── IdentityLedger (Signers)
//!                              └── EventBus ──► WebSocket / SSE
//! ```

pub mod agent;
pub mod config;
pub mod connection;
pub mod conversation;
pub mod events;
pub mod extract;
pub mod ledger;
pub mod markup;
pub mod network;
pub mod oracle;
pub mod periodic;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod selector;
pub mod server;
pub mod task;

pub use agent::{Agent, AgentProfile, MessageAnalysis, MessageKind};
pub use config::{Config, InteractionRules, NetworkTimings, OracleConfig};
pub use connection::{ConnectionEdge, ConnectionModel, ConnectionStats};
pub use conversation::{ConversationSession, SessionSnapshot};
pub use events::{ChatMessage, EventBus, NetworkEvent};
pub use ledger::{HttpLedger, IdentityLedger, InMemoryLedger, LedgerError, SignerPool};
pub use network::{AgentNetwork, MessageOutcome, NetworkError};
pub use oracle::{ChatCompletionsClient, CompletionOracle, CompletionRequest, OracleError, Purpose};
pub use registry::AgentRegistry;
pub use router::{ConversationRouter, TurnOutcome};
pub use scheduler::TaskScheduler;
pub use server::Server;
pub use task::{ExecutionPlan, Priority, Task, TaskError, TaskProgress, TaskStatus};
