//! Network Events
//!
//! Everything observable about the network is published as a [`NetworkEvent`]
//! on the [`EventBus`]:
//! - WebSocket clients receive every event as JSON (`type` tag)
//! - `/api/events` re-exposes the same stream as SSE
//! - Emitting never blocks and never fails; events without listeners are dropped

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::agent::AgentProfile;
use crate::connection::ConnectionEdge;
use crate::task::{Task, TaskProgress};

/// Default channel capacity; slow subscribers lag past this
const DEFAULT_CAPACITY: usize = 1024;

/// A chat line as shown to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Participation snapshot of one agent relative to a speaker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantStatus {
    pub id: String,
    pub is_participating: bool,
    /// Outgoing strength toward the speaker, 0 when never interacted
    pub connection_strength: f64,
}

/// Event published to every subscriber
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NetworkEvent {
    AgentList {
        agents: Vec<AgentProfile>,
    },
    AgentCreated {
        agent: AgentProfile,
    },
    AgentDeleted {
        agent_id: String,
        success: bool,
    },
    LeaderUpdated {
        leader_id: String,
    },
    Message {
        message: ChatMessage,
    },
    Task {
        task: Task,
    },
    TaskProgress {
        progress: TaskProgress,
    },
    ParticipantsUpdate {
        participants: Vec<ParticipantStatus>,
    },
    Connections {
        agent_id: String,
        connections: Vec<ConnectionEdge>,
    },
    Collaborators {
        agent_id: String,
        collaborators: Vec<ConnectionEdge>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },
}

impl NetworkEvent {
    /// Chat line event
    pub fn message(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Message {
            message: ChatMessage::new(sender, content),
        }
    }

    pub fn error(message: impl Into<String>, agent_id: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            agent_id,
        }
    }

    /// Event name as it appears in the `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentList { .. } => "agentList",
            Self::AgentCreated { .. } => "agentCreated",
            Self::AgentDeleted { .. } => "agentDeleted",
            Self::LeaderUpdated { .. } => "leaderUpdated",
            Self::Message { .. } => "message",
            Self::Task { .. } => "task",
            Self::TaskProgress { .. } => "taskProgress",
            Self::ParticipantsUpdate { .. } => "participantsUpdate",
            Self::Connections { .. } => "connections",
            Self::Collaborators { .. } => "collaborators",
            Self::Error { .. } => "error",
        }
    }
}

/// Fan-out sink for network events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NetworkEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event (fire-and-forget)
    pub fn emit(&self, event: NetworkEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            trace!("No subscribers for {} event", kind);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
