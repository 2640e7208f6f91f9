//! Agent Network
//!
//! Top-level coordinator and the only owner of shared state:
//! - Agent registry, conversation router, task scheduler and task board
//! - Identity ledger and signer pool
//! - Event bus every observable change is published on
//!
//! Every command of the transport maps to one method here. Ledger calls
//! happen before local mutations, so a ledger failure leaves state untouched.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agent::{prompts, Agent, AgentProfile, MessageAnalysis};
use crate::config::{InteractionRules, NetworkTimings};
use crate::connection::ConnectionEdge;
use crate::conversation::SessionSnapshot;
use crate::events::{EventBus, NetworkEvent, ParticipantStatus};
use crate::extract::Extraction;
use crate::ledger::{IdentityLedger, LedgerError, SignerPool};
use crate::oracle::CompletionOracle;
use crate::registry::AgentRegistry;
use crate::router::{ConversationRouter, TurnOutcome};
use crate::scheduler::TaskScheduler;
use crate::selector::select_collaborators;
use crate::task::{Task, TaskBoard, TaskError};

/// Default size of a collaborator listing
pub const DEFAULT_COLLABORATOR_COUNT: usize = 3;

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Agent id must not be empty")]
    EmptyAgentId,

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Agent already exists: {0}")]
    DuplicateAgent(String),

    #[error("Agent {0} is still participating in a conversation")]
    StillParticipating(String),

    #[error("Agent {0} still has work in progress")]
    StillLoaded(String),

    #[error("No signer available")]
    NoSigner,

    #[error("Ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Task: {0}")]
    Task(#[from] TaskError),
}

impl NetworkError {
    /// Rejected before any state was touched
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyAgentId
                | Self::UnknownAgent(_)
                | Self::DuplicateAgent(_)
                | Self::StillParticipating(_)
                | Self::StillLoaded(_)
        )
    }
}

/// What `send_message` did
#[derive(Debug, Clone)]
pub struct MessageOutcome {
    /// The speaker's own voicing of the message
    pub reply: Option<String>,
    pub turn: TurnOutcome,
    pub analysis: Extraction<MessageAnalysis>,
    /// Task spawned by a task-intent message
    pub task_id: Option<String>,
}

pub struct AgentNetwork {
    registry: AgentRegistry,
    router: ConversationRouter,
    scheduler: TaskScheduler,
    tasks: TaskBoard,
    ledger: Arc<dyn IdentityLedger>,
    signers: SignerPool,
    oracle: Arc<dyn CompletionOracle>,
    events: EventBus,
    rules: Arc<InteractionRules>,
    timings: NetworkTimings,
}

impl AgentNetwork {
    pub fn new(
        oracle: Arc<dyn CompletionOracle>,
        ledger: Arc<dyn IdentityLedger>,
        signers: Vec<String>,
        rules: InteractionRules,
        timings: NetworkTimings,
    ) -> Self {
        let rules = Arc::new(rules);
        let events = EventBus::new();
        let registry = AgentRegistry::new();
        let router = ConversationRouter::new(
            registry.clone(),
            events.clone(),
            rules.clone(),
            timings.clone(),
        );
        let scheduler = TaskScheduler::new(registry.clone(), events.clone(), timings.clone());

        Self {
            registry,
            router,
            scheduler,
            tasks: TaskBoard::new(),
            ledger,
            signers: SignerPool::new(signers),
            oracle,
            events,
            rules,
            timings,
        }
    }

    /// Bootstrap check: ledger reachable and at least one signer
    pub async fn initialize(&self) -> Result<(), NetworkError> {
        if self.signers.is_empty() {
            return Err(NetworkError::NoSigner);
        }
        self.ledger.initialize().await?;
        info!("Agent network ready with {} signers", self.signers.len());
        Ok(())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn router(&self) -> &ConversationRouter {
        &self.router
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn rules(&self) -> &InteractionRules {
        &self.rules
    }

    /// Publish failures as `error` events before handing them back
    fn report<T>(&self, result: Result<T, NetworkError>, agent_id: Option<&str>) -> Result<T, NetworkError> {
        if let Err(e) = &result {
            warn!("Command failed: {}", e);
            self.events
                .emit(NetworkEvent::error(e.to_string(), agent_id.map(str::to_string)));
        }
        result
    }

    // ===== Agents =====

    pub async fn create_agent(&self, agent_id: &str) -> Result<AgentProfile, NetworkError> {
        self.create_agent_with_skills(agent_id, None).await
    }

    /// Register a new agent; the ledger sees it before the registry does
    pub async fn create_agent_with_skills(
        &self,
        agent_id: &str,
        skills: Option<Vec<String>>,
    ) -> Result<AgentProfile, NetworkError> {
        let result = self.try_create_agent(agent_id.trim(), skills).await;
        self.report(result, Some(agent_id))
    }

    async fn try_create_agent(&self, id: &str, skills: Option<Vec<String>>) -> Result<AgentProfile, NetworkError> {
        if id.is_empty() {
            return Err(NetworkError::EmptyAgentId);
        }
        if self.registry.contains(id).await {
            return Err(NetworkError::DuplicateAgent(id.to_string()));
        }
        let signer = self.signers.next_signer().ok_or(NetworkError::NoSigner)?;

        self.ledger.register(id, &signer).await?;

        let agent = Agent::new(
            id,
            signer.clone(),
            skills,
            self.rules.clone(),
            self.oracle.clone(),
            self.events.clone(),
        );
        if !self.registry.insert(agent.clone()).await {
            return Err(NetworkError::DuplicateAgent(id.to_string()));
        }
        agent.start_thinking(self.timings.think_interval);

        let profile = agent.profile().await;
        info!("Agent {} created (signer {})", id, signer);
        self.events.emit(NetworkEvent::AgentCreated {
            agent: profile.clone(),
        });
        Ok(profile)
    }

    /// Remove an idle agent and every trace of it in its peers
    pub async fn delete_agent(&self, agent_id: &str) -> Result<(), NetworkError> {
        let result = self.try_delete_agent(agent_id).await;
        self.report(result, Some(agent_id))
    }

    async fn try_delete_agent(&self, id: &str) -> Result<(), NetworkError> {
        let agent = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| NetworkError::UnknownAgent(id.to_string()))?;
        if agent.is_participating().await {
            return Err(NetworkError::StillParticipating(id.to_string()));
        }
        if agent.workload().await > 0 {
            return Err(NetworkError::StillLoaded(id.to_string()));
        }

        self.ledger.deactivate(id, agent.signer()).await?;

        agent.stop_thinking();
        self.registry.remove(id).await;
        for peer in self.registry.all().await {
            peer.forget_peer(id).await;
        }
        self.router.remove_participant(id).await;
        self.router.reset().await;

        info!("Agent {} deleted", id);
        self.events.emit(NetworkEvent::AgentDeleted {
            agent_id: id.to_string(),
            success: true,
        });
        Ok(())
    }

    /// Make `agent_id` the only leader
    pub async fn set_leader(&self, agent_id: &str) -> Result<(), NetworkError> {
        let result = self.try_set_leader(agent_id).await;
        self.report(result, Some(agent_id))
    }

    async fn try_set_leader(&self, id: &str) -> Result<(), NetworkError> {
        let leader = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| NetworkError::UnknownAgent(id.to_string()))?;
        for agent in self.registry.all().await {
            agent.set_leader(false).await;
        }
        leader.set_leader(true).await;

        info!("Agent {} is now leader", id);
        self.events.emit(NetworkEvent::LeaderUpdated {
            leader_id: id.to_string(),
        });
        Ok(())
    }

    pub async fn list_agents(&self) -> Vec<AgentProfile> {
        self.registry.profiles().await
    }

    // ===== Conversation =====

    /// Full inbound-message flow for `speaker`
    ///
    /// The speaker voices the message, the router runs the turn, the message
    /// is classified, and task intent spawns a task owned by the speaker.
    pub async fn send_message(&self, speaker: &str, message: &str) -> Result<MessageOutcome, NetworkError> {
        let result = self.try_send_message(speaker, message).await;
        self.report(result, Some(speaker))
    }

    async fn try_send_message(&self, speaker: &str, message: &str) -> Result<MessageOutcome, NetworkError> {
        let agent = self
            .registry
            .get(speaker)
            .await
            .ok_or_else(|| NetworkError::UnknownAgent(speaker.to_string()))?;

        let reply = agent.generate_response(message, "", None).await;
        if let Some(reply) = &reply {
            self.events.emit(NetworkEvent::message(speaker, reply));
        }

        let turn = self.router.handle_turn(message, speaker).await;

        let analysis = agent.analyze_message(message).await;
        self.emit_participants(speaker).await;

        let task_id = if analysis.get().is_task() {
            Some(self.spawn_task(&agent, message, analysis.get()).await)
        } else {
            None
        };

        Ok(MessageOutcome {
            reply,
            turn,
            analysis,
            task_id,
        })
    }

    async fn emit_participants(&self, speaker: &str) {
        let mut participants = Vec::new();
        for agent in self.registry.others(speaker).await {
            participants.push(ParticipantStatus {
                id: agent.id().to_string(),
                is_participating: agent.is_participating().await,
                connection_strength: agent.connection_strength(speaker).await.unwrap_or(0.0),
            });
        }
        self.events
            .emit(NetworkEvent::ParticipantsUpdate { participants });
    }

    /// Create a task for `owner`, recruit collaborators and hand it over
    async fn spawn_task(&self, owner: &Arc<Agent>, message: &str, analysis: &MessageAnalysis) -> String {
        let mut task = Task::new(message, owner.id());
        task.priority = analysis.priority;
        task.required_skills = analysis.relevant_skills.clone();
        let task_id = task.id.clone();

        let profiles = self.registry.profiles().await;
        let picked = select_collaborators(&profiles, &analysis.relevant_skills, analysis.suggested_participants);
        debug!("Task {}: {} collaborators selected", task_id, picked.len());

        let shared = self.tasks.insert(task).await;
        let invite = prompts::collaboration_invite(message, &analysis.topic, &analysis.relevant_skills);

        for profile in picked {
            let Some(collaborator) = self.registry.get(&profile.id).await else {
                continue;
            };
            shared.write().await.add_collaborator(collaborator.id());
            if !self.router.add_participant(&collaborator).await {
                debug!("No live session to enlist {} in", collaborator.id());
            }

            if let Some(reply) = collaborator.generate_response(&invite, "", Some(owner.id())).await {
                self.events.emit(NetworkEvent::message(collaborator.id(), &reply));
            }
        }

        let snapshot = shared.read().await.clone();
        self.events.emit(NetworkEvent::Task { task: snapshot });

        if !owner.handle_task(shared, &self.scheduler).await {
            warn!("Task {} could not be started by {}", task_id, owner.id());
        }
        task_id
    }

    // ===== Queries =====

    /// Outgoing edges of `agent_id`, strongest first
    pub async fn get_connections(&self, agent_id: &str) -> Result<Vec<ConnectionEdge>, NetworkError> {
        let result = match self.registry.get(agent_id).await {
            Some(agent) => Ok(agent.connections().await),
            None => Err(NetworkError::UnknownAgent(agent_id.to_string())),
        };
        let connections = self.report(result, Some(agent_id))?;
        self.events.emit(NetworkEvent::Connections {
            agent_id: agent_id.to_string(),
            connections: connections.clone(),
        });
        Ok(connections)
    }

    /// Top-`count` closest peers of `agent_id`
    pub async fn get_collaborators(
        &self,
        agent_id: &str,
        count: Option<usize>,
    ) -> Result<Vec<ConnectionEdge>, NetworkError> {
        let k = count.unwrap_or(DEFAULT_COLLABORATOR_COUNT);
        let result = match self.registry.get(agent_id).await {
            Some(agent) => Ok(agent.closest_collaborators(k).await),
            None => Err(NetworkError::UnknownAgent(agent_id.to_string())),
        };
        let collaborators = self.report(result, Some(agent_id))?;
        self.events.emit(NetworkEvent::Collaborators {
            agent_id: agent_id.to_string(),
            collaborators: collaborators.clone(),
        });
        Ok(collaborators)
    }

    // ===== Tasks =====

    /// Mark one plan step completed; the progress poll finishes the task
    pub async fn complete_plan_step(&self, task_id: &str, step_id: &str) -> Result<Task, NetworkError> {
        let result = self.tasks.complete_step(task_id, step_id).await.map_err(NetworkError::from);
        let task = self.report(result, None)?;
        self.events.emit(NetworkEvent::Task { task: task.clone() });
        Ok(task)
    }

    pub async fn task(&self, task_id: &str) -> Option<Task> {
        match self.tasks.get(task_id).await {
            Some(shared) => Some(shared.read().await.clone()),
            None => None,
        }
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.tasks.snapshot().await
    }

    pub async fn session_snapshot(&self) -> Option<SessionSnapshot> {
        self.router.session_snapshot().await
    }

    /// Stop every background loop
    pub async fn shutdown(&self) {
        self.scheduler.shutdown();
        self.router.shutdown();
        for agent in self.registry.all().await {
            agent.stop_thinking();
        }
        info!("Agent network shut down");
    }
}
