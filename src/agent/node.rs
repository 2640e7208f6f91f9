//! The agent itself
//!
//! An agent owns its connection model, rolling context, workload and skills.
//! All language decisions go through the oracle; every oracle failure is
//! absorbed here and turned into a conservative outcome.

use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::analysis::MessageAnalysis;
use super::prompts;
use crate::config::InteractionRules;
use crate::connection::{ConnectionEdge, ConnectionModel, ConnectionStats};
use crate::conversation::ContextWindow;
use crate::events::{EventBus, NetworkEvent};
use crate::extract::{extract_or_default, Extraction};
use crate::markup::strip_markup;
use crate::oracle::{CompletionOracle, CompletionRequest, Purpose};
use crate::periodic::PeriodicTask;

/// Skills every agent starts with
pub const DEFAULT_SKILLS: [&str; 3] = ["communication", "analysis", "planning"];

/// Mutable agent state
#[derive(Debug)]
pub struct AgentState {
    pub is_leader: bool,
    pub is_participating: bool,
    pub workload: u32,
    pub skills: BTreeSet<String>,
    pub connections: ConnectionModel,
    pub context: ContextWindow,
}

/// Public snapshot of an agent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub id: String,
    pub skills: Vec<String>,
    pub workload: u32,
    pub max_workload: u32,
    pub is_leader: bool,
    pub is_participating: bool,
}

impl AgentProfile {
    pub fn can_accept_task(&self) -> bool {
        self.workload < self.max_workload
    }

    /// 0.7 × skill coverage + 0.3 × spare capacity
    pub fn capability(&self, required: &[String]) -> f64 {
        let skill_score = if required.is_empty() {
            1.0
        } else {
            let matched = required.iter().filter(|s| self.skills.contains(s)).count();
            matched as f64 / required.len() as f64
        };
        let workload_score = if self.max_workload == 0 {
            0.0
        } else {
            1.0 - self.workload as f64 / self.max_workload as f64
        };
        skill_score * 0.7 + workload_score * 0.3
    }
}

/// A participant of the network
pub struct Agent {
    id: String,
    signer: String,
    rules: Arc<InteractionRules>,
    pub(super) oracle: Arc<dyn CompletionOracle>,
    pub(super) events: EventBus,
    pub(super) state: RwLock<AgentState>,
    thinking: Mutex<Option<PeriodicTask>>,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        signer: impl Into<String>,
        skills: Option<Vec<String>>,
        rules: Arc<InteractionRules>,
        oracle: Arc<dyn CompletionOracle>,
        events: EventBus,
    ) -> Arc<Self> {
        let skills: BTreeSet<String> = match skills {
            Some(list) if !list.is_empty() => list.into_iter().collect(),
            _ => DEFAULT_SKILLS.iter().map(|s| s.to_string()).collect(),
        };

        let state = AgentState {
            is_leader: false,
            is_participating: false,
            workload: 0,
            skills,
            connections: ConnectionModel::new(rules.clone()),
            context: ContextWindow::new(rules.context_window),
        };

        Arc::new(Self {
            id: id.into(),
            signer: signer.into(),
            rules,
            oracle,
            events,
            state: RwLock::new(state),
            thinking: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn signer(&self) -> &str {
        &self.signer
    }

    pub fn rules(&self) -> &InteractionRules {
        &self.rules
    }

    // ===== Idle thinking =====

    /// Start the idle-think loop; it only holds a weak reference
    pub fn start_thinking(self: &Arc<Self>, period: Duration) {
        let weak: Weak<Agent> = Arc::downgrade(self);
        let task = PeriodicTask::spawn(format!("think:{}", self.id), period, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(agent) => {
                        agent.think().await;
                        ControlFlow::Continue(())
                    }
                    None => ControlFlow::Break(()),
                }
            }
        });

        let mut slot = self.thinking.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(task);
    }

    /// Abort the idle-think loop
    pub fn stop_thinking(&self) {
        let task = self.thinking.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.cancel();
        }
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Volunteer a remark if participating and there is something to add
    pub async fn think(&self) -> Option<String> {
        let recent = {
            let state = self.state.read().await;
            if !state.is_participating || state.context.is_empty() {
                return None;
            }
            state.context.render_recent(3)
        };

        let request = CompletionRequest::new(Purpose::Thought, prompts::thought(&self.id, &recent));
        let reply = match self.oracle.complete(request).await {
            Ok(reply) => strip_markup(&reply),
            Err(e) => {
                warn!("Agent {} think failed: {}", self.id, e);
                return None;
            }
        };

        if reply.is_empty() || reply.contains(prompts::NOTHING_SENTINEL) {
            debug!("Agent {} has nothing to add", self.id);
            return None;
        }

        self.events.emit(NetworkEvent::message(&self.id, &reply));
        self.state.write().await.context.push(&self.id, &reply);
        Some(reply)
    }

    // ===== Conversation =====

    /// Ask the oracle whether this agent should join; failures mean no
    pub async fn evaluate_participation(&self, message: &str, session_context: &str) -> bool {
        let own = self.state.read().await.context.render_recent(3);
        let prompt = prompts::participation(&self.id, &own, session_context, message);

        match self
            .oracle
            .complete(CompletionRequest::new(Purpose::Participation, prompt))
            .await
        {
            Ok(reply) => {
                let affirmative = reply.to_lowercase().contains("true");
                if affirmative {
                    self.state.write().await.is_participating = true;
                }
                debug!("Agent {} participation: {}", self.id, affirmative);
                affirmative
            }
            Err(e) => {
                warn!("Agent {} participation check failed: {}", self.id, e);
                false
            }
        }
    }

    /// Produce a reply to `message`, or `None` when gated silent
    ///
    /// The inbound message is always recorded first. A non-leader whose
    /// strength toward `source` is below the response threshold stays silent
    /// without consulting the oracle. Oracle failures yield an apology.
    pub async fn generate_response(
        &self,
        message: &str,
        session_context: &str,
        source: Option<&str>,
    ) -> Option<String> {
        let (strength, is_leader, recent) = {
            let mut state = self.state.write().await;
            state.context.push(source.unwrap_or("user"), message);

            let strength = match source {
                Some(peer) => state.connections.strength_or_min(peer),
                None => self.rules.max_connection,
            };
            (strength, state.is_leader, state.context.render_recent(5))
        };

        if source.is_some() && !is_leader && strength < self.rules.response_threshold {
            debug!(
                "Agent {} silent toward {:?} (strength {:.2})",
                self.id, source, strength
            );
            return None;
        }

        let system = prompts::reply_system(&self.id, is_leader, &recent, source, strength, session_context);
        let request = CompletionRequest::new(Purpose::Reply, system)
            .with_user_message(message)
            .with_temperature(self.rules.temperature_for(strength));

        match self.oracle.complete(request).await {
            Ok(reply) => {
                let reply = strip_markup(&reply);
                if reply.is_empty() {
                    return None;
                }
                self.state.write().await.context.push(&self.id, &reply);
                Some(reply)
            }
            Err(e) => {
                warn!("Agent {} reply failed: {}", self.id, e);
                Some(prompts::apology(&self.id))
            }
        }
    }

    /// Classify a message; any failure yields the default analysis
    pub async fn analyze_message(&self, message: &str) -> Extraction<MessageAnalysis> {
        let request = CompletionRequest::new(Purpose::Analysis, prompts::analysis_system())
            .with_user_message(message);

        match self.oracle.complete(request).await {
            Ok(reply) => extract_or_default(&reply, MessageAnalysis::default),
            Err(e) => {
                warn!("Agent {} analysis failed: {}", self.id, e);
                Extraction::Default(MessageAnalysis::default())
            }
        }
    }

    // ===== Connections =====

    /// Update the outgoing connection toward `peer`
    pub async fn record_interaction(&self, peer: &str, quality: f64) -> f64 {
        let strength = self.state.write().await.connections.update(peer, quality);
        debug!("Agent {} -> {}: strength {:.3}", self.id, peer, strength);
        strength
    }

    pub async fn connection_strength(&self, peer: &str) -> Option<f64> {
        self.state.read().await.connections.strength(peer)
    }

    pub async fn set_connection_strength(&self, peer: &str, strength: f64) {
        self.state.write().await.connections.set_strength(peer, strength);
    }

    pub async fn connection_stats(&self, peer: &str) -> ConnectionStats {
        self.state.read().await.connections.stats(peer)
    }

    pub async fn connections(&self) -> Vec<ConnectionEdge> {
        self.state.read().await.connections.connections()
    }

    pub async fn closest_collaborators(&self, k: usize) -> Vec<ConnectionEdge> {
        self.state.read().await.connections.closest_collaborators(k)
    }

    /// Weighted-random pick of whom to address next
    pub async fn select_response_target(&self, pool: &[String]) -> Option<String> {
        let state = self.state.read().await;
        let mut rng = rand::thread_rng();
        state
            .connections
            .select_response_target(&self.id, pool, &mut rng)
            .map(str::to_string)
    }

    pub async fn should_continue_dialog(&self, last_speaker: &str) -> bool {
        let state = self.state.read().await;
        let mut rng = rand::thread_rng();
        state
            .connections
            .should_continue_dialog(&self.id, last_speaker, &mut rng)
    }

    /// Drop every trace of `peer`
    pub async fn forget_peer(&self, peer: &str) {
        self.state.write().await.connections.remove_peer(peer);
    }

    pub async fn knows_peer(&self, peer: &str) -> bool {
        self.state.read().await.connections.knows(peer)
    }

    // ===== Status =====

    pub async fn set_leader(&self, is_leader: bool) {
        self.state.write().await.is_leader = is_leader;
    }

    pub async fn is_leader(&self) -> bool {
        self.state.read().await.is_leader
    }

    pub async fn set_participating(&self, participating: bool) {
        self.state.write().await.is_participating = participating;
    }

    pub async fn is_participating(&self) -> bool {
        self.state.read().await.is_participating
    }

    pub async fn workload(&self) -> u32 {
        self.state.read().await.workload
    }

    pub async fn can_accept_task(&self) -> bool {
        self.state.read().await.workload < self.rules.max_workload
    }

    /// Adjust workload, clamped to `[0, max_workload]`
    pub async fn update_workload(&self, delta: i32) -> u32 {
        let mut state = self.state.write().await;
        let next = (state.workload as i64 + delta as i64).clamp(0, self.rules.max_workload as i64);
        state.workload = next as u32;
        state.workload
    }

    pub async fn has_required_skills(&self, required: &[String]) -> bool {
        let state = self.state.read().await;
        required.iter().all(|s| state.skills.contains(s))
    }

    pub async fn evaluate_task_capability(&self, required: &[String]) -> f64 {
        self.profile().await.capability(required)
    }

    /// Recent private context as prompt lines
    pub async fn recent_context(&self, n: usize) -> String {
        self.state.read().await.context.render_recent(n)
    }

    pub async fn profile(&self) -> AgentProfile {
        let state = self.state.read().await;
        AgentProfile {
            id: self.id.clone(),
            skills: state.skills.iter().cloned().collect(),
            workload: state.workload,
            max_workload: self.rules.max_workload,
            is_leader: state.is_leader,
            is_participating: state.is_participating,
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        info!("Agent {} dropped", self.id);
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed reply (or fails) and counts calls
    struct FixedOracle {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl FixedOracle {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionOracle for FixedOracle {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().ok_or(OracleError::EmptyResponse)
        }
    }

    fn agent_with(oracle: Arc<FixedOracle>, rules: InteractionRules) -> Arc<Agent> {
        Agent::new("A", "signer-0", None, Arc::new(rules), oracle, EventBus::new())
    }

    #[tokio::test]
    async fn test_default_skills_and_profile() {
        let agent = agent_with(FixedOracle::replying("x"), InteractionRules::default());
        let profile = agent.profile().await;
        assert_eq!(profile.skills, vec!["analysis", "communication", "planning"]);
        assert_eq!(profile.max_workload, 3);
        assert!(!profile.is_leader);
    }

    #[tokio::test]
    async fn test_silence_gate_skips_oracle() {
        let rules = InteractionRules {
            min_connection: 0.05,
            ..InteractionRules::default()
        };
        let oracle = FixedOracle::replying("hello");
        let agent = agent_with(oracle.clone(), rules);
        agent.set_connection_strength("B", 0.10).await;

        let reply = agent.generate_response("hi", "", Some("B")).await;
        assert!(reply.is_none());
        assert_eq!(oracle.calls(), 0);
        // inbound message still recorded
        assert_eq!(agent.recent_context(5).await, "B: hi");
    }

    #[tokio::test]
    async fn test_leader_ignores_gate() {
        let rules = InteractionRules {
            min_connection: 0.05,
            ..InteractionRules::default()
        };
        let oracle = FixedOracle::replying("**hello**");
        let agent = agent_with(oracle.clone(), rules);
        agent.set_connection_strength("B", 0.10).await;
        agent.set_leader(true).await;

        let reply = agent.generate_response("hi", "", Some("B")).await;
        assert_eq!(reply.as_deref(), Some("hello"));
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_oracle_failure_yields_apology() {
        let agent = agent_with(FixedOracle::failing(), InteractionRules::default());
        let reply = agent.generate_response("hi", "", None).await;
        assert_eq!(reply.as_deref(), Some("[A] ran into a technical problem."));
    }

    #[tokio::test]
    async fn test_participation_sets_flag() {
        let agent = agent_with(FixedOracle::replying("TRUE, definitely"), InteractionRules::default());
        assert!(agent.evaluate_participation("hi", "").await);
        assert!(agent.is_participating().await);

        let agent = agent_with(FixedOracle::failing(), InteractionRules::default());
        assert!(!agent.evaluate_participation("hi", "").await);
        assert!(!agent.is_participating().await);
    }

    #[tokio::test]
    async fn test_think_requires_participation_and_context() {
        let oracle = FixedOracle::replying("An idea");
        let agent = agent_with(oracle.clone(), InteractionRules::default());
        assert!(agent.think().await.is_none());
        assert_eq!(oracle.calls(), 0);

        agent.set_participating(true).await;
        agent.generate_response("hi", "", None).await;
        assert_eq!(agent.think().await.as_deref(), Some("An idea"));
    }

    #[tokio::test]
    async fn test_think_nothing_sentinel() {
        let agent = agent_with(FixedOracle::replying("NOTHING"), InteractionRules::default());
        agent.set_participating(true).await;
        agent.generate_response("hi", "", None).await;
        assert!(agent.think().await.is_none());
    }

    #[tokio::test]
    async fn test_workload_clamped() {
        let agent = agent_with(FixedOracle::replying("x"), InteractionRules::default());
        assert_eq!(agent.update_workload(-1).await, 0);
        assert_eq!(agent.update_workload(5).await, 3);
        assert!(!agent.can_accept_task().await);
        assert_eq!(agent.update_workload(-1).await, 2);
        assert!(agent.can_accept_task().await);
    }

    #[tokio::test]
    async fn test_analysis_failure_defaults() {
        let agent = agent_with(FixedOracle::failing(), InteractionRules::default());
        let analysis = agent.analyze_message("do the thing").await;
        assert!(analysis.is_default());
        assert!(!analysis.get().is_task());
    }

    #[test]
    fn test_capability_score() {
        let profile = AgentProfile {
            id: "A".into(),
            skills: vec!["analysis".into(), "planning".into()],
            workload: 1,
            max_workload: 3,
            is_leader: false,
            is_participating: false,
        };
        let required = vec!["analysis".to_string(), "coding".to_string()];
        let expected = 0.7 * 0.5 + 0.3 * (1.0 - 1.0 / 3.0);
        assert!((profile.capability(&required) - expected).abs() < 1e-9);
        assert!((profile.capability(&[]) - (0.7 + 0.3 * (2.0 / 3.0))).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_think_loop_stops_on_drop() {
        let agent = agent_with(FixedOracle::replying("x"), InteractionRules::default());
        agent.start_thinking(Duration::from_secs(10));
        assert!(agent.is_thinking());
        agent.stop_thinking();
        assert!(!agent.is_thinking());
    }
}
