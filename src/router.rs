//! Conversation Router
//!
//! Owns the single shared conversation session and drives each turn:
//! - Folds every inbound message into the live session (creating it if needed)
//! - Fans the message out to every other agent concurrently
//! - Discards the session after a period of inactivity
//!
//! Per-agent failures and panics are isolated; a turn waits for every agent.

use futures_util::future::join_all;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::config::{InteractionRules, NetworkTimings};
use crate::conversation::{ConversationSession, SessionSnapshot};
use crate::events::{EventBus, NetworkEvent};
use crate::periodic::PeriodicTask;
use crate::registry::AgentRegistry;

/// Quality credited when an agent replied
const REPLY_QUALITY: f64 = 0.8;
/// Quality credited when an agent joined but stayed silent
const SILENT_QUALITY: f64 = 0.0;

type SharedSession = Arc<Mutex<Option<ConversationSession>>>;

/// What happened during one turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutcome {
    /// Turn number within the session
    pub turn: u32,
    /// Agents asked to evaluate participation
    pub consulted: usize,
    /// (agent, reply) in completion order
    pub replies: Vec<(String, String)>,
    /// The max-turns ceiling suppressed fan-out
    pub capped: bool,
}

pub struct ConversationRouter {
    registry: AgentRegistry,
    events: EventBus,
    rules: Arc<InteractionRules>,
    timings: NetworkTimings,
    session: SharedSession,
    sweep: std::sync::Mutex<Option<PeriodicTask>>,
}

impl ConversationRouter {
    pub fn new(
        registry: AgentRegistry,
        events: EventBus,
        rules: Arc<InteractionRules>,
        timings: NetworkTimings,
    ) -> Self {
        Self {
            registry,
            events,
            rules,
            timings,
            session: Arc::new(Mutex::new(None)),
            sweep: std::sync::Mutex::new(None),
        }
    }

    /// Run one conversation turn for `message` spoken by `speaker`
    pub async fn handle_turn(&self, message: &str, speaker: &str) -> TurnOutcome {
        let (turn, context, created) = {
            let mut guard = self.session.lock().await;
            let created = guard.is_none();
            let session = guard.get_or_insert_with(|| ConversationSession::new(speaker));
            session.active_agents.insert(speaker.to_string());
            let turn = session.record_turn(speaker, message);
            (turn, session.render_context(), created)
        };

        if created {
            info!("Conversation session started by {}", speaker);
            self.restart_sweep();
        }

        let mut outcome = TurnOutcome {
            turn,
            ..TurnOutcome::default()
        };

        if self.rules.max_conversation_turns.is_some_and(|max| turn > max) {
            debug!("Turn {} beyond ceiling, recorded without fan-out", turn);
            outcome.capped = true;
            return outcome;
        }

        if !self.registry.contains(speaker).await {
            debug!("Unknown speaker {}, recorded without fan-out", speaker);
            return outcome;
        }

        let others = self.registry.others(speaker).await;
        outcome.consulted = others.len();

        let handles = others.into_iter().map(|agent| {
            let session = self.session.clone();
            let events = self.events.clone();
            let message = message.to_string();
            let context = context.clone();
            let speaker = speaker.to_string();
            let agent_id = agent.id().to_string();
            let handle = tokio::spawn(async move {
                respond(agent, &message, &context, &speaker, &session, &events).await
            });
            (agent_id, handle)
        });

        let (ids, handles): (Vec<String>, Vec<_>) = handles.unzip();
        for (agent_id, result) in ids.into_iter().zip(join_all(handles).await) {
            match result {
                Ok(Some(reply)) => outcome.replies.push((agent_id, reply)),
                Ok(None) => {}
                Err(e) => warn!("Agent {} turn aborted: {}", agent_id, e),
            }
        }

        debug!(
            "Turn {} done: {} consulted, {} replied",
            turn,
            outcome.consulted,
            outcome.replies.len()
        );
        outcome
    }

    /// Every new session gets its own sweep; a loop left over from the
    /// previous session may still be finishing its last tick
    fn restart_sweep(&self) {
        let mut slot = self.sweep.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.take() {
            previous.cancel();
        }

        let session = self.session.clone();
        let registry = self.registry.clone();
        let timeout = self.timings.session_timeout;
        *slot = Some(PeriodicTask::spawn(
            "session-sweep",
            self.timings.sweep_interval,
            move || {
                let session = session.clone();
                let registry = registry.clone();
                async move { sweep_once(&session, &registry, timeout).await }
            },
        ));
    }

    /// Discard the session if idle past the timeout; true if it was discarded
    pub async fn sweep_idle(&self) -> bool {
        let idle = self
            .session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.is_idle(self.timings.session_timeout));
        if !idle {
            return false;
        }
        let _ = sweep_once(&self.session, &self.registry, self.timings.session_timeout).await;
        true
    }

    /// Mark `agent` participating and enlist it in the live session so
    /// teardown releases it; false (and untouched) when no session is live
    pub async fn add_participant(&self, agent: &Agent) -> bool {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return false;
        };
        session.active_agents.insert(agent.id().to_string());
        agent.set_participating(true).await;
        true
    }

    /// Drop `agent_id` from the live session's participants
    pub async fn remove_participant(&self, agent_id: &str) {
        if let Some(session) = self.session.lock().await.as_mut() {
            session.active_agents.remove(agent_id);
        }
    }

    /// Discard the session and its sweep
    pub async fn reset(&self) {
        {
            let mut guard = self.session.lock().await;
            if let Some(session) = guard.take() {
                release_participants(&session, &self.registry).await;
                info!("Conversation session reset after {} turns", session.turns);
            }
        }
        self.stop_sweep();
    }

    pub async fn session_snapshot(&self) -> Option<SessionSnapshot> {
        self.session.lock().await.as_ref().map(SessionSnapshot::from)
    }

    pub async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    fn stop_sweep(&self) {
        let task = self.sweep.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.cancel();
        }
    }

    pub fn shutdown(&self) {
        self.stop_sweep();
    }
}

/// One agent's share of a turn; returns its reply if any
async fn respond(
    agent: Arc<Agent>,
    message: &str,
    context: &str,
    speaker: &str,
    session: &SharedSession,
    events: &EventBus,
) -> Option<String> {
    if !agent.evaluate_participation(message, context).await {
        return None;
    }

    if let Some(s) = session.lock().await.as_mut() {
        s.active_agents.insert(agent.id().to_string());
    }

    match agent.generate_response(message, context, Some(speaker)).await {
        Some(reply) => {
            events.emit(NetworkEvent::message(agent.id(), &reply));
            if let Some(s) = session.lock().await.as_mut() {
                s.append_reply(agent.id(), &reply);
            }
            agent.record_interaction(speaker, REPLY_QUALITY).await;
            Some(reply)
        }
        None => {
            agent.record_interaction(speaker, SILENT_QUALITY).await;
            None
        }
    }
}

/// Discard an idle session; ends the sweep loop once no session is left
async fn sweep_once(
    session: &SharedSession,
    registry: &AgentRegistry,
    timeout: std::time::Duration,
) -> ControlFlow<()> {
    // Held until participants are released so no new session starts meanwhile
    let mut guard = session.lock().await;
    let idle = match guard.as_ref() {
        None => return ControlFlow::Break(()),
        Some(s) => s.is_idle(timeout),
    };
    if !idle {
        return ControlFlow::Continue(());
    }

    if let Some(discarded) = guard.take() {
        info!(
            "Conversation session idle for over {:?}, discarding ({} turns)",
            timeout, discarded.turns
        );
        release_participants(&discarded, registry).await;
    }
    ControlFlow::Break(())
}

async fn release_participants(session: &ConversationSession, registry: &AgentRegistry) {
    for id in &session.active_agents {
        if let Some(agent) = registry.get(id).await {
            agent.set_participating(false).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn router() -> ConversationRouter {
        ConversationRouter::new(
            AgentRegistry::new(),
            EventBus::new(),
            Arc::new(InteractionRules::default()),
            NetworkTimings::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_session_replaces_lingering_sweep() {
        let router = router();

        // Stands in for the previous session's loop still finishing its last tick
        *router.sweep.lock().unwrap() = Some(PeriodicTask::spawn(
            "lingering-sweep",
            Duration::from_secs(24 * 60 * 60),
            || async { ControlFlow::Continue(()) },
        ));

        router.handle_turn("hello", "ghost").await;
        assert!(router.has_session().await);

        tokio::time::sleep(Duration::from_secs(7 * 60)).await;
        assert!(!router.has_session().await);
    }

    struct SilentOracle;

    #[async_trait::async_trait]
    impl crate::oracle::CompletionOracle for SilentOracle {
        async fn complete(
            &self,
            _request: crate::oracle::CompletionRequest,
        ) -> Result<String, crate::oracle::OracleError> {
            Ok("false".to_string())
        }
    }

    #[tokio::test]
    async fn test_add_participant_needs_live_session() {
        let registry = AgentRegistry::new();
        let router = ConversationRouter::new(
            registry.clone(),
            EventBus::new(),
            Arc::new(InteractionRules::default()),
            NetworkTimings::default(),
        );
        let helper = Agent::new(
            "A2",
            "signer",
            None,
            Arc::new(InteractionRules::default()),
            Arc::new(SilentOracle),
            EventBus::new(),
        );
        assert!(!router.add_participant(&helper).await);
        assert!(!helper.is_participating().await);
        registry.insert(helper.clone()).await;

        router.handle_turn("hello", "A1").await;
        assert!(router.add_participant(&helper).await);
        assert!(helper.is_participating().await);

        let snapshot = router.session_snapshot().await.unwrap();
        assert_eq!(snapshot.active_agents, vec!["A1", "A2"]);

        router.reset().await;
        assert!(!helper.is_participating().await);
        router.shutdown();
    }
}
