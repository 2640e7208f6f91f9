//! Conversation State
//!
//! Two kinds of history:
//! - [`ContextWindow`]: an agent's private rolling window (oldest evicted first)
//! - [`ConversationSession`]: the single shared exchange the router drives

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// A single line of history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextEntry {
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ContextEntry {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Render entries as `sender: text` lines
pub fn render<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = &'a ContextEntry>,
{
    entries
        .into_iter()
        .map(|e| format!("{}: {}", e.sender, e.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Bounded rolling context of one agent
#[derive(Debug, Clone)]
pub struct ContextWindow {
    entries: VecDeque<ContextEntry>,
    capacity: usize,
}

impl ContextWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append, evicting the oldest entries beyond capacity
    pub fn push(&mut self, sender: impl Into<String>, text: impl Into<String>) {
        self.entries.push_back(ContextEntry::new(sender, text));
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Last `n` entries, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &ContextEntry> {
        self.entries.iter().skip(self.entries.len().saturating_sub(n))
    }

    /// Last `n` entries rendered as prompt lines
    pub fn render_recent(&self, n: usize) -> String {
        render(self.recent(n))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The live shared conversation
#[derive(Debug, Clone)]
pub struct ConversationSession {
    /// Inbound messages recorded so far (agent replies do not count)
    pub turns: u32,
    pub context: Vec<ContextEntry>,
    /// Speakers plus every agent that evaluated affirmatively
    pub active_agents: BTreeSet<String>,
    pub last_activity: Instant,
}

impl ConversationSession {
    pub fn new(initiator: &str) -> Self {
        Self {
            turns: 0,
            context: Vec::new(),
            active_agents: BTreeSet::from([initiator.to_string()]),
            last_activity: Instant::now(),
        }
    }

    /// Record an inbound message as a new turn
    pub fn record_turn(&mut self, speaker: &str, message: &str) -> u32 {
        self.context.push(ContextEntry::new(speaker, message));
        self.turns = self.turns.saturating_add(1);
        self.touch();
        self.turns
    }

    /// Record an agent reply (no turn increment)
    pub fn append_reply(&mut self, speaker: &str, reply: &str) {
        self.context.push(ContextEntry::new(speaker, reply));
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// True once `timeout` has passed without activity
    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    /// Whole shared context as prompt lines
    pub fn render_context(&self) -> String {
        render(&self.context)
    }
}

/// Read-only view of the session for callers outside the router
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub turns: u32,
    pub context: Vec<ContextEntry>,
    pub active_agents: Vec<String>,
}

impl From<&ConversationSession> for SessionSnapshot {
    fn from(session: &ConversationSession) -> Self {
        Self {
            turns: session.turns,
            context: session.context.clone(),
            active_agents: session.active_agents.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = ContextWindow::new(3);
        for i in 0..5 {
            window.push("A", format!("m{}", i));
        }
        assert_eq!(window.len(), 3);
        let texts: Vec<&str> = window.recent(10).map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_recent_and_render() {
        let mut window = ContextWindow::new(10);
        window.push("user", "hi");
        window.push("A", "hello");
        window.push("B", "hey");
        assert_eq!(window.render_recent(2), "A: hello\nB: hey");
        assert_eq!(window.recent(0).count(), 0);
    }

    #[test]
    fn test_session_turns_count_inbound_only() {
        let mut session = ConversationSession::new("A");
        assert!(session.active_agents.contains("A"));
        assert_eq!(session.record_turn("A", "first"), 1);
        session.append_reply("B", "reply");
        assert_eq!(session.record_turn("A", "second"), 2);
        assert_eq!(session.context.len(), 3);
        assert_eq!(session.render_context(), "A: first\nB: reply\nA: second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_idle_detection() {
        let session = ConversationSession::new("A");
        assert!(!session.is_idle(Duration::from_secs(300)));
        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(session.is_idle(Duration::from_secs(300)));
    }

    #[test]
    fn test_snapshot() {
        let mut session = ConversationSession::new("B");
        session.active_agents.insert("A".into());
        session.record_turn("B", "x");
        let snapshot = SessionSnapshot::from(&session);
        assert_eq!(snapshot.active_agents, vec!["A", "B"]);
        assert_eq!(snapshot.turns, 1);
    }
}
