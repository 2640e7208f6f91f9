//! Agent Registry
//!
//! Shared map of live agents, keyed by id. Cloning the registry clones the
//! handle, not the map.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::agent::{Agent, AgentProfile};

#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<String, Arc<Agent>>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Agent>> {
        self.agents.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.agents.read().await.contains_key(id)
    }

    /// Insert unless the id is taken; returns false on conflict
    pub async fn insert(&self, agent: Arc<Agent>) -> bool {
        let mut agents = self.agents.write().await;
        if agents.contains_key(agent.id()) {
            return false;
        }
        agents.insert(agent.id().to_string(), agent);
        true
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<Agent>> {
        self.agents.write().await.remove(id)
    }

    /// All agents, ordered by id
    pub async fn all(&self) -> Vec<Arc<Agent>> {
        let mut agents: Vec<Arc<Agent>> = self.agents.read().await.values().cloned().collect();
        agents.sort_by(|a, b| a.id().cmp(b.id()));
        agents
    }

    /// Every agent except `id`, ordered by id
    pub async fn others(&self, id: &str) -> Vec<Arc<Agent>> {
        let mut agents = self.all().await;
        agents.retain(|a| a.id() != id);
        agents
    }

    pub async fn ids(&self) -> Vec<String> {
        self.all().await.iter().map(|a| a.id().to_string()).collect()
    }

    pub async fn profiles(&self) -> Vec<AgentProfile> {
        let mut profiles = Vec::new();
        for agent in self.all().await {
            profiles.push(agent.profile().await);
        }
        profiles
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }
}
