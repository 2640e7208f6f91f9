//! Collaborator Selection
//!
//! Ranks agents with spare capacity by how well they fit a task's skills.

use crate::agent::AgentProfile;

/// Top `k` agents that can accept work, best fit first (ties by id)
pub fn select_collaborators(profiles: &[AgentProfile], required: &[String], k: usize) -> Vec<AgentProfile> {
    let mut ranked: Vec<(f64, &AgentProfile)> = profiles
        .iter()
        .filter(|p| p.can_accept_task())
        .map(|p| (p.capability(required), p))
        .collect();

    ranked.sort_by(|(sa, a), (sb, b)| sb.total_cmp(sa).then_with(|| a.id.cmp(&b.id)));

    ranked.into_iter().take(k).map(|(_, p)| p.clone()).collect()
}
