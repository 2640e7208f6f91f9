//! Connection Strength Model
//!
//! Directional familiarity of one agent toward its peers:
//! - Boost on positive interactions, weighted by frequency and quality
//! - Multiplicative decay on poor interactions, faster after long silences
//! - Always clamped to `[min_connection, max_connection]`
//!
//! A→B is tracked independently of B→A; nothing reconciles the two.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::InteractionRules;

/// One outgoing edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionEdge {
    pub id: String,
    pub strength: f64,
}

/// Per-peer interaction statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub strength: f64,
    pub interaction_count: u32,
    pub last_interaction: Option<DateTime<Utc>>,
}

/// Outgoing connection state of a single agent
#[derive(Debug, Clone)]
pub struct ConnectionModel {
    rules: Arc<InteractionRules>,
    strengths: HashMap<String, f64>,
    interaction_counts: HashMap<String, u32>,
    last_interaction: HashMap<String, DateTime<Utc>>,
}

impl ConnectionModel {
    pub fn new(rules: Arc<InteractionRules>) -> Self {
        Self {
            rules,
            strengths: HashMap::new(),
            interaction_counts: HashMap::new(),
            last_interaction: HashMap::new(),
        }
    }

    /// Record an interaction with `target` and return the new strength
    pub fn update(&mut self, target: &str, quality: f64) -> f64 {
        self.update_at(target, quality, Utc::now())
    }

    /// Same as [`update`](Self::update) with an explicit clock
    pub fn update_at(&mut self, target: &str, quality: f64, now: DateTime<Utc>) -> f64 {
        let rules = &self.rules;
        let quality = quality.clamp(0.0, 1.0);

        let current = self
            .strengths
            .get(target)
            .copied()
            .unwrap_or_else(|| (rules.min_connection * 2.0).min(rules.max_connection));

        let count = self.interaction_counts.get(target).copied().unwrap_or(0);
        self.interaction_counts
            .insert(target.to_string(), count.saturating_add(1));

        let frequency_factor =
            (count as f64 / rules.frequency_saturation.max(1) as f64).min(1.0);

        let hours_since = self
            .last_interaction
            .get(target)
            .map(|last| (now - *last).num_milliseconds().max(0) as f64 / 3_600_000.0)
            .unwrap_or(0.0);
        let time_decay = (-rules.time_decay * hours_since).exp();

        self.last_interaction.insert(target.to_string(), now);

        let next = if quality > rules.positive_quality_cutoff {
            let boost = rules.boost_rate
                * (rules.frequency_weight * frequency_factor + rules.quality_weight * quality)
                + rules.baseline_boost;
            (current + boost).min(rules.max_connection)
        } else {
            (current * rules.decay_rate * time_decay).max(rules.min_connection)
        };

        let next = rules.clamp(next);
        self.strengths.insert(target.to_string(), next);
        next
    }

    /// Current strength toward `peer`, if any interaction happened
    pub fn strength(&self, peer: &str) -> Option<f64> {
        self.strengths.get(peer).copied()
    }

    /// Strength toward `peer`, falling back to the minimum for strangers
    pub fn strength_or_min(&self, peer: &str) -> f64 {
        self.strength(peer).unwrap_or(self.rules.min_connection)
    }

    /// Force a strength (clamped)
    pub fn set_strength(&mut self, peer: &str, strength: f64) {
        let clamped = self.rules.clamp(strength);
        self.strengths.insert(peer.to_string(), clamped);
    }

    pub fn stats(&self, peer: &str) -> ConnectionStats {
        ConnectionStats {
            strength: self.strength_or_min(peer),
            interaction_count: self.interaction_counts.get(peer).copied().unwrap_or(0),
            last_interaction: self.last_interaction.get(peer).copied(),
        }
    }

    /// All outgoing edges, strongest first
    pub fn connections(&self) -> Vec<ConnectionEdge> {
        let mut edges: Vec<ConnectionEdge> = self
            .strengths
            .iter()
            .map(|(id, strength)| ConnectionEdge {
                id: id.clone(),
                strength: *strength,
            })
            .collect();
        edges.sort_by(|a, b| {
            b.strength
                .total_cmp(&a.strength)
                .then_with(|| a.id.cmp(&b.id))
        });
        edges
    }

    /// Top-k prefix of [`connections`](Self::connections)
    pub fn closest_collaborators(&self, k: usize) -> Vec<ConnectionEdge> {
        let mut edges = self.connections();
        edges.truncate(k);
        edges
    }

    /// Weighted-random pick over `pool` minus `self_id`, proportional to strength
    pub fn select_response_target<'a, R: Rng + ?Sized>(
        &self,
        self_id: &str,
        pool: &'a [String],
        rng: &mut R,
    ) -> Option<&'a str> {
        let candidates: Vec<&'a String> = pool.iter().filter(|id| id.as_str() != self_id).collect();
        let first = *candidates.first()?;

        let total: f64 = candidates.iter().map(|id| self.strength_or_min(id)).sum();
        if !(total > 0.0) {
            return Some(first.as_str());
        }

        let draw = rng.gen::<f64>() * total;
        let mut accumulator = 0.0;
        for id in &candidates {
            accumulator += self.strength_or_min(id);
            if draw <= accumulator {
                return Some(id.as_str());
            }
        }

        Some(first.as_str())
    }

    /// Coin flip biased by familiarity: keep talking to `last_speaker`?
    pub fn should_continue_dialog<R: Rng + ?Sized>(
        &self,
        self_id: &str,
        last_speaker: &str,
        rng: &mut R,
    ) -> bool {
        if self_id == last_speaker {
            return false;
        }
        let strength = self.strength_or_min(last_speaker);
        strength * 0.5 + rng.gen::<f64>() * 0.5 > 0.3
    }

    /// Forget everything about `peer`
    pub fn remove_peer(&mut self, peer: &str) {
        self.strengths.remove(peer);
        self.interaction_counts.remove(peer);
        self.last_interaction.remove(peer);
    }

    pub fn knows(&self, peer: &str) -> bool {
        self.strengths.contains_key(peer)
            || self.interaction_counts.contains_key(peer)
            || self.last_interaction.contains_key(peer)
    }

    pub fn rules(&self) -> &InteractionRules {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn model() -> ConnectionModel {
        ConnectionModel::new(Arc::new(InteractionRules::default()))
    }

    #[test]
    fn test_first_positive_interaction() {
        let mut m = model();
        let strength = m.update("B", 0.9);
        // 0.4 + 0.25 * (0.4 * 0 + 0.6 * 0.9) + 0.05
        assert!((strength - 0.585).abs() < 1e-9);
        assert_eq!(m.stats("B").interaction_count, 1);
    }

    #[test]
    fn test_positive_updates_saturate_at_max() {
        let mut m = model();
        let mut previous = 0.0;
        for _ in 0..30 {
            let s = m.update("B", 0.9);
            assert!(s >= previous);
            assert!(s <= 1.0);
            previous = s;
        }
        assert_eq!(previous, 1.0);
    }

    #[test]
    fn test_negative_updates_decay_to_min() {
        let mut m = model();
        m.set_strength("B", 1.0);
        let mut previous = 1.0;
        for _ in 0..200 {
            let s = m.update("B", 0.1);
            assert!(s <= previous);
            assert!(s >= 0.2);
            previous = s;
        }
        assert_eq!(previous, 0.2);
    }

    #[test]
    fn test_time_decay_after_silence() {
        let mut m = model();
        let start = Utc::now();
        m.update_at("B", 0.9, start);
        let before = m.strength("B").unwrap();
        let later = start + chrono::Duration::hours(10);
        let after = m.update_at("B", 0.0, later);
        let expected = (before * 0.98 * (-0.05f64 * 10.0).exp()).max(0.2);
        assert!((after - expected).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_quality_is_clamped() {
        let mut m = model();
        let s = m.update("B", 42.0);
        assert!(s <= 1.0);
        let s = m.update("C", -3.0);
        assert!(s >= 0.2);
    }

    #[test]
    fn test_connections_sorted_and_top_k() {
        let mut m = model();
        m.set_strength("A", 0.3);
        m.set_strength("B", 0.9);
        m.set_strength("C", 0.6);

        let ids: Vec<String> = m.connections().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["B", "C", "A"]);

        let top = m.closest_collaborators(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id, "B");
    }

    #[test]
    fn test_select_response_target_excludes_self() {
        let m = model();
        let pool = vec!["me".to_string(), "other".to_string()];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert_eq!(m.select_response_target("me", &pool, &mut rng), Some("other"));
        }
        let only_me = vec!["me".to_string()];
        assert_eq!(m.select_response_target("me", &only_me, &mut rng), None);
    }

    #[test]
    fn test_select_response_target_prefers_strong_edges() {
        let mut m = model();
        m.set_strength("strong", 1.0);
        m.set_strength("weak", 0.2);
        let pool = vec!["strong".to_string(), "weak".to_string()];
        let mut rng = StdRng::seed_from_u64(42);

        let strong_hits = (0..1000)
            .filter(|_| m.select_response_target("me", &pool, &mut rng) == Some("strong"))
            .count();
        assert!(strong_hits > 700, "strong picked {} times", strong_hits);
    }

    #[test]
    fn test_should_continue_dialog_never_with_self() {
        let m = model();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(!m.should_continue_dialog("A", "A", &mut rng));
    }

    #[test]
    fn test_remove_peer() {
        let mut m = model();
        m.update("B", 0.9);
        assert!(m.knows("B"));
        m.remove_peer("B");
        assert!(!m.knows("B"));
        assert!(m.connections().is_empty());
    }
}
