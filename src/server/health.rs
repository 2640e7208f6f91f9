//! Health Check API

use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::network::AgentNetwork;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub network: Arc<AgentNetwork>,
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub version: &'static str,
}

impl AppState {
    pub fn new(network: Arc<AgentNetwork>) -> Self {
        Self {
            network,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    /// Registered agents
    pub agents: usize,
    /// A conversation session is live
    pub session_active: bool,
    /// Timestamp (ISO 8601)
    pub timestamp: String,
}

/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version,
        uptime_secs: state.uptime_secs(),
        agents: state.network.registry().len().await,
        session_active: state.network.router().has_session().await,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
