//! HTTP / WebSocket Server
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              agentnet                   │
//! ├─────────────────────────────────────────┤
//! │  GET /ws          → Commands + events   │
//! │  GET /api/health  → Health check        │
//! │  GET /api/events  → Event stream (SSE)  │
//! │  GET /*           → Static frontend     │
//! └─────────────────────────────────────────┘
//! ```

pub mod health;
pub mod stream;
pub mod ws;

pub use health::{AppState, HealthResponse};
pub use ws::{dispatch, parse_command, Command};

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::network::AgentNetwork;

pub struct Server {
    network: Arc<AgentNetwork>,
    bind_addr: SocketAddr,
    static_dir: Option<PathBuf>,
}

impl Server {
    pub fn new(network: Arc<AgentNetwork>, bind_addr: SocketAddr, static_dir: Option<PathBuf>) -> Self {
        Self {
            network,
            bind_addr,
            static_dir,
        }
    }

    /// Build the router with all routes and middleware
    pub fn router(&self) -> Router {
        let state = AppState::new(self.network.clone());

        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

        let mut router = Router::new()
            .route("/ws", get(ws::ws_handler))
            .route("/api/health", get(health::health_check))
            .route("/api/events", get(stream::stream_events))
            .with_state(state);

        if let Some(dir) = &self.static_dir {
            info!("Serving static files from {}", dir.display());
            router = router.fallback_service(ServeDir::new(dir));
        }

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Serve until Ctrl+C / SIGTERM
    pub async fn run(self) -> Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.bind_addr))?;

        info!("Listening on http://{}", self.bind_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.network.shutdown().await;
        info!("Server shut down gracefully");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
