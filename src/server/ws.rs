//! WebSocket command channel
//!
//! Each client sends JSON commands (`command` tag) and receives every network
//! event. Commands run in their own task so a slow oracle round-trip never
//! stalls event delivery to the same client.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::health::AppState;
use crate::events::NetworkEvent;
use crate::network::AgentNetwork;

/// Client command
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    GetAgents,
    CreateAgent {
        agent_id: String,
        #[serde(default)]
        skills: Option<Vec<String>>,
    },
    DeleteAgent {
        agent_id: String,
    },
    SetLeader {
        agent: String,
    },
    SendMessage {
        agent: String,
        message: String,
    },
    GetConnections {
        agent: String,
    },
    GetCollaborators {
        agent: String,
        #[serde(default)]
        count: Option<usize>,
    },
    CompleteStep {
        task_id: String,
        step_id: String,
    },
}

/// Parse a client frame, or build the error reply for it
pub fn parse_command(text: &str) -> Result<Command, NetworkEvent> {
    serde_json::from_str(text).map_err(|e| {
        debug!("Rejected command {}: {}", text, e);
        NetworkEvent::error(format!("Invalid command: {}", e), None)
    })
}

/// Run a command; returns the reply meant only for the calling client
///
/// Results of mutating commands reach every client through the event bus,
/// failures included.
pub async fn dispatch(network: &AgentNetwork, command: Command) -> Option<NetworkEvent> {
    match command {
        Command::GetAgents => Some(NetworkEvent::AgentList {
            agents: network.list_agents().await,
        }),
        Command::CreateAgent { agent_id, skills } => {
            let _ = network.create_agent_with_skills(&agent_id, skills).await;
            None
        }
        Command::DeleteAgent { agent_id } => {
            let _ = network.delete_agent(&agent_id).await;
            None
        }
        Command::SetLeader { agent } => {
            let _ = network.set_leader(&agent).await;
            None
        }
        Command::SendMessage { agent, message } => {
            let _ = network.send_message(&agent, &message).await;
            None
        }
        Command::GetConnections { agent } => {
            let _ = network.get_connections(&agent).await;
            None
        }
        Command::GetCollaborators { agent, count } => {
            let _ = network.get_collaborators(&agent, count).await;
            None
        }
        Command::CompleteStep { task_id, step_id } => {
            let _ = network.complete_plan_step(&task_id, &step_id).await;
            None
        }
    }
}

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.network))
}

async fn handle_socket(mut socket: WebSocket, network: Arc<AgentNetwork>) {
    info!("WebSocket client connected");

    let mut events = network.events().subscribe();
    let (reply_tx, mut reply_rx) = mpsc::channel::<NetworkEvent>(32);

    let greeting = NetworkEvent::AgentList {
        agents: network.list_agents().await,
    };
    if send_event(&mut socket, &greeting).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match parse_command(text.as_str()) {
                            Ok(command) => {
                                debug!("WebSocket command: {:?}", command);
                                let network = network.clone();
                                let reply_tx = reply_tx.clone();
                                tokio::spawn(async move {
                                    if let Some(reply) = dispatch(&network, command).await {
                                        let _ = reply_tx.send(reply).await;
                                    }
                                });
                            }
                            Err(reply) => {
                                if send_event(&mut socket, &reply).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                }
            }

            Some(reply) = reply_rx.recv() => {
                if send_event(&mut socket, &reply).await.is_err() {
                    break;
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if send_event(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("WebSocket client lagging, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &NetworkEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).unwrap_or_default();
    socket.send(Message::Text(json.into())).await
}
