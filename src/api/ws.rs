//! Live event feed and client actions over a WebSocket.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message as WsFrame, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::agents::{AgentStatus, Message};
use crate::supervisor::{Delivery, Supervisor};
use crate::tasks::Priority;

/// Frames the server sends besides raw [`SupervisorEvent`]s.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full agent table, sent on connect and after the client lagged.
    AgentsSync { agents: Vec<AgentStatus> },
    /// Reply to a `send_message` action.
    Delivered { delivery: Delivery },
    /// A client action was rejected.
    Error { message: String },
}

/// Actions a client can send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    QueueInstruction {
        agent_id: String,
        instruction: String,
        #[serde(default)]
        priority: Option<Priority>,
    },
    AbortTask {
        agent_id: String,
        task_id: Uuid,
    },
    SendMessage {
        message: Message,
    },
}

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!("WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state.supervisor))
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => socket.send(WsFrame::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize WS frame");
            true
        }
    }
}

async fn agents_sync(supervisor: &Supervisor) -> ServerMessage {
    ServerMessage::AgentsSync {
        agents: supervisor.all_agents_status().await,
    }
}

async fn handle_socket(mut socket: WebSocket, supervisor: Arc<Supervisor>) {
    info!("WebSocket client connected");

    // Subscribe before the initial sync so nothing falls in between.
    let mut rx = supervisor.event_receiver();

    if !send_json(&mut socket, &agents_sync(&supervisor).await).await {
        warn!("Failed to send initial sync, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !send_json(&mut socket, &event).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind broadcast");
                        if !send_json(&mut socket, &agents_sync(&supervisor).await).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Event channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(WsFrame::Text(text))) => {
                        if let Some(reply) = handle_client_action(&text, &supervisor).await {
                            if !send_json(&mut socket, &reply).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(WsFrame::Ping(data))) => {
                        if socket.send(WsFrame::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsFrame::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

/// Apply a client action. Successful queue/abort actions are confirmed by
/// the events they trigger, so only errors and deliveries get a direct reply.
async fn handle_client_action(text: &str, supervisor: &Supervisor) -> Option<ServerMessage> {
    let action = match serde_json::from_str::<ClientAction>(text) {
        Ok(action) => action,
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
            return Some(ServerMessage::Error {
                message: format!("Unrecognized action: {e}"),
            });
        }
    };

    let outcome = match action {
        ClientAction::QueueInstruction {
            agent_id,
            instruction,
            priority,
        } => {
            let text = instruction.trim();
            if text.is_empty() {
                return Some(ServerMessage::Error {
                    message: "Instruction text is required".into(),
                });
            }
            supervisor
                .queue_instruction(&agent_id, text, priority)
                .await
                .map(|_| None)
        }
        ClientAction::AbortTask { agent_id, task_id } => {
            match supervisor.abort_task(&agent_id, task_id).await {
                Ok(true) => Ok(None),
                Ok(false) => Ok(Some(ServerMessage::Error {
                    message: format!("Task {task_id} is not pending or active"),
                })),
                Err(e) => Err(e),
            }
        }
        ClientAction::SendMessage { message } => {
            supervisor.send_message(message).await.map(|delivery| {
                Some(ServerMessage::Delivered { delivery })
            })
        }
    };

    outcome.unwrap_or_else(|e| {
        warn!(error = %e, "WS client action failed");
        Some(ServerMessage::Error {
            message: e.to_string(),
        })
    })
}
