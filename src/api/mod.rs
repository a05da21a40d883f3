//! HTTP + WebSocket control surface over the supervisor.

mod rest;
mod ws;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde_json::json;

use crate::error::SupervisorError;
use crate::supervisor::Supervisor;

pub use ws::{ClientAction, ServerMessage};

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
}

/// Build the router with all REST and WebSocket routes.
pub fn router(supervisor: Arc<Supervisor>) -> Router {
    let state = AppState { supervisor };

    Router::new()
        .route("/health", get(rest::health))
        .route("/ws/events", get(ws::ws_handler))
        .route("/api/agents", get(rest::list_agents))
        .route("/api/agents/{id}", get(rest::get_agent))
        .route("/api/agents/{id}/instructions", post(rest::queue_instruction))
        .route(
            "/api/agents/{id}/queue",
            get(rest::queue_state).delete(rest::reset_queue),
        )
        .route("/api/agents/{id}/tasks", get(rest::list_tasks))
        .route(
            "/api/agents/{id}/history",
            get(rest::history).delete(rest::clear_history),
        )
        .route("/api/agents/{id}/tasks/{task_id}", delete(rest::abort_task))
        .route("/api/agents/{id}/tasks/{task_id}/rerun", post(rest::rerun_task))
        .route("/api/messages", post(rest::send_message))
        .with_state(state)
}

/// Handler error, rendered as `{"error": "..."}` with a matching status.
#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    Supervisor(SupervisorError),
}

impl From<SupervisorError> for ApiError {
    fn from(e: SupervisorError) -> Self {
        Self::Supervisor(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Supervisor(
                SupervisorError::UnknownAgent { .. } | SupervisorError::TaskNotFound { .. },
            ) => StatusCode::NOT_FOUND,
            Self::Supervisor(
                SupervisorError::DuplicateAgent { .. } | SupervisorError::TaskNotTerminal { .. },
            ) => StatusCode::CONFLICT,
        };
        let message = match self {
            Self::BadRequest(message) => message,
            Self::Supervisor(e) => e.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
