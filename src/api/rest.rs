//! REST endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::agents::Message;
use crate::tasks::Priority;

#[derive(Debug, Deserialize)]
pub(crate) struct QueueInstructionRequest {
    instruction: String,
    #[serde(default)]
    priority: Option<Priority>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    limit: Option<usize>,
}

fn parse_task_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid task ID: {raw}")))
}

// ── Health ──────────────────────────────────────────────────────────────

pub(crate) async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "agent-dispatch"
    }))
}

// ── Agents ──────────────────────────────────────────────────────────────

pub(crate) async fn list_agents(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.supervisor.all_agents_status().await)
}

pub(crate) async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.supervisor.agent_status(&id).await?))
}

// ── Tasks ───────────────────────────────────────────────────────────────

pub(crate) async fn queue_instruction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<QueueInstructionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let text = body.instruction.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("Instruction text is required".into()));
    }

    let task = state
        .supervisor
        .queue_instruction(&id, text, body.priority)
        .await?;
    info!(agent_id = %id, task_id = %task.id, "Instruction queued via REST");
    Ok((StatusCode::CREATED, Json(task)))
}

pub(crate) async fn queue_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.supervisor.queue_state(&id).await?))
}

pub(crate) async fn list_tasks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.supervisor.all_tasks(&id).await?))
}

pub(crate) async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (completed, failed) = state.supervisor.history(&id, query.limit).await?;
    Ok(Json(json!({
        "completed": completed,
        "failed": failed,
    })))
}

pub(crate) async fn clear_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let cleared = state.supervisor.clear_history(&id).await?;
    Ok(Json(json!({ "cleared": cleared })))
}

pub(crate) async fn reset_queue(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = state.supervisor.reset_queue(&id).await?;
    info!(agent_id = %id, "Queue reset via REST");
    Ok(Json(agent))
}

pub(crate) async fn abort_task(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    let aborted = state.supervisor.abort_task(&id, task_id).await?;
    Ok(Json(json!({ "aborted": aborted })))
}

pub(crate) async fn rerun_task(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    let task = state.supervisor.rerun_task(&id, task_id).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

// ── Messages ────────────────────────────────────────────────────────────

pub(crate) async fn send_message(
    State(state): State<AppState>,
    Json(message): Json<Message>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.supervisor.send_message(message).await?))
}
