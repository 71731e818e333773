//! Task HTTP handlers: run, status, stop.

use super::{api_err, ApiResult, ApiState};
use crate::automation::{AgentRunRequest, ResearchRequest};
use crate::error::TaskpilotError;
use crate::task::{TaskSnapshot, TaskStatus};
use axum::{
    extract::{Path as AxumPath, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/agent/run", post(run_agent))
        .route("/agent/status/:task_id", get(task_status))
        .route("/agent/stop/:task_id", post(stop_task))
        .route("/research/run", post(run_research))
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub task_id: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
}

async fn run_agent(
    State(state): State<ApiState>,
    Json(req): Json<AgentRunRequest>,
) -> ApiResult<Json<RunResponse>> {
    let task_id = state.executor.start_agent(req).map_err(api_err)?;
    Ok(Json(RunResponse {
        task_id,
        status: "started",
    }))
}

async fn run_research(
    State(state): State<ApiState>,
    Json(req): Json<ResearchRequest>,
) -> ApiResult<Json<RunResponse>> {
    let task_id = state.executor.start_research(req).map_err(api_err)?;
    Ok(Json(RunResponse {
        task_id,
        status: "started",
    }))
}

async fn task_status(
    State(state): State<ApiState>,
    AxumPath(task_id): AxumPath<String>,
) -> ApiResult<Json<TaskSnapshot>> {
    state
        .registry
        .get(&task_id)
        .map(Json)
        .ok_or_else(|| api_err(TaskpilotError::TaskNotFound(task_id)))
}

async fn stop_task(
    State(state): State<ApiState>,
    AxumPath(task_id): AxumPath<String>,
) -> ApiResult<Json<StopResponse>> {
    let snapshot = state.executor.stop(&task_id).map_err(api_err)?;
    let message = if snapshot.status == TaskStatus::Stopped {
        "Task stopped".to_string()
    } else {
        format!("Task already {}", snapshot.status)
    };
    Ok(Json(StopResponse {
        task_id: snapshot.task_id,
        status: snapshot.status,
        message,
    }))
}
