use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use crate::engine::{RunStatus, RunSummary, RunView};
use crate::engine::types::Payload;

use super::AppState;
use super::errors::AppError;

// --- Request/Response types ---

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default)]
    pub input_data: Payload,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAsyncResponse {
    pub run_id: String,
    pub status: RunStatus,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    pub step_id: String,
    #[serde(default)]
    pub resume_data: Payload,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunList {
    pub runs: Vec<RunSummary>,
    pub total: usize,
}

#[derive(Deserialize)]
pub struct ListRunsQuery {
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// --- Handlers ---

/// POST /workflows/{id}/start
pub async fn start_run(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
    Json(req): Json<StartRequest>,
) -> Result<Json<RunView>, AppError> {
    let record = state.controller.start(&workflow_id, req.input_data).await?;
    Ok(Json(state.controller.to_view(record)))
}

/// POST /workflows/{id}/start-async
pub async fn start_run_async(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartAsyncResponse>, AppError> {
    let record = state
        .controller
        .start_async(&workflow_id, req.input_data)
        .await?;
    Ok(Json(StartAsyncResponse {
        status: record.status(),
        run_id: record.run_id,
    }))
}

/// POST /runs/{id}/resume
pub async fn resume_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    Json(req): Json<ResumeRequest>,
) -> Result<Json<RunView>, AppError> {
    let record = state
        .controller
        .resume(&run_id, &req.step_id, req.resume_data)
        .await?;
    Ok(Json(state.controller.to_view(record)))
}

/// GET /runs/{id}
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Json<RunView>, AppError> {
    Ok(Json(state.controller.view(&run_id).await?))
}

/// GET /runs
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListRunsQuery>,
) -> Result<Json<RunList>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<RunStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let runs: Vec<RunSummary> = state
        .controller
        .list_runs(status)
        .await?
        .iter()
        .map(RunSummary::from)
        .collect();

    Ok(Json(RunList {
        total: runs.len(),
        runs,
    }))
}

/// DELETE /runs/{id}
pub async fn delete_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.controller.delete_run(&run_id).await?;
    Ok(Json(serde_json::json!({ "deleted": run_id })))
}

/// GET /workflows
pub async fn list_workflows(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let workflows = state.controller.list_workflows();
    let total = workflows.len();
    Json(serde_json::json!({
        "workflows": workflows,
        "total": total,
    }))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
