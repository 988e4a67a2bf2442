use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use m3u_core::{ChannelResult, ChannelStatus, CheckReport, CheckSummary};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub started_at: String,
    pub finished_at: String,
    pub summary: CheckSummary,
}

#[derive(Debug, Serialize)]
pub struct RunDetail {
    pub id: Uuid,
    pub started_at: String,
    pub finished_at: String,
    pub duration_secs: f64,
    pub batches: usize,
    pub final_timeout_secs: f64,
    pub summary: CheckSummary,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub run_id: Uuid,
    pub results: Vec<ChannelResult>,
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub status: Option<ChannelStatus>,
}

impl From<&CheckReport> for RunSummary {
    fn from(r: &CheckReport) -> Self {
        Self {
            id: r.id,
            started_at: r.started_at.to_rfc3339(),
            finished_at: r.finished_at.to_rfc3339(),
            summary: r.summary(),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/runs", get(list_runs))
        .route("/runs/{id}", get(get_run))
        .route("/runs/{id}/results", get(get_results))
}

fn parse_run_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::BadRequest(format!("Invalid run ID: {}", id)))
}

fn get_run_arc(state: &AppState, id: &str) -> Result<Arc<CheckReport>, ApiError> {
    let id = parse_run_id(id)?;
    state
        .run(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", id)))
}

/// GET /api/v1/runs
async fn list_runs(State(state): State<AppState>) -> Json<Vec<RunSummary>> {
    let mut runs: Vec<Arc<CheckReport>> = state.runs.iter().map(|e| Arc::clone(e.value())).collect();
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Json(runs.iter().map(|r| RunSummary::from(r.as_ref())).collect())
}

/// GET /api/v1/runs/{id}
async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunDetail>, ApiError> {
    let r = get_run_arc(&state, &id)?;
    Ok(Json(RunDetail {
        id: r.id,
        started_at: r.started_at.to_rfc3339(),
        finished_at: r.finished_at.to_rfc3339(),
        duration_secs: r.duration_secs(),
        batches: r.batches,
        final_timeout_secs: r.final_timeout_secs,
        summary: r.summary(),
    }))
}

/// GET /api/v1/runs/{id}/results?status=alive|unstable|dead
async fn get_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<ResultsResponse>, ApiError> {
    let r = get_run_arc(&state, &id)?;
    let results = r
        .sorted_by_channel()
        .into_iter()
        .filter(|res| query.status.is_none_or(|s| res.status == s))
        .cloned()
        .collect();
    Ok(Json(ResultsResponse {
        run_id: r.id,
        results,
    }))
}
