use std::path::PathBuf;
use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{extract::State, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use m3u_core::output::render_alive;
use m3u_core::{load_channels, CheckReport, Checker};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SourceRequest {
    pub url: Option<String>,
    pub file_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SourceResponse {
    pub source: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Json,
    M3u,
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub source: Option<String>,
    /// Seconds between attempts against the same channel.
    pub retry_delay: Option<f64>,
    pub max_workers: Option<usize>,
    pub diagnostics_dir: Option<PathBuf>,
    #[serde(default)]
    pub retest: bool,
    #[serde(default)]
    pub format: ResponseFormat,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub id: Uuid,
    pub total: usize,
    pub alive_channels: usize,
    pub unstable_channels: usize,
    pub dead_channels: usize,
    pub retested: usize,
    pub recovered: usize,
    pub batches: usize,
    pub final_timeout_secs: f64,
    pub duration_secs: f64,
}

impl From<&CheckReport> for CheckResponse {
    fn from(report: &CheckReport) -> Self {
        let summary = report.summary();
        Self {
            id: report.id,
            total: summary.total,
            alive_channels: summary.alive,
            unstable_channels: summary.unstable,
            dead_channels: summary.dead,
            retested: summary.retested,
            recovered: summary.recovered,
            batches: report.batches,
            final_timeout_secs: report.final_timeout_secs,
            duration_secs: report.duration_secs(),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/source", post(resolve_source))
        .route("/check", post(run_check))
}

fn is_valid_url(s: &str) -> bool {
    url::Url::parse(s)
        .map(|u| u.scheme() == "http" || u.scheme() == "https")
        .unwrap_or(false)
}

/// POST /api/v1/source
async fn resolve_source(Json(body): Json<SourceRequest>) -> Result<Json<SourceResponse>, ApiError> {
    let url = body.url.filter(|u| !u.trim().is_empty());
    let file_path = body.file_path.filter(|p| !p.trim().is_empty());

    match (url, file_path) {
        (Some(url), _) if is_valid_url(&url) => Ok(Json(SourceResponse { source: url })),
        (Some(url), _) => Err(ApiError::BadRequest(format!(
            "Invalid playlist URL: {}",
            url
        ))),
        (None, Some(path)) => Ok(Json(SourceResponse { source: path })),
        (None, None) => Err(ApiError::BadRequest(
            "No playlist source provided".into(),
        )),
    }
}

/// POST /api/v1/check
async fn run_check(
    State(state): State<AppState>,
    Json(body): Json<CheckRequest>,
) -> Result<Response, ApiError> {
    let source = body
        .source
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("source is required".into()))?;

    let retry_delay = body
        .retry_delay
        .map(|secs| {
            Duration::try_from_secs_f64(secs).map_err(|_| {
                ApiError::BadRequest(format!(
                    "retry_delay must be a non-negative number of seconds, got {}",
                    secs
                ))
            })
        })
        .transpose()?;
    if body.max_workers == Some(0) {
        return Err(ApiError::BadRequest("max_workers must be at least 1".into()));
    }

    let channels = load_channels(state.source.as_ref(), &source).await?;

    let mut config = state.default_config.clone();
    if let Some(delay) = retry_delay {
        config = config.with_retry_delay(delay);
    }
    if let Some(workers) = body.max_workers {
        config = config.with_max_workers(workers);
    }
    if body.diagnostics_dir.is_some() {
        config = config.with_diagnostics_dir(body.diagnostics_dir);
    }

    let checker = Checker::new(config, state.probe.clone());
    let report = state.store(checker.run(channels, body.retest).await);
    let summary = CheckResponse::from(report.as_ref());

    info!(
        run_id = %report.id,
        source = %source,
        total = summary.total,
        alive = summary.alive_channels,
        unstable = summary.unstable_channels,
        dead = summary.dead_channels,
        "Check run completed"
    );

    match body.format {
        ResponseFormat::Json => Ok((StatusCode::OK, Json(summary)).into_response()),
        ResponseFormat::M3u => Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/vnd.apple.mpegurl"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"alive_channels.m3u\"",
                ),
            ],
            render_alive(&report),
        )
            .into_response()),
    }
}
