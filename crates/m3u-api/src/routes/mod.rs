mod check;
mod runs;

use axum::Router;

use crate::state::AppState;

pub use check::{CheckRequest, CheckResponse, ResponseFormat, SourceRequest, SourceResponse};
pub use runs::{RunDetail, RunSummary};

pub fn router() -> Router<AppState> {
    Router::new().merge(check::router()).merge(runs::router())
}
