use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the jobs root is unusable.
    pub status: &'static str,
    pub version: &'static str,
    /// Whether the jobs root exists and is a directory.
    pub jobs_root_ready: bool,
    /// Whether a viewer process is currently open.
    pub viewer_running: bool,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let jobs_root_ready = state.jobs.storage_ready().await;
    let viewer_running = state.jobs.viewer().current().await.is_some();

    Json(HealthResponse {
        status: if jobs_root_ready { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        jobs_root_ready,
        viewer_running,
    })
}

/// Mount health check routes (root level, not under `/rest`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
