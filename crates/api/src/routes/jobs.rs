//! Route definitions for the job endpoints.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/rest`.
///
/// ```text
/// POST   /submit          -> submit
/// GET    /jobs            -> list_jobs
/// GET    /jobs/{id}       -> get_job
/// POST   /view            -> view_job
/// ```
///
/// Only `/submit` accepts bodies up to `max_upload_bytes`; the rest keep
/// axum's default limit.
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/submit",
            post(jobs::submit).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/view", post(jobs::view_job))
}
