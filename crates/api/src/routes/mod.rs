pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/rest` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /submit                                          submit upload (POST, multipart)
/// /jobs                                            list jobs
/// /jobs/{id}                                       get one job
/// /view                                            launch viewer (POST)
/// ```
pub fn rest_routes(max_upload_bytes: usize) -> Router<AppState> {
    jobs::router(max_upload_bytes)
}
