//! Handlers for the `/rest` job endpoints.

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use futures::TryStreamExt;
use serde::Deserialize;
use submitter_core::error::CoreError;
use submitter_core::job::JobId;
use tokio_util::io::StreamReader;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Multipart field carrying the uploaded input.
pub const UPLOAD_FIELD: &str = "file";

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// Query parameters for the submit endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitParams {
    /// Return as soon as the job is queued instead of waiting for it.
    #[serde(default)]
    pub detach: bool,
}

/// POST /rest/submit
///
/// Accept a multipart upload (field `file`) and run it as a job. By default
/// waits for the analysis and returns the terminal record with 200; callers
/// must inspect `status` to learn whether the analysis succeeded. With
/// `?detach=true` returns 202 with the queued record.
pub async fn submit(
    State(state): State<AppState>,
    Query(params): Query<SubmitParams>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let orig_input_fname = field.file_name().unwrap_or("unknown").to_string();
        let upload = StreamReader::new(field.map_err(std::io::Error::other));
        let upload = std::pin::pin!(upload);

        let (status, record) = if params.detach {
            let record = state
                .jobs
                .submit_detached(upload, &orig_input_fname)
                .await
                .map_err(upload_error)?;
            (StatusCode::ACCEPTED, record)
        } else {
            let record = state
                .jobs
                .submit(upload, &orig_input_fname)
                .await
                .map_err(upload_error)?;
            (StatusCode::OK, record)
        };

        tracing::info!(
            job_id = %record.id,
            status = %record.status,
            detach = params.detach,
            "Submission handled",
        );

        return Ok((status, Json(record)));
    }

    Err(AppError::BadRequest(format!(
        "Multipart field '{UPLOAD_FIELD}' is required"
    )))
}

/// Map a multipart failure to 413 when the body limit was hit, else 400.
fn multipart_error(err: MultipartError) -> AppError {
    client_upload_error(&err)
}

fn client_upload_error(err: &MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(err.body_text())
    }
}

/// A body that fails while the upload is being streamed to disk surfaces as a
/// storage error wrapping the multipart failure; report it as the client's.
fn upload_error(err: CoreError) -> AppError {
    if let CoreError::Storage { source, .. } = &err {
        if let Some(multipart) = source
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<MultipartError>())
        {
            return client_upload_error(multipart);
        }
    }
    AppError::Core(err)
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /rest/jobs
///
/// List every job with a valid record. Directories with missing or corrupt
/// records are skipped (and logged) rather than failing the listing.
pub async fn list_jobs(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let listing = state.jobs.list_jobs().await?;

    if !listing.issues.is_empty() {
        tracing::warn!(
            skipped = listing.issues.len(),
            listed = listing.records.len(),
            "Job listing skipped unreadable records",
        );
    }

    Ok(Json(listing.records))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /rest/jobs/{id}
///
/// Current record of one job; used to poll detached submissions.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = JobId::parse(&job_id)?;
    let record = state.jobs.job(&id).await?;
    Ok(Json(record))
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// Request body for the view endpoint.
#[derive(Debug, Deserialize)]
pub struct ViewRequest {
    #[serde(rename = "jobId")]
    pub job_id: String,
}

/// POST /rest/view
///
/// Launch the viewer on a job's output, replacing any open viewer.
/// Returns 204, or 409 `NOT_READY` when the job has no output.
pub async fn view_job(
    State(state): State<AppState>,
    Json(input): Json<ViewRequest>,
) -> AppResult<StatusCode> {
    let id = JobId::parse(&input.job_id)?;
    state.jobs.view_job(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
