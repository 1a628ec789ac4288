use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use submitter_core::error::CoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `submitter_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request body exceeded the configured upload limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

const INTERNAL_MESSAGE: &str = "An internal error occurred";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::IdentityCollision(_) => {
                    (StatusCode::CONFLICT, "IDENTITY_COLLISION", core.to_string())
                }
                CoreError::Storage { .. } => {
                    tracing::error!(error = %core, "Storage error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "STORAGE_ERROR",
                        "A storage error occurred".to_string(),
                    )
                }
                CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", core.to_string()),
                CoreError::Corrupt { .. } => {
                    tracing::error!(error = %core, "Corrupt job record");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "CORRUPT_RECORD",
                        core.to_string(),
                    )
                }
                CoreError::NotReady(_) => (StatusCode::CONFLICT, "NOT_READY", core.to_string()),
                CoreError::ExternalProcess { .. } => {
                    tracing::error!(error = %core, "External process error");
                    (
                        StatusCode::BAD_GATEWAY,
                        "EXTERNAL_PROCESS_FAILURE",
                        core.to_string(),
                    )
                }
                CoreError::InvalidJobId(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_JOB_ID", core.to_string())
                }
                CoreError::InvalidTransition { .. } | CoreError::WorkerFailed { .. } => {
                    tracing::error!(error = %core, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        INTERNAL_MESSAGE.to_string(),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg.clone())
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    INTERNAL_MESSAGE.to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
