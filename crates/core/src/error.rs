use crate::job::{JobId, JobStatus};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Job id already taken: {0}")]
    IdentityCollision(String),

    #[error("Storage error ({context}): {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Corrupt record for job {job_id}: {reason}")]
    Corrupt { job_id: String, reason: String },

    #[error("Job {0} has no output yet")]
    NotReady(JobId),

    #[error("Failed to launch {command}: {source}")]
    ExternalProcess {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid job id: {0:?}")]
    InvalidJobId(String),

    #[error("Worker for job {job_id} stopped before finishing: {source}")]
    WorkerFailed {
        job_id: JobId,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("Invalid status transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

impl CoreError {
    /// Wrap an I/O error with a short description of the failed operation.
    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
