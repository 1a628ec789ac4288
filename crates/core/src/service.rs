//! The job service boundary consumed by the HTTP layer.
//!
//! Owns the runner, the record store and the viewer supervisor; holds no
//! business logic of its own.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::task::JoinError;

use crate::error::{CoreError, CoreResult};
use crate::job::{JobId, JobRecord};
use crate::paths::JobPaths;
use crate::runner::JobRunner;
use crate::store::{JobListing, RecordStore};
use crate::subprocess::ExternalCommand;
use crate::viewer::ViewerSupervisor;

/// Default number of analysis commands allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;

/// Everything the job service needs to know about its environment.
#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// Directory holding one subdirectory per job.
    pub jobs_root: PathBuf,
    /// Invoked as `<analysis_command> <input path>`.
    pub analysis_command: ExternalCommand,
    /// Invoked as `<viewer_command> <output path>`.
    pub viewer_command: ExternalCommand,
    /// Kill the analysis command after this long, if set.
    pub analysis_timeout: Option<Duration>,
    pub max_concurrent_jobs: usize,
}

pub struct JobService {
    store: RecordStore,
    runner: JobRunner,
    viewer: ViewerSupervisor,
}

impl JobService {
    pub fn new(config: JobsConfig) -> Self {
        let paths = JobPaths::new(config.jobs_root);
        let store = RecordStore::new(paths.clone());
        let runner = JobRunner::new(
            store.clone(),
            config.analysis_command,
            config.analysis_timeout,
            config.max_concurrent_jobs,
        );
        let viewer = ViewerSupervisor::new(paths, config.viewer_command);
        Self {
            store,
            runner,
            viewer,
        }
    }

    /// Create the jobs root if it does not exist yet.
    pub async fn init(&self) -> CoreResult<()> {
        let root = self.store.paths().root();
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| CoreError::storage(format!("creating {}", root.display()), e))
    }

    /// Submit an upload and wait for the analysis to finish.
    ///
    /// The analysis outcome is carried in the returned record's status; only
    /// failures to accept or persist the job are returned as errors.
    pub async fn submit<R>(&self, upload: R, orig_input_fname: &str) -> CoreResult<JobRecord>
    where
        R: AsyncRead + Unpin,
    {
        let submitted = self.runner.submit(upload, orig_input_fname).await?;
        let id = submitted.record.id;
        completed(id, submitted.completion.await)
    }

    /// Submit an upload and return as soon as it is queued.
    ///
    /// Progress is observed through [`JobService::job`] or
    /// [`JobService::list_jobs`].
    pub async fn submit_detached<R>(
        &self,
        upload: R,
        orig_input_fname: &str,
    ) -> CoreResult<JobRecord>
    where
        R: AsyncRead + Unpin,
    {
        let submitted = self.runner.submit(upload, orig_input_fname).await?;
        Ok(submitted.record)
    }

    /// Whether the jobs root currently exists as a directory.
    pub async fn storage_ready(&self) -> bool {
        tokio::fs::metadata(self.store.paths().root())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    pub async fn list_jobs(&self) -> CoreResult<JobListing> {
        self.store.list_all().await
    }

    pub async fn job(&self, id: &JobId) -> CoreResult<JobRecord> {
        self.store.load(id).await
    }

    pub async fn view_job(&self, id: &JobId) -> CoreResult<()> {
        self.viewer.view(id).await
    }

    pub fn viewer(&self) -> &ViewerSupervisor {
        &self.viewer
    }

    /// Stop the live viewer. Running analysis jobs are left to finish.
    pub async fn shutdown(&self) {
        self.viewer.shutdown().await;
    }
}

/// Flatten a worker's join result; a panicked or cancelled worker becomes
/// [`CoreError::WorkerFailed`].
fn completed(
    id: JobId,
    joined: Result<CoreResult<JobRecord>, JoinError>,
) -> CoreResult<JobRecord> {
    joined.map_err(|source| CoreError::WorkerFailed { job_id: id, source })?
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
