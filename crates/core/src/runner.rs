//! Job submission and execution.
//!
//! [`JobRunner::submit`] does the synchronous part of a submission (identity,
//! directory, input payload, queued record) on the caller's task, then hands
//! the job to a spawned worker that drives it to a terminal state. The worker
//! owns the job from then on: dropping the caller does not strand the record
//! in `running`.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{CoreError, CoreResult};
use crate::job::{JobId, JobRecord};
use crate::paths::JobPaths;
use crate::store::RecordStore;
use crate::subprocess::{self, ExternalCommand, RunError};
use crate::types::Timestamp;

/// How many `-N` suffixes to try before giving up on a timestamp.
pub const MAX_ID_ATTEMPTS: u32 = 1000;

/// A job that has been accepted and handed to its worker.
#[derive(Debug)]
pub struct SubmittedJob {
    /// The record as first persisted (`queued`).
    pub record: JobRecord,
    /// Resolves to the terminal record once the analysis command exits.
    pub completion: JoinHandle<CoreResult<JobRecord>>,
}

/// Runs uploaded inputs through the analysis command.
#[derive(Debug, Clone)]
pub struct JobRunner {
    store: RecordStore,
    command: ExternalCommand,
    timeout: Option<Duration>,
    slots: Arc<Semaphore>,
}

impl JobRunner {
    /// `max_concurrent` bounds how many analysis commands run at once; it is
    /// raised to 1 if zero.
    pub fn new(
        store: RecordStore,
        command: ExternalCommand,
        timeout: Option<Duration>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            command,
            timeout,
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Accept an upload and start processing it.
    ///
    /// Filesystem failures before the worker starts are returned to the
    /// caller; whatever was already written is left in place.
    pub async fn submit<R>(&self, mut upload: R, orig_input_fname: &str) -> CoreResult<SubmittedJob>
    where
        R: AsyncRead + Unpin,
    {
        let paths = self.store.paths();
        let id = allocate_job_dir(paths, Utc::now()).await?;

        let input_path = paths.input_file(&id);
        let mut input = tokio::fs::File::create(&input_path)
            .await
            .map_err(|e| CoreError::storage(format!("creating {}", input_path.display()), e))?;
        let bytes = tokio::io::copy(&mut upload, &mut input)
            .await
            .map_err(|e| CoreError::storage(format!("writing {}", input_path.display()), e))?;
        input
            .flush()
            .await
            .map_err(|e| CoreError::storage(format!("writing {}", input_path.display()), e))?;
        drop(input);

        let record = JobRecord::new(id, orig_input_fname, Utc::now());
        self.store.save(&record).await?;

        tracing::info!(
            job_id = %record.id,
            orig_input_fname = %record.orig_input_fname,
            bytes,
            "Job queued",
        );

        let worker = self.clone();
        let queued = record.clone();
        let completion = tokio::spawn(async move { worker.execute(queued).await });

        Ok(SubmittedJob { record, completion })
    }

    /// Drive a queued job through `running` to `complete` or `error`.
    async fn execute(&self, mut record: JobRecord) -> CoreResult<JobRecord> {
        // The semaphore is never closed, so acquisition only fails if it is.
        let _permit = self.slots.acquire().await.ok();

        record.start(Utc::now())?;
        self.store.save(&record).await?;
        tracing::info!(job_id = %record.id, command = %self.command, "Job running");

        let input_path = self.store.paths().input_file(&record.id);
        let succeeded = match subprocess::run_to_exit(&self.command, &input_path, self.timeout).await
        {
            Ok(outcome) if outcome.succeeded() => {
                tracing::info!(
                    job_id = %record.id,
                    duration_ms = outcome.duration_ms,
                    "Analysis command finished",
                );
                true
            }
            Ok(outcome) => {
                tracing::warn!(
                    job_id = %record.id,
                    exit_code = outcome.exit_code(),
                    duration_ms = outcome.duration_ms,
                    stderr = %outcome.stderr.trim(),
                    "Analysis command failed",
                );
                false
            }
            Err(e @ RunError::Timeout { .. }) => {
                tracing::warn!(job_id = %record.id, error = %e, "Analysis command killed");
                false
            }
            Err(e) => {
                tracing::error!(
                    job_id = %record.id,
                    command = %self.command,
                    error = %e,
                    "Analysis command could not be run",
                );
                false
            }
        };

        record.finish(succeeded, Utc::now())?;
        self.store.save(&record).await?;
        tracing::info!(job_id = %record.id, status = %record.status, "Job finished");

        Ok(record)
    }
}

/// Reserve a fresh job id by creating its directory.
///
/// `create_dir` fails atomically when the directory exists, so two
/// submissions in the same second get distinct ids (`job-...-SS`,
/// `job-...-SS-1`, ...) and an existing job is never reused.
pub async fn allocate_job_dir(paths: &JobPaths, now: Timestamp) -> CoreResult<JobId> {
    for attempt in 0..MAX_ID_ATTEMPTS {
        let id = JobId::for_submission(now, attempt);
        let dir = paths.job_dir(&id);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => return Ok(id),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(CoreError::storage(format!("creating {}", dir.display()), e));
            }
        }
    }
    Err(CoreError::IdentityCollision(
        JobId::for_submission(now, 0).to_string(),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;
    use crate::job::JobStatus;
    use crate::subprocess::test_helpers::bash_script;

    const WRITE_ARTIFACT: &str = "cp \"$1\" \"$(dirname \"$1\")/input.sqlite\"\n";

    fn runner_in(dir: &tempfile::TempDir, command: ExternalCommand, max: usize) -> JobRunner {
        let store = RecordStore::new(JobPaths::new(dir.path()));
        JobRunner::new(store, command, None, max)
    }

    #[tokio::test]
    async fn successful_run_ends_complete_with_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let (_script, cmd) = bash_script(WRITE_ARTIFACT);
        let runner = runner_in(&dir, cmd, 2);

        let submitted = runner.submit(&b"##fileformat=VCFv4.2\n"[..], "sample.vcf").await.unwrap();
        assert_eq!(submitted.record.status, JobStatus::Queued);

        let done = submitted.completion.await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Complete);
        assert_eq!(done.orig_input_fname, "sample.vcf");

        let start = done.start_time.unwrap();
        let stop = done.stop_time.unwrap();
        assert!(done.submission_time <= start && start <= stop);

        let paths = JobPaths::new(dir.path());
        let input = tokio::fs::read(paths.input_file(&done.id)).await.unwrap();
        assert_eq!(input, b"##fileformat=VCFv4.2\n");
        assert!(paths.output_file(&done.id).exists());

        let store = RecordStore::new(paths);
        assert_eq!(store.load(&done.id).await.unwrap(), done);
    }

    #[tokio::test]
    async fn failing_command_ends_in_error_without_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let (_script, cmd) = bash_script("exit 1\n");
        let runner = runner_in(&dir, cmd, 2);

        let submitted = runner.submit(&b"data"[..], "bad.vcf").await.unwrap();
        let done = submitted.completion.await.unwrap().unwrap();

        assert_eq!(done.status, JobStatus::Error);
        assert!(done.stop_time.is_some());
        assert!(!JobPaths::new(dir.path()).output_file(&done.id).exists());
    }

    #[tokio::test]
    async fn missing_command_is_recorded_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_in(&dir, ExternalCommand::new("/no/such/analysis-tool"), 2);

        let submitted = runner.submit(&b"data"[..], "x.vcf").await.unwrap();
        let done = submitted.completion.await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Error);
    }

    #[tokio::test]
    async fn timeout_kills_command_and_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_script, cmd) = bash_script("sleep 60\n");
        let store = RecordStore::new(JobPaths::new(dir.path()));
        let runner = JobRunner::new(store, cmd, Some(Duration::from_millis(200)), 1);

        let submitted = runner.submit(&b"data"[..], "slow.vcf").await.unwrap();
        let done = submitted.completion.await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Error);
    }

    #[tokio::test]
    async fn same_second_submissions_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let paths = JobPaths::new(dir.path());
        let now = Utc.timestamp_opt(1_714_571_107, 0).unwrap();

        let first = allocate_job_dir(&paths, now).await.unwrap();
        let second = allocate_job_dir(&paths, now).await.unwrap();
        let third = allocate_job_dir(&paths, now).await.unwrap();

        assert_eq!(first.as_str(), "job-2024-05-01-13-45-07");
        assert_eq!(second.as_str(), "job-2024-05-01-13-45-07-1");
        assert_eq!(third.as_str(), "job-2024-05-01-13-45-07-2");
    }

    #[tokio::test]
    async fn exhausted_suffixes_report_identity_collision() {
        let dir = tempfile::tempdir().unwrap();
        let paths = JobPaths::new(dir.path());
        let now = Utc.timestamp_opt(1_714_571_107, 0).unwrap();
        for attempt in 0..MAX_ID_ATTEMPTS {
            let id = JobId::for_submission(now, attempt);
            tokio::fs::create_dir(paths.job_dir(&id)).await.unwrap();
        }

        assert_matches!(
            allocate_job_dir(&paths, now).await,
            Err(CoreError::IdentityCollision(_))
        );
    }

    #[tokio::test]
    async fn unwritable_root_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = JobPaths::new(dir.path().join("missing").join("root"));
        assert_matches!(
            allocate_job_dir(&paths, Utc::now()).await,
            Err(CoreError::Storage { .. })
        );
    }

    #[tokio::test]
    async fn concurrency_limit_keeps_extra_jobs_queued() {
        let dir = tempfile::tempdir().unwrap();
        let (_script, cmd) = bash_script("sleep 1\n");
        let runner = runner_in(&dir, cmd, 1);
        let store = RecordStore::new(JobPaths::new(dir.path()));

        let first = runner.submit(&b"a"[..], "a.vcf").await.unwrap();
        loop {
            if store.load(&first.record.id).await.unwrap().status == JobStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let second = runner.submit(&b"b"[..], "b.vcf").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            store.load(&second.record.id).await.unwrap().status,
            JobStatus::Queued
        );

        let first_done = first.completion.await.unwrap().unwrap();
        let second_done = second.completion.await.unwrap().unwrap();
        assert_eq!(first_done.status, JobStatus::Complete);
        assert_eq!(second_done.status, JobStatus::Complete);
        assert!(second_done.start_time.unwrap() >= first_done.stop_time.unwrap());
    }
}
