//! Singleton result-viewer process.
//!
//! At most one viewer is tracked at a time. Launching a viewer for any job
//! retires the previous one first; the whole terminate-then-launch sequence
//! runs under one lock so concurrent requests cannot leak a process.

use std::process::Stdio;

use tokio::process::Child;
use tokio::sync::Mutex;

use crate::error::{CoreError, CoreResult};
use crate::job::JobId;
use crate::paths::JobPaths;
use crate::subprocess::ExternalCommand;

struct ViewerProcess {
    job_id: JobId,
    child: Child,
}

/// Owns the currently running viewer, if any.
pub struct ViewerSupervisor {
    paths: JobPaths,
    command: ExternalCommand,
    current: Mutex<Option<ViewerProcess>>,
}

impl ViewerSupervisor {
    pub fn new(paths: JobPaths, command: ExternalCommand) -> Self {
        Self {
            paths,
            command,
            current: Mutex::new(None),
        }
    }

    /// Show job `id`'s output, replacing whatever viewer is open.
    ///
    /// Returns `NotReady` without touching the current viewer when the job
    /// has no output artifact. Does not wait for the viewer to exit.
    pub async fn view(&self, id: &JobId) -> CoreResult<()> {
        let artifact = self.paths.output_file(id);
        let ready = tokio::fs::try_exists(&artifact)
            .await
            .map_err(|e| CoreError::storage(format!("checking {}", artifact.display()), e))?;
        if !ready {
            return Err(CoreError::NotReady(id.clone()));
        }

        let mut current = self.current.lock().await;

        if let Some(previous) = current.take() {
            terminate(previous).await;
        }

        let mut cmd = self.command.command_for(&artifact);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        let child = cmd.spawn().map_err(|e| CoreError::ExternalProcess {
            command: self.command.to_string(),
            source: e,
        })?;

        tracing::info!(job_id = %id, pid = ?child.id(), command = %self.command, "Viewer launched");

        *current = Some(ViewerProcess {
            job_id: id.clone(),
            child,
        });
        Ok(())
    }

    /// Pid and job of the tracked viewer, if one is tracked and still running.
    pub async fn current(&self) -> Option<(JobId, u32)> {
        let mut current = self.current.lock().await;
        let process = current.as_mut()?;
        match process.child.try_wait() {
            Ok(None) => process.child.id().map(|pid| (process.job_id.clone(), pid)),
            _ => {
                *current = None;
                None
            }
        }
    }

    /// Terminate the tracked viewer, if any.
    pub async fn shutdown(&self) {
        if let Some(previous) = self.current.lock().await.take() {
            terminate(previous).await;
        }
    }
}

/// Kill and reap a viewer. Failures are logged, never returned.
async fn terminate(mut process: ViewerProcess) {
    match process.child.try_wait() {
        Ok(Some(status)) => {
            tracing::debug!(job_id = %process.job_id, %status, "Previous viewer already exited");
        }
        _ => {
            let pid = process.child.id();
            match process.child.kill().await {
                Ok(()) => {
                    tracing::info!(job_id = %process.job_id, ?pid, "Previous viewer terminated");
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %process.job_id,
                        ?pid,
                        error = %e,
                        "Failed to terminate previous viewer",
                    );
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
