//! Durable per-job record files.
//!
//! Records are written with write-to-temp + `rename`, so a concurrent reader
//! sees either the previous record or the new one, never a partial file.

use std::io::ErrorKind;
use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::error::{CoreError, CoreResult};
use crate::job::{JobId, JobRecord};
use crate::paths::JobPaths;

/// A job directory that could not be turned into a record during listing.
#[derive(Debug)]
pub struct ListingIssue {
    /// Directory name under the jobs root.
    pub job_id: String,
    pub error: CoreError,
}

/// Result of scanning the jobs root.
#[derive(Debug, Default)]
pub struct JobListing {
    /// Valid records, oldest submission first.
    pub records: Vec<JobRecord>,
    pub issues: Vec<ListingIssue>,
}

/// Reads and writes job records under a jobs root.
#[derive(Debug, Clone)]
pub struct RecordStore {
    paths: JobPaths,
}

impl RecordStore {
    pub fn new(paths: JobPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &JobPaths {
        &self.paths
    }

    /// Load the record of job `id`.
    ///
    /// Fails with `NotFound` when the record file is missing and `Corrupt`
    /// when it does not parse or describes an impossible state.
    pub async fn load(&self, id: &JobId) -> CoreResult<JobRecord> {
        let path = self.paths.record_file(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CoreError::NotFound(id.clone()));
            }
            Err(e) => {
                return Err(CoreError::storage(
                    format!("reading {}", path.display()),
                    e,
                ));
            }
        };

        let record: JobRecord =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(id.as_str(), e.to_string()))?;

        if record.id != *id {
            return Err(corrupt(
                id.as_str(),
                format!("record id '{}' does not match its directory", record.id),
            ));
        }
        record
            .check_consistency()
            .map_err(|reason| corrupt(id.as_str(), reason))?;

        Ok(record)
    }

    /// Atomically replace the record file of `record.id`.
    pub async fn save(&self, record: &JobRecord) -> CoreResult<()> {
        let path = self.paths.record_file(&record.id);
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| CoreError::storage("serializing job record", e.into()))?;

        let tmp_path = path.with_file_name(format!(
            "{}{}.{}.tmp",
            record.id,
            crate::paths::RECORD_FILE_SUFFIX,
            uuid::Uuid::new_v4().simple()
        ));

        if let Err(e) = write_synced(&tmp_path, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(CoreError::storage(
                format!("writing {}", tmp_path.display()),
                e,
            ));
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(CoreError::storage(
                format!("replacing {}", path.display()),
                e,
            ));
        }

        tracing::debug!(job_id = %record.id, status = %record.status, "Saved job record");
        Ok(())
    }

    /// Load every job under the jobs root.
    ///
    /// Directories without a valid record are reported in
    /// [`JobListing::issues`] instead of failing the whole listing. Plain
    /// files in the jobs root are ignored.
    pub async fn list_all(&self) -> CoreResult<JobListing> {
        let root = self.paths.root();
        let mut entries = tokio::fs::read_dir(root)
            .await
            .map_err(|e| CoreError::storage(format!("listing {}", root.display()), e))?;

        let mut listing = JobListing::default();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CoreError::storage(format!("listing {}", root.display()), e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let result = match JobId::parse(&name) {
                Ok(id) => self.load(&id).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(record) => listing.records.push(record),
                Err(error) => {
                    tracing::warn!(job_id = %name, error = %error, "Skipping job without a valid record");
                    listing.issues.push(ListingIssue {
                        job_id: name,
                        error,
                    });
                }
            }
        }

        listing
            .records
            .sort_by(|a, b| (a.submission_time, &a.id).cmp(&(b.submission_time, &b.id)));

        Ok(listing)
    }
}

fn corrupt(job_id: &str, reason: String) -> CoreError {
    CoreError::Corrupt {
        job_id: job_id.to_string(),
        reason,
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
