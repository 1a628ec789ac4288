//! Job identity, lifecycle status and the persisted job record.
//!
//! A job moves strictly forward through `queued -> running -> complete|error`.
//! [`JobRecord::start`] and [`JobRecord::finish`] are the only ways to move a
//! record along; both refuse to go backwards or skip a state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;

/// Maximum accepted length of a job id.
pub const MAX_JOB_ID_LEN: usize = 128;

/// Prefix shared by every generated job id.
pub const JOB_ID_PREFIX: &str = "job-";

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// Opaque job identifier; doubles as the name of the job's directory.
///
/// Only ASCII alphanumerics, `-`, `_` and `.` are accepted so an id can never
/// escape the jobs root when joined onto it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Validate a client-supplied id.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        if is_safe_job_id(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(CoreError::InvalidJobId(raw.to_string()))
        }
    }

    /// Build the id for a submission at `at`.
    ///
    /// `attempt` 0 yields the bare timestamp form (`job-2024-05-01-13-45-07`);
    /// later attempts append a `-N` disambiguator.
    pub fn for_submission(at: Timestamp, attempt: u32) -> Self {
        let base = at.format("job-%Y-%m-%d-%H-%M-%S").to_string();
        if attempt == 0 {
            Self(base)
        } else {
            Self(format!("{base}-{attempt}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_safe_job_id(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() <= MAX_JOB_ID_LEN
        && raw != "."
        && raw != ".."
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_safe_job_id(&value) {
            Ok(Self(value))
        } else {
            Err(CoreError::InvalidJobId(value))
        }
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Complete,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// `true` for `complete` and `error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobRecord
// ---------------------------------------------------------------------------

/// Persisted lifecycle state of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobRecord {
    pub id: JobId,
    /// Filename supplied by the uploader. Display only.
    pub orig_input_fname: String,
    pub status: JobStatus,
    pub submission_time: Timestamp,
    pub start_time: Option<Timestamp>,
    pub stop_time: Option<Timestamp>,
}

impl JobRecord {
    /// A freshly submitted, queued job.
    pub fn new(id: JobId, orig_input_fname: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id,
            orig_input_fname: orig_input_fname.into(),
            status: JobStatus::Queued,
            submission_time: now,
            start_time: None,
            stop_time: None,
        }
    }

    /// Move `queued -> running`.
    pub fn start(&mut self, now: Timestamp) -> CoreResult<()> {
        self.ensure_status(JobStatus::Queued, JobStatus::Running)?;
        self.start_time = Some(now.max(self.submission_time));
        self.status = JobStatus::Running;
        Ok(())
    }

    /// Move `running -> complete` when `succeeded`, else `running -> error`.
    pub fn finish(&mut self, succeeded: bool, now: Timestamp) -> CoreResult<()> {
        let next = if succeeded {
            JobStatus::Complete
        } else {
            JobStatus::Error
        };
        self.ensure_status(JobStatus::Running, next)?;
        let floor = self.start_time.unwrap_or(self.submission_time);
        self.stop_time = Some(now.max(floor));
        self.status = next;
        Ok(())
    }

    fn ensure_status(&self, expected: JobStatus, next: JobStatus) -> CoreResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                job_id: self.id.clone(),
                from: self.status,
                to: next,
            })
        }
    }

    /// Check that the status and timestamps describe a reachable state.
    ///
    /// Returns a human-readable reason on failure; the store turns it into
    /// [`CoreError::Corrupt`].
    pub fn check_consistency(&self) -> Result<(), String> {
        match (self.status, self.start_time, self.stop_time) {
            (JobStatus::Queued, None, None) => {}
            (JobStatus::Running, Some(_), None) => {}
            (JobStatus::Complete | JobStatus::Error, Some(_), Some(_)) => {}
            (status, start, stop) => {
                return Err(format!(
                    "status '{status}' inconsistent with start_time={} stop_time={}",
                    if start.is_some() { "set" } else { "absent" },
                    if stop.is_some() { "set" } else { "absent" },
                ));
            }
        }

        if let Some(start) = self.start_time {
            if start < self.submission_time {
                return Err("start_time precedes submission_time".into());
            }
            if let Some(stop) = self.stop_time {
                if stop < start {
                    return Err("stop_time precedes start_time".into());
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
