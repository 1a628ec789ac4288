//! Well-known locations inside the jobs root.
//!
//! Pure path arithmetic, no I/O.

use std::path::{Path, PathBuf};

use crate::job::JobId;

/// Name of the raw upload inside a job directory.
pub const INPUT_FILE_NAME: &str = "input";

/// Name of the artifact the analysis command writes next to its input.
pub const OUTPUT_FILE_NAME: &str = "input.sqlite";

/// Suffix of the per-job record file (`<id>.info.json`).
pub const RECORD_FILE_SUFFIX: &str = ".info.json";

/// Maps job ids to paths under a configured jobs root.
#[derive(Debug, Clone)]
pub struct JobPaths {
    root: PathBuf,
}

impl JobPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, id: &JobId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub fn record_file(&self, id: &JobId) -> PathBuf {
        self.job_dir(id).join(format!("{id}{RECORD_FILE_SUFFIX}"))
    }

    pub fn input_file(&self, id: &JobId) -> PathBuf {
        self.job_dir(id).join(INPUT_FILE_NAME)
    }

    pub fn output_file(&self, id: &JobId) -> PathBuf {
        self.job_dir(id).join(OUTPUT_FILE_NAME)
    }
}
