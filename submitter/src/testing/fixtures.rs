//! Test fixtures for stage pipeline tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::{JobId, ParamValue};
use crate::pipeline::StageLog;
use crate::stages::JobContext;

/// A job with its own stage log inside a scratch directory.
#[derive(Debug, Clone)]
pub struct TestJob {
    /// Context passed to the stages.
    pub context: JobContext,
    /// The job's stage log.
    pub log: StageLog,
}

impl TestJob {
    /// Creates a job named `id` whose stage log lives in `directory`.
    #[must_use]
    pub fn new(directory: &Path, id: impl Into<JobId>) -> Self {
        let job_id = id.into();
        let log = StageLog::new(directory.join(format!("stages_{job_id}.txt")));
        Self {
            context: JobContext::new(job_id, BTreeMap::new(), directory),
            log,
        }
    }

    /// Adds a parameter value to the job.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.context.values.insert(key.into(), value.into());
        self
    }

    /// Path of the stage log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.log.path().to_path_buf()
    }
}
