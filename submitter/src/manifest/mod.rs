//! The job manifest: the authoritative table of all jobs of a study.
//!
//! Records keep generation order and job ids are unique. The manifest is
//! persisted as `Jobs.json` in the working directory (see [`io`]).

pub mod io;
pub mod reconcile;
pub mod resume;

pub use reconcile::{new_rows, reconcile, SOFT_JOB_THRESHOLD};
pub use resume::{drop_finished_jobs, job_was_successful, CompletionCheck};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tracing::info;

use crate::core::{JobId, ParamValue};
use crate::errors::StateError;

/// Prefix of job directories, `Job.<id>`.
pub const JOBDIRECTORY_PREFIX: &str = "Job";

/// File name of the persisted manifest.
pub const JOBSUMMARY_FILE: &str = "Jobs.json";

/// Header recording the directory the jobs were generated in.
pub const HEADER_BASEDIR: &str = "BASEDIR";

/// One job of the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job id.
    pub job_id: JobId,
    /// Parameter values of this job.
    pub values: BTreeMap<String, ParamValue>,
    /// Directory the job runs in.
    pub job_directory: PathBuf,
    /// Directory (or EOS URI) the output is copied to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_directory: Option<String>,
    /// Name of the filled job script inside the job directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_file: Option<String>,
    /// Shell wrapper executed by the scheduler or the local runner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_script: Option<PathBuf>,
}

impl JobRecord {
    /// Creates a record whose directory is `Job.<id>` inside `working_directory`.
    #[must_use]
    pub fn new(
        job_id: JobId,
        values: BTreeMap<String, ParamValue>,
        working_directory: &std::path::Path,
    ) -> Self {
        let job_directory = working_directory.join(job_id.directory_name());
        Self {
            job_id,
            values,
            job_directory,
            destination_directory: None,
            job_file: None,
            shell_script: None,
        }
    }

    /// Returns true if the record has the same values for all `columns`.
    #[must_use]
    pub fn matches(&self, columns: &[String], values: &[ParamValue]) -> bool {
        columns
            .iter()
            .zip(values)
            .all(|(col, v)| self.values.get(col).is_some_and(|own| own == v))
    }
}

/// Ordered collection of job records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Provenance headers, e.g. [`HEADER_BASEDIR`].
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    parameters: Vec<String>,
    #[serde(rename = "jobs")]
    records: Vec<JobRecord>,
}

impl Manifest {
    /// Creates an empty manifest with the given parameter columns.
    #[must_use]
    pub fn new(parameters: Vec<String>) -> Self {
        Self {
            headers: BTreeMap::new(),
            parameters,
            records: Vec::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Parameter columns.
    #[must_use]
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Adds parameter columns that are not yet known.
    pub fn extend_parameters<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) {
        for name in names {
            if !self.parameters.contains(name) {
                self.parameters.push(name.clone());
            }
        }
    }

    /// All records in generation order.
    #[must_use]
    pub fn records(&self) -> &[JobRecord] {
        &self.records
    }

    /// Mutable access to all records.
    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut JobRecord> {
        self.records.iter_mut()
    }

    /// Looks up a record by id.
    #[must_use]
    pub fn get(&self, job_id: &JobId) -> Option<&JobRecord> {
        self.records.iter().find(|r| &r.job_id == job_id)
    }

    /// Job ids in order.
    #[must_use]
    pub fn ids(&self) -> Vec<JobId> {
        self.records.iter().map(|r| r.job_id.clone()).collect()
    }

    /// Number of jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no jobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is already taken.
    pub fn push(&mut self, record: JobRecord) -> Result<(), StateError> {
        if self.get(&record.job_id).is_some() {
            return Err(StateError::DuplicateJobId {
                job_id: record.job_id.to_string(),
            });
        }
        self.records.push(record);
        Ok(())
    }

    /// Appends all records, checking every id.
    ///
    /// # Errors
    ///
    /// Returns an error on the first id collision; nothing is appended then.
    pub fn extend(&mut self, records: Vec<JobRecord>) -> Result<(), StateError> {
        let mut seen: HashSet<String> = self.records.iter().map(|r| r.job_id.to_string()).collect();
        for record in &records {
            if !seen.insert(record.job_id.to_string()) {
                return Err(StateError::DuplicateJobId {
                    job_id: record.job_id.to_string(),
                });
            }
        }
        self.records.extend(records);
        Ok(())
    }

    /// Keeps only the records with the given ids.
    #[must_use]
    pub fn subset(&self, ids: &[JobId]) -> Vec<JobRecord> {
        self.records
            .iter()
            .filter(|r| ids.contains(&r.job_id))
            .cloned()
            .collect()
    }
}

/// Logs a quick statistics block of the run set and the finished jobs.
pub fn print_stats(to_run: &[JobId], finished: &[JobId]) {
    let mut text = vec![
        "------------- QUICK STATS ----------------".to_string(),
        format!("Jobs total: {}", to_run.len() + finished.len()),
        format!("Jobs to run: {}", to_run.len()),
        format!("Jobs already finished: {}", finished.len()),
        "---------- JOBS TO RUN: NAMES -------------".to_string(),
    ];
    text.extend(to_run.iter().map(ToString::to_string));
    text.push("--------- JOBS FINISHED: NAMES ------------".to_string());
    text.extend(finished.iter().map(ToString::to_string));
    info!("\n{}", text.join("\n"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn record(id: u64, a: i64) -> JobRecord {
        let values = BTreeMap::from([("A".to_string(), ParamValue::Int(a))]);
        JobRecord::new(JobId::Index(id), values, Path::new("/work"))
    }

    #[test]
    fn test_record_directory() {
        assert_eq!(record(3, 1).job_directory, PathBuf::from("/work/Job.3"));
    }

    #[test]
    fn test_push_rejects_duplicate_id() {
        let mut manifest = Manifest::new(vec!["A".into()]);
        manifest.push(record(0, 1)).unwrap();
        let err = manifest.push(record(0, 2)).unwrap_err();
        assert!(matches!(err, StateError::DuplicateJobId { .. }));
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_extend_is_all_or_nothing() {
        let mut manifest = Manifest::new(vec!["A".into()]);
        manifest.push(record(0, 1)).unwrap();
        assert!(manifest.extend(vec![record(1, 2), record(0, 3)]).is_err());
        assert_eq!(manifest.ids(), vec![JobId::Index(0)]);
    }

    #[test]
    fn test_record_matches() {
        let rec = record(0, 2);
        let cols = vec!["A".to_string()];
        assert!(rec.matches(&cols, &[ParamValue::Float(2.0)]));
        assert!(!rec.matches(&cols, &[ParamValue::from("2")]));
        assert!(!rec.matches(&["B".to_string()], &[ParamValue::Int(2)]));
    }

    #[test]
    fn test_extend_parameters_keeps_order() {
        let mut manifest = Manifest::new(vec!["A".into(), "B".into()]);
        manifest.extend_parameters(&["B".to_string(), "C".to_string()]);
        assert_eq!(manifest.parameters(), &["A", "B", "C"]);
    }
}
