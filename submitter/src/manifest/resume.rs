//! Detecting jobs that already finished.

use globset::{GlobBuilder, GlobMatcher};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{JobRecord, Manifest};
use crate::core::JobId;
use crate::errors::ConfigError;
use crate::utils::uri::uri_to_path;

/// What a finished job leaves behind.
#[derive(Debug, Clone)]
pub struct CompletionCheck {
    output_dir: String,
    matchers: Vec<GlobMatcher>,
}

impl CompletionCheck {
    /// Creates a check for the given output subdirectory and file patterns.
    ///
    /// # Errors
    ///
    /// Returns an error naming every pattern that is not a valid glob.
    pub fn new(output_dir: impl Into<String>, patterns: &[String]) -> Result<Self, ConfigError> {
        let mut matchers = Vec::with_capacity(patterns.len());
        let mut invalid = Vec::new();
        for pattern in patterns {
            match GlobBuilder::new(pattern).literal_separator(true).build() {
                Ok(glob) => matchers.push(glob.compile_matcher()),
                Err(e) => invalid.push(format!("{pattern} ({e})")),
            }
        }
        if !invalid.is_empty() {
            return Err(ConfigError::new(format!(
                "Invalid check_files pattern(s): {}",
                invalid.join(", ")
            ))
            .with_keys(["check_files"]));
        }
        Ok(Self {
            output_dir: output_dir.into(),
            matchers,
        })
    }

    /// The directory a job writes its output to.
    ///
    /// This is the destination directory if set, otherwise the job directory,
    /// joined with the output subdirectory.
    #[must_use]
    pub fn output_directory(&self, record: &JobRecord) -> PathBuf {
        let base = record
            .destination_directory
            .as_deref()
            .map_or_else(|| record.job_directory.clone(), uri_to_path);
        base.join(&self.output_dir)
    }

    fn entries(dir: &Path) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .min_depth(1)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter_map(|e| e.path().strip_prefix(dir).ok().map(Path::to_path_buf))
            .collect()
    }
}

/// Returns true if the job's output directory exists, is not empty and has
/// an entry for every configured pattern.
#[must_use]
pub fn job_was_successful(record: &JobRecord, check: &CompletionCheck) -> bool {
    let dir = check.output_directory(record);
    if !dir.is_dir() {
        return false;
    }
    let entries = CompletionCheck::entries(&dir);
    if entries.is_empty() {
        return false;
    }
    check
        .matchers
        .iter()
        .all(|m| entries.iter().any(|e| m.is_match(e)))
}

/// Splits the manifest into jobs still to run and finished job ids.
///
/// Finished jobs stay in the manifest itself.
#[must_use]
pub fn drop_finished_jobs(
    manifest: &Manifest,
    check: &CompletionCheck,
) -> (Vec<JobRecord>, Vec<JobId>) {
    debug!("Dropping already finished jobs.");
    let (finished, to_run): (Vec<&JobRecord>, Vec<&JobRecord>) = manifest
        .records()
        .iter()
        .partition(|r| job_was_successful(r, check));
    info!(
        "{} of {} Jobs have already finished and will be skipped.",
        finished.len(),
        manifest.len()
    );
    (
        to_run.into_iter().cloned().collect(),
        finished.into_iter().map(|r| r.job_id.clone()).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ParamValue;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::fs;

    fn record(dir: &Path, id: u64) -> JobRecord {
        let values = BTreeMap::from([("A".to_string(), ParamValue::Int(1))]);
        let rec = JobRecord::new(JobId::Index(id), values, dir);
        fs::create_dir_all(&rec.job_directory).unwrap();
        rec
    }

    fn check(patterns: &[&str]) -> CompletionCheck {
        let patterns: Vec<String> = patterns.iter().map(ToString::to_string).collect();
        CompletionCheck::new("Outputdata", &patterns).unwrap()
    }

    #[test]
    fn test_absent_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!job_was_successful(&record(dir.path(), 0), &check(&[])));
    }

    #[test]
    fn test_empty_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let rec = record(dir.path(), 0);
        fs::create_dir(rec.job_directory.join("Outputdata")).unwrap();
        assert!(!job_was_successful(&rec, &check(&[])));
    }

    #[test]
    fn test_all_patterns_needed() {
        let dir = tempfile::tempdir().unwrap();
        let rec = record(dir.path(), 0);
        let out = rec.job_directory.join("Outputdata");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("twiss.tfs"), "x").unwrap();

        assert!(job_was_successful(&rec, &check(&[])));
        assert!(job_was_successful(&rec, &check(&["*.tfs"])));
        assert!(!job_was_successful(&rec, &check(&["*.tfs", "*.log"])));

        fs::write(out.join("run.log"), "x").unwrap();
        assert!(job_was_successful(&rec, &check(&["*.tfs", "*.log"])));
    }

    #[test]
    fn test_destination_directory_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = record(dir.path(), 0);
        let dest = dir.path().join("dest");
        fs::create_dir_all(dest.join("Outputdata")).unwrap();
        fs::write(dest.join("Outputdata").join("a.txt"), "x").unwrap();
        rec.destination_directory = Some(dest.to_string_lossy().into_owned());
        assert!(job_was_successful(&rec, &check(&["a.txt"])));
    }

    #[test]
    fn test_drop_finished_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::new(vec!["A".into()]);
        for id in 0..3 {
            manifest.push(record(dir.path(), id)).unwrap();
        }
        let done = manifest.records()[1].job_directory.join("Outputdata");
        fs::create_dir(&done).unwrap();
        fs::write(done.join("out.txt"), "x").unwrap();

        let (to_run, finished) = drop_finished_jobs(&manifest, &check(&[]));
        assert_eq!(finished, vec![JobId::Index(1)]);
        assert_eq!(
            to_run.iter().map(|r| r.job_id.clone()).collect::<Vec<_>>(),
            vec![JobId::Index(0), JobId::Index(2)]
        );
        assert_eq!(manifest.len(), 3);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(CompletionCheck::new("out", &["a[".to_string()]).is_err());
    }
}
