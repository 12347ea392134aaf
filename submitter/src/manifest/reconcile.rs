//! Combining a freshly generated grid with a prior manifest.

use std::path::Path;
use tracing::{debug, warn};

use super::{JobRecord, Manifest};
use crate::errors::{ConfigError, Result, StateError};
use crate::grid::{assign_job_ids, GridRow, ParameterSpace};

/// Number of new jobs above which a warning is logged.
pub const SOFT_JOB_THRESHOLD: usize = 10_000;

/// Keeps the rows whose values do not appear in the prior manifest.
///
/// Only the current parameter columns are compared.
///
/// # Errors
///
/// Returns an error if the prior manifest lacks one of the parameters.
pub fn new_rows(
    prior: &Manifest,
    names: &[String],
    rows: Vec<GridRow>,
) -> Result<Vec<GridRow>, ConfigError> {
    if let Some(missing) = names.iter().find(|n| !prior.parameters().contains(*n)) {
        return Err(ConfigError::new(format!(
            "Parameter '{missing}' is not present in the previous jobs, cannot append"
        ))
        .with_keys([missing.as_str()]));
    }
    Ok(rows
        .into_iter()
        .filter(|row| !prior.records().iter().any(|r| r.matches(names, row.values())))
        .collect())
}

/// Builds the authoritative manifest for this run.
///
/// Without `append` the grid alone makes up the manifest. With `append` the
/// prior `Jobs.json` is loaded, rows already present are dropped and the new
/// rows are added after the prior ones; integer ids continue where the prior
/// manifest ended.
///
/// # Errors
///
/// Returns a state error if the prior manifest is missing, no new job
/// remains or an id collides; a configuration error for invalid input.
pub fn reconcile(
    space: &ParameterSpace,
    template: Option<&str>,
    working_directory: &Path,
    append: bool,
) -> Result<Manifest> {
    debug!("Generating parameter space.");
    let names = space.names();
    let mut rows = space.grid()?;

    let mut manifest = if append {
        let path = Manifest::path_in(working_directory);
        if !path.is_file() {
            return Err(StateError::MissingManifest { path }.into());
        }
        let prior = Manifest::read(working_directory)?;
        rows = new_rows(&prior, &names, rows)?;
        prior
    } else {
        Manifest::new(names.clone())
    };

    let njobs = rows.len();
    if njobs == 0 {
        return Err(StateError::NoNewJobs.into());
    }
    if njobs > SOFT_JOB_THRESHOLD {
        warn!(
            "You are attempting to submit an important number of jobs ({njobs}). \
             This can be a high stress on your system, make sure you know what you are doing."
        );
    }
    debug!("Initial number of jobs: {njobs}");

    let start = manifest.len() as u64;
    let ids = assign_job_ids(template, &names, &rows, start)?;
    let records = ids
        .into_iter()
        .zip(&rows)
        .map(|(id, row)| JobRecord::new(id, row.to_values(&names), working_directory))
        .collect();

    manifest.extend_parameters(&names);
    manifest.extend(records)?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobId, ParamValue};
    use crate::errors::SubmitterError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fresh_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let space = ParameterSpace::new().with_parameter("A", [1, 2]);
        let manifest = reconcile(&space, None, dir.path(), false).unwrap();
        assert_eq!(manifest.ids(), vec![JobId::Index(0), JobId::Index(1)]);
        assert_eq!(manifest.records()[1].job_directory, dir.path().join("Job.1"));
    }

    #[test]
    fn test_append_without_prior_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let space = ParameterSpace::new().with_parameter("A", [1]);
        let err = reconcile(&space, None, dir.path(), true).unwrap_err();
        assert!(matches!(err, SubmitterError::State(StateError::MissingManifest { .. })));
    }

    #[test]
    fn test_append_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let first = reconcile(&ParameterSpace::new().with_parameter("A", [1, 2]), None, dir.path(), false)
            .unwrap();
        first.write(dir.path()).unwrap();

        let space = ParameterSpace::new().with_parameter("A", [1, 2, 3]);
        let manifest = reconcile(&space, None, dir.path(), true).unwrap();
        assert_eq!(manifest.len(), 3);
        assert_eq!(&manifest.records()[..2], first.records());
        let last = &manifest.records()[2];
        assert_eq!(last.job_id, JobId::Index(2));
        assert_eq!(last.values["A"], ParamValue::Int(3));
    }

    #[test]
    fn test_append_nothing_new() {
        let dir = tempfile::tempdir().unwrap();
        let space = ParameterSpace::new().with_parameter("A", [1, 2]);
        reconcile(&space, None, dir.path(), false).unwrap().write(dir.path()).unwrap();
        let err = reconcile(&space, None, dir.path(), true).unwrap_err();
        assert!(matches!(err, SubmitterError::State(StateError::NoNewJobs)));
    }

    #[test]
    fn test_append_unknown_parameter() {
        let prior = Manifest::new(vec!["A".into()]);
        let err = new_rows(&prior, &["B".to_string()], vec![GridRow(vec![1.into()])]).unwrap_err();
        assert_eq!(err.keys, vec!["B".to_string()]);
    }

    #[test]
    fn test_append_string_never_matches_number() {
        let dir = tempfile::tempdir().unwrap();
        let space = ParameterSpace::new().with_parameter("A", [1]);
        reconcile(&space, None, dir.path(), false).unwrap().write(dir.path()).unwrap();

        let rows = vec![GridRow(vec!["1".into()]), GridRow(vec![ParamValue::Float(1.0)])];
        let prior = Manifest::read(dir.path()).unwrap();
        let kept = new_rows(&prior, &["A".to_string()], rows).unwrap();
        assert_eq!(kept, vec![GridRow(vec!["1".into()])]);
    }

    #[test]
    fn test_template_collision_is_state_error() {
        let dir = tempfile::tempdir().unwrap();
        let space = ParameterSpace::new()
            .with_parameter("A", [1, 2])
            .with_parameter("B", ["x"]);
        let err = reconcile(&space, Some("%(B)s"), dir.path(), false).unwrap_err();
        assert!(matches!(err, SubmitterError::State(StateError::DuplicateJobId { .. })));
    }
}
