//! Job id assignment.

use crate::core::JobId;
use crate::errors::ConfigError;
use crate::mask;

use super::GridRow;

/// Checks that a job id template only references parameters in `names`.
///
/// # Errors
///
/// Returns an error listing the unknown parameters.
pub fn check_template(template: &str, names: &[String]) -> Result<(), ConfigError> {
    let missing: Vec<String> = mask::find_named_variables(template)
        .into_iter()
        .filter(|key| !names.contains(key))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(ConfigError::new(format!(
        "Job id template references unknown parameter(s): {}",
        missing.join(", ")
    ))
    .with_keys(missing))
}

/// Assigns an id to every row.
///
/// With a template, ids are rendered by filling its placeholders with the
/// row's values; collisions are not checked here. Without one, ids are
/// contiguous integers starting at `start` (the length of a prior manifest
/// when appending).
///
/// # Errors
///
/// Returns an error if the template references a parameter that is not in
/// `names`.
pub fn assign_job_ids(
    template: Option<&str>,
    names: &[String],
    rows: &[GridRow],
    start: u64,
) -> Result<Vec<JobId>, ConfigError> {
    match template {
        Some(template) => {
            check_template(template, names)?;
            rows.iter()
                .map(|row| mask::fill(template, &row.to_values(names)).map(JobId::Name))
                .collect()
        }
        None => Ok((start..).zip(rows).map(|(i, _)| JobId::Index(i)).collect()),
    }
}
