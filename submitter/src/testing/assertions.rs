//! Test assertions for job reports and stage logs.

use crate::core::StageRunStatus;
use crate::pipeline::{JobReport, StageLog};

/// Asserts that a stage ended with the expected status.
///
/// # Panics
///
/// Panics if the stage was not visited or has a different status.
pub fn assert_stage_status(report: &JobReport, stage: &str, expected: &StageRunStatus) {
    let actual = report.status(stage);
    assert_eq!(
        actual,
        Some(expected),
        "Expected status {expected:?} for stage '{stage}', got {actual:?}"
    );
}

/// Asserts the exact content of a stage log.
///
/// # Panics
///
/// Panics if the log cannot be read or differs.
pub fn assert_stage_log(log: &StageLog, expected: &[&str]) {
    let entries = match log.entries() {
        Ok(entries) => entries,
        Err(e) => panic!("Could not read stage log '{}': {e}", log.path().display()),
    };
    assert_eq!(entries, expected, "Unexpected stage log content");
}
