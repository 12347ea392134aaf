//! Error types for the submitter.
//!
//! Configuration and state-consistency errors are raised before anything is
//! written to disk. Faults inside autosix stage bodies never show up here:
//! the pipeline engine turns them into skips.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::JobId;

/// Convenience alias used throughout the crate.
pub type Result<T, E = SubmitterError> = std::result::Result<T, E>;

/// The main error type for submitter operations.
#[derive(Debug, Error)]
pub enum SubmitterError {
    /// Invalid user input, detected before any filesystem mutation.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The working directory is not in a state that allows the request.
    #[error("{0}")]
    State(#[from] StateError),

    /// More jobs than the scheduler accepts.
    #[error("Submitting too many jobs for HTCondor: {count} exceeds the limit of {limit}")]
    JobLimit {
        /// Number of jobs requested.
        count: usize,
        /// Hard scheduler limit.
        limit: usize,
    },

    /// At least one locally executed job returned a failure.
    #[error("{} of {total} jobs have failed: {}", failed.len(), format_ids(failed))]
    LocalRunFailed {
        /// Ids of all failed jobs.
        failed: Vec<JobId>,
        /// Number of jobs that were run.
        total: usize,
    },

    /// An external command failed.
    #[error("{0}")]
    Command(#[from] CommandError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_ids(ids: &[JobId]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Error raised when user input is invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConfigError {
    /// The error message.
    pub message: String,
    /// The offending keys, if any.
    pub keys: Vec<String>,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            keys: Vec::new(),
            fix_hint: None,
        }
    }

    /// Sets the offending keys.
    #[must_use]
    pub fn with_keys(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::json!(self.message));
        map.insert("keys".to_string(), serde_json::json!(self.keys));
        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        map
    }
}

/// Errors about the persisted state of a working directory.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum StateError {
    /// Append requested, but there is nothing to append to.
    #[error("Cannot append jobs, as no previous jobfile was found at '{}'", path.display())]
    MissingManifest {
        /// Where the manifest was expected.
        path: PathBuf,
    },

    /// Nothing left to do after deduplication.
    #[error("No (new) jobs found!")]
    NoNewJobs,

    /// Two rows ended up with the same job id.
    #[error("Job id '{job_id}' is already present in the manifest")]
    DuplicateJobId {
        /// The colliding id.
        job_id: String,
    },
}

/// Error raised when an external command fails.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process could not be started.
    #[error("Could not start '{command}': {source}")]
    Spawn {
        /// The command line.
        command: String,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The process exited with a non-zero status.
    #[error("Command '{command}' exited with status {status}. Check (debug-)log.")]
    ExitStatus {
        /// The command line.
        command: String,
        /// The exit code (-1 if killed by a signal).
        status: i32,
    },

    /// A failure marker appeared in the output.
    #[error("'{marker}' found in output of '{command}'. Check (debug-)log.")]
    FailureMarker {
        /// The command line.
        command: String,
        /// The marker that was found.
        marker: String,
    },
}

impl SubmitterError {
    /// Shorthand for a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(ConfigError::new(message))
    }

    /// Returns true for errors raised before anything was written.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_creation() {
        let err = ConfigError::new("Missing keys")
            .with_keys(["TURNS", "ANGLES"])
            .with_fix_hint("Add them to the replace dict");

        assert_eq!(err.keys, vec!["TURNS".to_string(), "ANGLES".to_string()]);
        assert_eq!(err.fix_hint.as_deref(), Some("Add them to the replace dict"));
        assert_eq!(err.to_string(), "Missing keys");
    }

    #[test]
    fn test_config_error_to_dict() {
        let dict = ConfigError::new("bad").with_keys(["A"]).to_dict();
        assert_eq!(dict.get("message").unwrap(), "bad");
        assert_eq!(dict.get("keys").unwrap(), &serde_json::json!(["A"]));
        assert!(!dict.contains_key("fix_hint"));
    }

    #[test]
    fn test_missing_manifest_message() {
        let err = StateError::MissingManifest {
            path: PathBuf::from("/tmp/work/Jobs.json"),
        };
        assert!(err.to_string().contains("Cannot append jobs"));
        assert!(err.to_string().contains("/tmp/work/Jobs.json"));
    }

    #[test]
    fn test_local_run_failed_lists_ids() {
        let err = SubmitterError::LocalRunFailed {
            failed: vec![JobId::Index(3), JobId::Name("a_1".into())],
            total: 5,
        };
        assert_eq!(err.to_string(), "2 of 5 jobs have failed: 3, a_1");
    }

    #[test]
    fn test_is_config() {
        assert!(SubmitterError::config("x").is_config());
        assert!(!SubmitterError::State(StateError::NoNewJobs).is_config());
    }
}
