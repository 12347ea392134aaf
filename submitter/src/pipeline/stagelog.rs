//! Persistent record of the stages a job has completed.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::errors::Result;

/// Append-only, newline-delimited list of completed stage names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLog {
    path: PathBuf,
}

impl StageLog {
    /// Creates a handle for the log at `path`; the file is created on the
    /// first append.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Completed stages in completion order. A missing file is an empty log.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn entries(&self) -> Result<Vec<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(ToString::to_string)
                .collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Appends a stage name and syncs the file to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, written or synced.
    pub fn append(&self, stage: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{stage}")?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}
