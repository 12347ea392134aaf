//! Reading and writing `Jobs.json`.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use super::{Manifest, JOBSUMMARY_FILE};
use crate::errors::Result;

impl Manifest {
    /// Path of the manifest inside a working directory.
    #[must_use]
    pub fn path_in(working_directory: &Path) -> PathBuf {
        working_directory.join(JOBSUMMARY_FILE)
    }

    /// Writes the manifest atomically into the working directory.
    ///
    /// The JSON is written to a uniquely named temporary file first and then
    /// renamed, so readers never see a partial file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn write(&self, working_directory: &Path) -> Result<PathBuf> {
        let path = Self::path_in(working_directory);
        let tmp = working_directory.join(format!(".{JOBSUMMARY_FILE}.{}.tmp", Uuid::new_v4()));

        let json = serde_json::to_string_pretty(self)?;
        if let Err(e) = fs::write(&tmp, json).and_then(|()| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!("Wrote {} jobs to '{}'.", self.len(), path.display());
        Ok(path)
    }

    /// Reads the manifest from the working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    pub fn read(working_directory: &Path) -> Result<Self> {
        let path = Self::path_in(working_directory);
        let content = fs::read_to_string(&path)?;
        let manifest: Self = serde_json::from_str(&content)?;
        debug!("Read {} jobs from '{}'.", manifest.len(), path.display());
        Ok(manifest)
    }
}
