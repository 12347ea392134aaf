//! Snapshots of the options a tool was run with.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::timestamps::{file_timestamp, now_utc};
use crate::errors::Result;

/// Writes the options as `<script>_<timestamp>.json` into `output_dir`.
///
/// The directory is created if needed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn save_config(output_dir: &Path, options: &impl Serialize, script: &str) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{script}_{}.json", file_timestamp(&now_utc())));
    fs::write(&path, serde_json::to_string_pretty(options)?)?;
    debug!("Saved options to '{}'.", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Opts {
        mask: String,
        num_processes: usize,
    }

    #[test]
    fn test_save_config() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("new");
        let opts = Opts {
            mask: "job.madx".into(),
            num_processes: 4,
        };
        let path = save_config(&out, &opts, "job_submitter").unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("job_submitter_"));
        assert!(name.ends_with(".json"));
        let back: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back["num_processes"], 4);
    }
}
