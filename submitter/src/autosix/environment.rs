//! Campaign-wide autosix settings.

use serde::Serialize;
use std::path::{Path, PathBuf};

use super::stages::STAGE_NAMES;
use crate::errors::ConfigError;
use crate::mask::resolve_executable;
use crate::pipeline::StageOrder;

/// Default SixDesk installation.
pub const SIXDESK_UTILS: &str = "/afs/cern.ch/project/sixtrack/SixDesk_utilities/pro";

/// Settings shared by all jobs of an autosix campaign.
///
/// Built and validated by [`AutoSixEnvironmentBuilder`]; read-only after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct AutoSixEnvironment {
    /// Unfilled mask text.
    pub mask_text: String,
    /// Directory the workspaces are created in.
    pub working_directory: PathBuf,
    /// MAD-X binary.
    pub executable: PathBuf,
    /// Python 2 used by `run_six.sh`, its directory is passed on.
    pub python2: Option<PathBuf>,
    /// Python 3 used by SixDB.
    pub python3: PathBuf,
    /// Step between turns for DA-vs-turns, handed to the post-processing command.
    pub da_turnstep: u32,
    /// SixDesk installation.
    pub sixdesk_directory: PathBuf,
    /// Remove lock files before running.
    pub unlock: bool,
    /// Last stage to run.
    pub max_stage: Option<String>,
    /// Host to run SixDesk commands on.
    pub ssh: Option<String>,
    /// Skip workspace initialization to allow manual changes.
    pub stop_workspace_init: bool,
    /// Patch the `mad6t` scripts after initialization.
    pub apply_mad6t_hacks: bool,
    /// Resubmit failed input generation or tracking jobs.
    pub resubmit: bool,
    /// `max_materialize` for the SixTrack submit template, 0 removes it.
    pub max_materialize: Option<u32>,
    /// Command run by the post-processing stage.
    pub post_process: Option<String>,
}

impl AutoSixEnvironment {
    /// Starts a builder with the required settings.
    #[must_use]
    pub fn builder(
        mask_text: impl Into<String>,
        working_directory: impl Into<PathBuf>,
    ) -> AutoSixEnvironmentBuilder {
        AutoSixEnvironmentBuilder::new(mask_text, working_directory)
    }

    /// Location of a script inside the SixDesk installation.
    #[must_use]
    pub fn sixdesk_path(&self, relative: &str) -> PathBuf {
        self.sixdesk_directory.join(relative)
    }
}

/// Builder for [`AutoSixEnvironment`].
#[derive(Debug, Clone)]
pub struct AutoSixEnvironmentBuilder {
    env: AutoSixEnvironment,
}

impl AutoSixEnvironmentBuilder {
    /// Creates a builder with defaults for all optional settings.
    #[must_use]
    pub fn new(mask_text: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            env: AutoSixEnvironment {
                mask_text: mask_text.into(),
                working_directory: working_directory.into(),
                executable: PathBuf::from(resolve_executable("madx")),
                python2: None,
                python3: PathBuf::from("python3"),
                da_turnstep: 100,
                sixdesk_directory: PathBuf::from(SIXDESK_UTILS),
                unlock: false,
                max_stage: None,
                ssh: None,
                stop_workspace_init: false,
                apply_mad6t_hacks: false,
                resubmit: false,
                max_materialize: None,
                post_process: None,
            },
        }
    }

    /// Sets the MAD-X binary (aliases are resolved).
    #[must_use]
    pub fn executable(mut self, executable: &str) -> Self {
        self.env.executable = PathBuf::from(resolve_executable(executable));
        self
    }

    /// Sets the Python 2 interpreter for `run_six.sh`.
    #[must_use]
    pub fn python2(mut self, python2: Option<PathBuf>) -> Self {
        self.env.python2 = python2;
        self
    }

    /// Sets the Python 3 interpreter for SixDB.
    #[must_use]
    pub fn python3(mut self, python3: impl Into<PathBuf>) -> Self {
        self.env.python3 = python3.into();
        self
    }

    /// Sets the DA-vs-turns step.
    #[must_use]
    pub fn da_turnstep(mut self, step: u32) -> Self {
        self.env.da_turnstep = step;
        self
    }

    /// Sets the SixDesk installation.
    #[must_use]
    pub fn sixdesk_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.env.sixdesk_directory = dir.into();
        self
    }

    /// Removes lock files before running.
    #[must_use]
    pub fn unlock(mut self, unlock: bool) -> Self {
        self.env.unlock = unlock;
        self
    }

    /// Sets the last stage to run.
    #[must_use]
    pub fn max_stage(mut self, stage: Option<String>) -> Self {
        self.env.max_stage = stage;
        self
    }

    /// Runs SixDesk commands on this host.
    #[must_use]
    pub fn ssh(mut self, host: Option<String>) -> Self {
        self.env.ssh = host;
        self
    }

    /// Stops before workspace initialization.
    #[must_use]
    pub fn stop_workspace_init(mut self, stop: bool) -> Self {
        self.env.stop_workspace_init = stop;
        self
    }

    /// Patches the `mad6t` scripts.
    #[must_use]
    pub fn apply_mad6t_hacks(mut self, apply: bool) -> Self {
        self.env.apply_mad6t_hacks = apply;
        self
    }

    /// Resubmits failed jobs in the check stages.
    #[must_use]
    pub fn resubmit(mut self, resubmit: bool) -> Self {
        self.env.resubmit = resubmit;
        self
    }

    /// Sets `max_materialize`; `Some(0)` removes it from the template.
    #[must_use]
    pub fn max_materialize(mut self, value: Option<u32>) -> Self {
        self.env.max_materialize = value;
        self
    }

    /// Sets the command of the post-processing stage.
    #[must_use]
    pub fn post_process(mut self, command: Option<String>) -> Self {
        self.env.post_process = command;
        self
    }

    /// Validates and returns the environment.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty mask, a zero turn step, an empty
    /// post-process command or an unknown maximum stage.
    pub fn build(self) -> Result<AutoSixEnvironment, ConfigError> {
        let env = self.env;
        if env.mask_text.trim().is_empty() {
            return Err(ConfigError::new("The mask is empty.").with_keys(["mask"]));
        }
        if env.da_turnstep == 0 {
            return Err(
                ConfigError::new("da_turnstep needs to be positive.").with_keys(["da_turnstep"])
            );
        }
        if env.post_process.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(ConfigError::new("The post-process command is empty.")
                .with_keys(["post_process"]));
        }
        StageOrder::new(STAGE_NAMES)?.resolve(env.max_stage.as_deref())?;
        Ok(env)
    }
}

/// The directory `run_six.sh` expects for `-P`.
pub(crate) fn python_directory(python: &Path) -> PathBuf {
    if python.is_dir() {
        return python.to_path_buf();
    }
    python
        .parent()
        .map_or_else(|| python.to_path_buf(), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let env = AutoSixEnvironment::builder("mask", "/study").build().unwrap();
        assert_eq!(env.executable, PathBuf::from("/afs/cern.ch/user/m/mad/bin/madx"));
        assert_eq!(env.python3, PathBuf::from("python3"));
        assert_eq!(env.da_turnstep, 100);
        assert_eq!(env.sixdesk_directory, PathBuf::from(SIXDESK_UTILS));
        assert!(env.max_stage.is_none());
    }

    #[test]
    fn test_unknown_max_stage() {
        let err = AutoSixEnvironment::builder("mask", "/study")
            .max_stage(Some("submit_everything".into()))
            .build()
            .unwrap_err();
        assert_eq!(err.keys, vec!["max_stage"]);
    }

    #[test]
    fn test_known_max_stage() {
        let env = AutoSixEnvironment::builder("mask", "/study")
            .max_stage(Some("check_input".into()))
            .build()
            .unwrap();
        assert_eq!(env.max_stage.as_deref(), Some("check_input"));
    }

    #[test]
    fn test_empty_mask() {
        assert!(AutoSixEnvironment::builder("  \n", "/study").build().is_err());
    }

    #[test]
    fn test_python_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(python_directory(dir.path()), dir.path());
        assert_eq!(
            python_directory(Path::new("/opt/py2/bin/python")),
            PathBuf::from("/opt/py2/bin")
        );
    }
}
