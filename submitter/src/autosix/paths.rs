//! Locations inside a SixDesk workspace and the SixDesk installation.

use std::path::{Path, PathBuf};

/// `set_env.sh`, relative to the SixDesk directory.
pub const SETENV_SH: &str = "utilities/bash/set_env.sh";
/// `mad6t.sh`, relative to the SixDesk directory.
pub const MAD_TO_SIXTRACK_SH: &str = "utilities/bash/mad6t.sh";
/// `run_six.sh`, relative to the SixDesk directory.
pub const RUNSIX_SH: &str = "utilities/bash/run_six.sh";
/// `run_status`, relative to the SixDesk directory.
pub const RUNSTATUS_SH: &str = "utilities/bash/run_status";
/// The SixDB script, relative to the SixDesk directory.
pub const SIXDB: &str = "utilities/externals/SixDeskDB/sixdb";
/// HTCondor template used by `run_six.sh`, relative to the SixDesk directory.
pub const HTCONDOR_RUN_SIX_SUB: &str = "utilities/templates/htcondor/htcondor_run_six.sub";
/// Name of SixDesk lock files.
pub const SIXDESKLOCKFILE: &str = "sixdesklock";

/// Paths of one job's SixDesk workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    jobname: String,
    basedir: PathBuf,
}

impl WorkspacePaths {
    /// Creates the paths for `jobname` inside `basedir`.
    #[must_use]
    pub fn new(jobname: impl Into<String>, basedir: impl Into<PathBuf>) -> Self {
        Self {
            jobname: jobname.into(),
            basedir: basedir.into(),
        }
    }

    /// Name of the job.
    #[must_use]
    pub fn jobname(&self) -> &str {
        &self.jobname
    }

    /// Directory all workspaces live in.
    #[must_use]
    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    /// `workspace-<job>`.
    #[must_use]
    pub fn workspace(&self) -> PathBuf {
        self.basedir.join(format!("workspace-{}", self.jobname))
    }

    /// Scratch directory shared by all jobs.
    #[must_use]
    pub fn scratch(&self) -> PathBuf {
        self.basedir.join("scratch-0")
    }

    /// `sixjobs`, where all SixDesk commands are run.
    #[must_use]
    pub fn sixjobs(&self) -> PathBuf {
        self.workspace().join("sixjobs")
    }

    /// The study settings read by SixDesk.
    #[must_use]
    pub fn sixdeskenv(&self) -> PathBuf {
        self.sixjobs().join("sixdeskenv")
    }

    /// The executable settings read by SixDesk.
    #[must_use]
    pub fn sysenv(&self) -> PathBuf {
        self.sixjobs().join("sysenv")
    }

    /// Directory of the filled masks.
    #[must_use]
    pub fn masks(&self) -> PathBuf {
        self.sixjobs().join("mask")
    }

    /// The filled mask, `mask/<job>.mask`.
    #[must_use]
    pub fn mask_file(&self) -> PathBuf {
        self.masks().join(format!("{}.mask", self.jobname))
    }

    /// Tracking results.
    #[must_use]
    pub fn track(&self) -> PathBuf {
        self.sixjobs().join("track")
    }

    /// SixDB database of the study.
    #[must_use]
    pub fn database(&self) -> PathBuf {
        self.sixjobs().join(format!("{}.db", self.jobname))
    }

    /// Input generated for SixTrack.
    #[must_use]
    pub fn sixtrack_input(&self) -> PathBuf {
        self.sixjobs().join("sixtrack_input")
    }

    /// The `mad6t.sh` copy inside the workspace.
    #[must_use]
    pub fn mad6t_mask(&self) -> PathBuf {
        self.sixtrack_input().join("mad6t.sh")
    }

    /// The `mad6t1.sh` copy inside the workspace.
    #[must_use]
    pub fn mad6t1_mask(&self) -> PathBuf {
        self.sixtrack_input().join("mad6t1.sh")
    }

    /// Output directory of autosix itself.
    #[must_use]
    pub fn autosix_output(&self) -> PathBuf {
        self.sixjobs().join("autosix_output")
    }

    /// The stage log.
    #[must_use]
    pub fn stagefile(&self) -> PathBuf {
        self.autosix_output().join("stages_completed.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_workspace_layout() {
        let paths = WorkspacePaths::new("b1_q26", "/study");
        assert_eq!(paths.workspace(), PathBuf::from("/study/workspace-b1_q26"));
        assert_eq!(paths.scratch(), PathBuf::from("/study/scratch-0"));
        assert_eq!(
            paths.mask_file(),
            PathBuf::from("/study/workspace-b1_q26/sixjobs/mask/b1_q26.mask")
        );
        assert_eq!(
            paths.mad6t1_mask(),
            PathBuf::from("/study/workspace-b1_q26/sixjobs/sixtrack_input/mad6t1.sh")
        );
        assert_eq!(
            paths.stagefile(),
            PathBuf::from("/study/workspace-b1_q26/sixjobs/autosix_output/stages_completed.txt")
        );
        assert_eq!(paths.database(), PathBuf::from("/study/workspace-b1_q26/sixjobs/b1_q26.db"));
    }
}
