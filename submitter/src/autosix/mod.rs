//! AutoSix: SixDesk studies driven through a resumable stage pipeline.
//!
//! Every point of the parameter grid becomes its own SixDesk workspace
//! (`workspace-<job>`). The replace dict holds the mask variables as well as
//! the SixDesk settings (see [`SIXENV_REQUIRED`] and [`SIXENV_OPTIONAL`]).
//! Each invocation moves every job as far through the stages as possible;
//! progress is kept in the job's stage log, so running autosix again after
//! the scheduler finished continues where it stopped.

mod environment;
pub mod paths;
mod sixdesk;
mod sixdeskenv;
mod stages;
mod workspace;

pub use environment::{AutoSixEnvironment, AutoSixEnvironmentBuilder, SIXDESK_UTILS};
pub use paths::WorkspacePaths;
pub use sixdeskenv::{
    check_seeds, SixDeskEnvironment, PMASS, SEED_PLACEHOLDER, SIXENV_OPTIONAL, SIXENV_REQUIRED,
};
pub use stages::{build_pipeline, AutoSixStage, AutoSixStageKind, STAGE_NAMES};
pub use workspace::{is_locked, set_max_materialize};

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::errors::{ConfigError, Result};
use crate::grid::{assign_job_ids, check_template, ParameterSpace};
use crate::manifest::{JobRecord, Manifest, HEADER_BASEDIR};
use crate::mask;
use crate::pipeline::{JobReport, StageLog, StagePipeline};
use crate::stages::JobContext;
use crate::submit::command::CommandRunner;
use crate::utils::save_config;

/// User input of an autosix run, before validation.
#[derive(Debug, Clone, Serialize)]
pub struct AutoSixOptions {
    /// Mask file.
    pub mask: PathBuf,
    /// Directory the workspaces are created in.
    pub working_directory: PathBuf,
    /// Mask and SixDesk variables, name to value(s).
    pub replace_dict: serde_json::Value,
    /// Template for job names.
    pub jobid_mask: Option<String>,
    /// MAD-X binary or alias.
    pub executable: String,
    /// Python 2 for `run_six.sh`.
    pub python2: Option<PathBuf>,
    /// Python 3 for SixDB.
    pub python3: PathBuf,
    /// SixDesk installation.
    pub sixdesk_directory: PathBuf,
    /// Host to run SixDesk commands on.
    pub ssh: Option<String>,
    /// Remove lock files.
    pub unlock: bool,
    /// Patch the `mad6t` scripts.
    pub apply_mad6t_hacks: bool,
    /// Stop before workspace initialization.
    pub stop_workspace_init: bool,
    /// Resubmit failed jobs.
    pub resubmit: bool,
    /// Step for DA-vs-turns.
    pub da_turnstep: u32,
    /// Last stage to run.
    pub max_stage: Option<String>,
    /// `max_materialize` for SixTrack jobs.
    pub max_materialize: Option<u32>,
    /// Command run by the post-processing stage.
    pub post_process: Option<String>,
}

impl AutoSixOptions {
    /// Creates options with defaults for everything but the required input.
    #[must_use]
    pub fn new(
        mask: impl Into<PathBuf>,
        working_directory: impl Into<PathBuf>,
        replace_dict: serde_json::Value,
    ) -> Self {
        Self {
            mask: mask.into(),
            working_directory: working_directory.into(),
            replace_dict,
            jobid_mask: None,
            executable: "madx".into(),
            python2: None,
            python3: PathBuf::from("python3"),
            sixdesk_directory: PathBuf::from(SIXDESK_UTILS),
            ssh: None,
            unlock: false,
            apply_mad6t_hacks: false,
            stop_workspace_init: false,
            resubmit: false,
            da_turnstep: 100,
            max_stage: None,
            max_materialize: None,
            post_process: None,
        }
    }
}

/// Validates the options into the campaign environment and parameter space.
///
/// # Errors
///
/// Returns an error if the mask cannot be read, uses unknown variables or
/// stray `%` signs, required SixDesk keys are missing, or any setting is
/// invalid.
pub fn check_opts(opts: &AutoSixOptions) -> Result<(AutoSixEnvironment, ParameterSpace)> {
    let mask_text = fs::read_to_string(&opts.mask)?;
    let space = ParameterSpace::from_json_value(&opts.replace_dict)?;
    let names = space.names();

    let missing: Vec<String> = mask::find_named_variables(&mask_text)
        .into_iter()
        .filter(|k| !names.contains(k))
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::new(format!(
            "The following keys in the mask were not found for replacement: {}",
            missing.join(", ")
        ))
        .with_keys(missing)
        .into());
    }
    mask::check_percentage_signs(&mask_text.replace(SEED_PLACEHOLDER, ""))?;

    space.validate()?;
    if let Some(template) = &opts.jobid_mask {
        check_template(template, &names)?;
    }

    let missing = sixdeskenv::missing_required(names.iter().map(String::as_str));
    if !missing.is_empty() {
        return Err(ConfigError::new(format!(
            "The following keys are required but missing: {}",
            missing.join(", ")
        ))
        .with_keys(missing)
        .into());
    }

    let env = AutoSixEnvironment::builder(mask_text, &opts.working_directory)
        .executable(&opts.executable)
        .python2(opts.python2.clone())
        .python3(&opts.python3)
        .sixdesk_directory(&opts.sixdesk_directory)
        .ssh(opts.ssh.clone())
        .unlock(opts.unlock)
        .apply_mad6t_hacks(opts.apply_mad6t_hacks)
        .stop_workspace_init(opts.stop_workspace_init)
        .resubmit(opts.resubmit)
        .da_turnstep(opts.da_turnstep)
        .max_stage(opts.max_stage.clone())
        .max_materialize(opts.max_materialize)
        .post_process(opts.post_process.clone())
        .build()?;
    Ok((env, space))
}

/// Generates the jobs of the campaign and writes them to `Jobs.json`.
///
/// # Errors
///
/// Returns an error for an invalid parameter space or job name template,
/// duplicate job names, or if the manifest cannot be written.
pub fn generate_jobs(basedir: &Path, jobid_mask: Option<&str>, space: &ParameterSpace) -> Result<Manifest> {
    debug!("Creating Jobs");
    let names = space.names();
    let rows = space.grid()?;
    let ids = assign_job_ids(jobid_mask, &names, &rows, 0)?;

    let mut manifest = Manifest::new(names.clone())
        .with_header(HEADER_BASEDIR, basedir.display().to_string());
    for (id, row) in ids.into_iter().zip(&rows) {
        let mut record = JobRecord::new(id, row.to_values(&names), basedir);
        record.job_directory = WorkspacePaths::new(record.job_id.to_string(), basedir).workspace();
        manifest.push(record)?;
    }
    manifest.write(basedir)?;
    Ok(manifest)
}

/// Runs all stages for a single job.
///
/// Lock files are reported first (and removed with `unlock`); a locked
/// workspace is still attempted.
///
/// # Errors
///
/// Returns an error if lock files or the stage log cannot be accessed.
pub fn run_job(record: &JobRecord, env: &AutoSixEnvironment, pipeline: &StagePipeline) -> Result<JobReport> {
    let jobname = record.job_id.to_string();
    let paths = WorkspacePaths::new(&jobname, &env.working_directory);
    if is_locked(&paths, &env.sixdesk_directory, env.unlock)? {
        info!("{jobname} is locked. Try 'unlock' flag if this causes errors.");
    }

    let ctx = JobContext::new(
        record.job_id.clone(),
        record.values.clone(),
        &env.working_directory,
    );
    pipeline.run_all_stages(&ctx, &StageLog::new(paths.stagefile()))
}

/// Runs every job of the campaign one after another.
///
/// A job whose stage log cannot be accessed is logged and the campaign
/// continues with the next job.
pub fn run_campaign(manifest: &Manifest, env: &AutoSixEnvironment, pipeline: &StagePipeline) -> Vec<JobReport> {
    manifest
        .records()
        .iter()
        .filter_map(|record| match run_job(record, env, pipeline) {
            Ok(report) => Some(report),
            Err(e) => {
                error!(job = %record.job_id, "Job aborted: {e}");
                None
            }
        })
        .collect()
}

/// Validates the options, creates the jobs and drives each through the
/// stages.
///
/// # Errors
///
/// Returns configuration errors and errors writing the config snapshot or
/// the manifest. Errors of single jobs do not abort the run.
pub fn autosix(opts: &AutoSixOptions, runner: Arc<dyn CommandRunner>) -> Result<Vec<JobReport>> {
    info!("Starting autosix.");
    let (env, space) = check_opts(opts)?;
    save_config(&opts.working_directory, opts, "autosix")?;

    let manifest = generate_jobs(&opts.working_directory, opts.jobid_mask.as_deref(), &space)?;
    let env = Arc::new(env);
    let pipeline = build_pipeline(&env, &runner)?;
    Ok(run_campaign(&manifest, &env, &pipeline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobId, ParamValue, StageOutcome, StageRunStatus};
    use crate::pipeline::PipelineBuilder;
    use crate::stages::FnStage;
    use crate::submit::command::MockCommandRunner;
    use crate::testing::assert_stage_log;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const MASK: &str = "qx = %(QX)s;\nseed = %SEEDRAN;\n";

    fn options(dir: &Path) -> AutoSixOptions {
        let mask = dir.join("job.mask");
        fs::write(&mask, MASK).unwrap();
        let mut opts = AutoSixOptions::new(
            mask,
            dir.join("study"),
            json!({
                "QX": [62.31, 62.32],
                "TURNS": 100000,
                "AMPMIN": 2,
                "AMPMAX": 20,
                "AMPSTEP": 2,
                "ANGLES": 5
            }),
        );
        opts.jobid_mask = Some("qx%(QX)s".into());
        opts.sixdesk_directory = dir.join("sixdesk");
        opts
    }

    #[test]
    fn test_check_opts_missing_mask_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.replace_dict = json!({"TURNS": 1, "AMPMIN": 2, "AMPMAX": 4, "AMPSTEP": 2, "ANGLES": 5});
        assert!(check_opts(&opts).unwrap_err().is_config());
    }

    #[test]
    fn test_check_opts_missing_sixdesk_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.replace_dict = json!({"QX": 62.31, "TURNS": 1});
        let err = check_opts(&opts).unwrap_err();
        assert!(err.to_string().contains("AMPMIN"));
    }

    #[test]
    fn test_check_opts_accepts_seed_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let (env, space) = check_opts(&options(dir.path())).unwrap();
        assert_eq!(env.mask_text, MASK);
        assert_eq!(space.job_count(), 2);
    }

    #[test]
    fn test_invalid_grid_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.replace_dict["QX"] = json!([]);
        let err = autosix(&opts, Arc::new(MockCommandRunner::new())).unwrap_err();
        assert!(err.is_config());
        assert!(!opts.working_directory.exists());

        let mut opts = options(dir.path());
        opts.jobid_mask = Some("qx%(QY)s".into());
        let err = autosix(&opts, Arc::new(MockCommandRunner::new())).unwrap_err();
        assert!(err.to_string().contains("QY"));
        assert!(!opts.working_directory.exists());
    }

    fn campaign(dir: &Path, jobs: u64) -> (Manifest, AutoSixEnvironment, StagePipeline) {
        let mut manifest = Manifest::new(vec!["A".to_string()]);
        for i in 0..jobs {
            let values = std::collections::BTreeMap::from([("A".to_string(), ParamValue::Int(i as i64))]);
            manifest.push(JobRecord::new(JobId::Index(i), values, dir)).unwrap();
        }
        let env = AutoSixEnvironment::builder("mask", dir).build().unwrap();
        let pipeline = PipelineBuilder::new()
            .stage(FnStage::new("a", |ctx: &JobContext| {
                if ctx.job_id == JobId::Index(1) {
                    anyhow::bail!("boom");
                }
                Ok(StageOutcome::Completed)
            }))
            .stage(FnStage::new("b", |_: &JobContext| Ok(StageOutcome::Completed)))
            .build()
            .unwrap();
        (manifest, env, pipeline)
    }

    #[test]
    fn test_campaign_continues_after_failing_job() {
        let dir = tempfile::tempdir().unwrap();
        let (manifest, env, pipeline) = campaign(dir.path(), 3);
        for i in 0..3 {
            fs::create_dir_all(WorkspacePaths::new(i.to_string(), dir.path()).autosix_output()).unwrap();
        }

        let reports = run_campaign(&manifest, &env, &pipeline);
        assert_eq!(reports.len(), 3);
        assert_eq!(
            reports[1].status("a"),
            Some(&StageRunStatus::Skipped(Some("Stage a failed: boom".to_string())))
        );
        assert_eq!(reports[1].recorded(), Vec::<&str>::new());
        assert_eq!(reports[2].recorded(), vec!["a", "b"]);
    }

    #[test]
    fn test_campaign_skips_job_without_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let (manifest, env, pipeline) = campaign(dir.path(), 3);
        fs::create_dir_all(WorkspacePaths::new("2", dir.path()).autosix_output()).unwrap();

        // job 0 cannot record its stage, job 1 never gets to record one
        let reports = run_campaign(&manifest, &env, &pipeline);
        let ids: Vec<_> = reports.iter().map(|r| r.job_id.clone()).collect();
        assert_eq!(ids, vec![JobId::Index(1), JobId::Index(2)]);
        assert_eq!(reports[1].recorded(), vec!["a", "b"]);
    }

    #[test]
    fn test_generate_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let (_, space) = check_opts(&options(dir.path())).unwrap();
        let basedir = dir.path().join("study");
        fs::create_dir_all(&basedir).unwrap();

        let manifest = generate_jobs(&basedir, Some("qx%(QX)s"), &space).unwrap();
        assert_eq!(manifest.ids(), vec![JobId::from("qx62.31"), JobId::from("qx62.32")]);
        assert_eq!(
            manifest.headers.get(HEADER_BASEDIR).map(String::as_str),
            Some(basedir.display().to_string().as_str())
        );
        assert_eq!(manifest.records()[0].job_directory, basedir.join("workspace-qx62.31"));
        assert_eq!(Manifest::read(&basedir).unwrap(), manifest);
    }

    #[test]
    fn test_first_run_stops_after_mask_submission() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path());
        let mut runner = MockCommandRunner::new();
        // set_env.sh -N, set_env.sh -s and mad6t.sh -s per job
        runner.expect_run().times(6).returning(|_| Ok(()));

        let reports = autosix(&opts, Arc::new(runner)).unwrap();
        assert_eq!(reports.len(), 2);
        for report in &reports {
            assert!(report.stopped());
            assert_eq!(report.status("submit_mask"), Some(&StageRunStatus::Stopped));
            let paths = WorkspacePaths::new(report.job_id.to_string(), &opts.working_directory);
            assert_stage_log(
                &StageLog::new(paths.stagefile()),
                &["create_job", "initialize_workspace", "submit_mask"],
            );
            let mask = fs::read_to_string(paths.mask_file()).unwrap();
            assert!(mask.contains("seed = %SEEDRAN;"));
            assert!(paths.sixdeskenv().is_file());
            assert!(paths.sysenv().is_file());
        }
    }

    #[test]
    fn test_second_run_continues_to_next_stop() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path());
        let mut first = MockCommandRunner::new();
        first.expect_run().times(6).returning(|_| Ok(()));
        autosix(&opts, Arc::new(first)).unwrap();

        let mut second = MockCommandRunner::new();
        // mad6t.sh -c and run_six.sh -a per job
        second.expect_run().times(4).returning(|_| Ok(()));
        let reports = autosix(&opts, Arc::new(second)).unwrap();
        for report in &reports {
            assert_eq!(report.status("check_input"), Some(&StageRunStatus::Completed));
            assert_eq!(report.status("submit_sixtrack"), Some(&StageRunStatus::Stopped));
        }
    }
}
