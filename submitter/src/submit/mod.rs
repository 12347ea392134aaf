//! Parametric job submission.
//!
//! A mask (file or inline string) is filled for every point of a parameter
//! grid; each job gets its own folder with a shell wrapper, and the jobs are
//! either run locally or submitted to HTCondor in one submit file.

pub mod command;
mod creation;
pub mod htcondor;
pub mod local;

pub use command::{CommandRunner, CommandSpec, SystemCommandRunner};
pub use creation::{create_folders, create_jobs, write_bash, CreatedJobs};
pub use local::{run_local, JobExecutor, ShellExecutor};

use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::{ConfigError, Result};
use crate::grid::{check_template, ParameterSpace};
use crate::manifest::{print_stats, JobRecord};
use crate::mask;
use crate::utils::{save_config, uri::validate_destination};
use htcondor::{HtcArguments, JOBFLAVOURS};

/// Default name of the directory jobs write their output to.
pub const DEFAULT_OUTPUT_DIR: &str = "Outputdata";

/// The job template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskSource {
    /// A mask file, filled into a job script per job.
    File(PathBuf),
    /// A command line template, filled into the shell wrapper directly.
    Inline(String),
}

/// User input of a submission, before validation.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOptions {
    /// Mask file path or inline mask.
    pub mask: String,
    /// Directory the job folders are created in.
    pub working_directory: PathBuf,
    /// Parameter name to value(s), as JSON object.
    pub replace_dict: serde_json::Value,
    /// Executable alias or path.
    pub executable: String,
    /// HTCondor job flavour.
    pub jobflavour: String,
    /// Run the jobs locally instead of on HTCondor.
    pub run_local: bool,
    /// Only run jobs that did not finish.
    pub resume_jobs: bool,
    /// Add jobs to an existing study.
    pub append_jobs: bool,
    /// Prepare everything but do not run or submit.
    pub dryrun: bool,
    /// Additional script arguments, `{"--flag": value}`.
    pub script_arguments: serde_json::Map<String, serde_json::Value>,
    /// Extension of the generated job scripts.
    pub script_extension: Option<String>,
    /// Number of parallel local jobs.
    pub num_processes: usize,
    /// Glob patterns a finished job's output must match.
    pub check_files: Vec<String>,
    /// Template for job ids.
    pub jobid_mask: Option<String>,
    /// Output directory name inside the job directory.
    pub job_output_dir: String,
    /// Directory or EOS URI to copy outputs to.
    pub output_destination: Option<String>,
    /// Additional submit file arguments.
    pub htc_arguments: HtcArguments,
    /// Host to submit from.
    pub ssh: Option<String>,
}

impl SubmitOptions {
    /// Creates options with defaults for everything but the required input.
    #[must_use]
    pub fn new(
        mask: impl Into<String>,
        working_directory: impl Into<PathBuf>,
        replace_dict: serde_json::Value,
    ) -> Self {
        Self {
            mask: mask.into(),
            working_directory: working_directory.into(),
            replace_dict,
            executable: "madx".into(),
            jobflavour: "workday".into(),
            run_local: false,
            resume_jobs: false,
            append_jobs: false,
            dryrun: false,
            script_arguments: serde_json::Map::new(),
            script_extension: None,
            num_processes: 4,
            check_files: Vec::new(),
            jobid_mask: None,
            job_output_dir: DEFAULT_OUTPUT_DIR.into(),
            output_destination: None,
            htc_arguments: HtcArguments::new(),
            ssh: None,
        }
    }
}

/// Options for creating jobs.
#[derive(Debug, Clone)]
pub struct CreationOpts {
    /// Directory the job folders are created in.
    pub working_directory: PathBuf,
    /// The job template.
    pub mask: MaskSource,
    /// Template for job ids.
    pub jobid_mask: Option<String>,
    /// The parameter space to sweep.
    pub replace_dict: ParameterSpace,
    /// Output directory name inside the job directory.
    pub output_dir: String,
    /// Directory or EOS URI to copy outputs to.
    pub output_destination: Option<String>,
    /// Add jobs to an existing study.
    pub append_jobs: bool,
    /// Only run jobs that did not finish.
    pub resume_jobs: bool,
    /// Executable alias or path.
    pub executable: String,
    /// Glob patterns a finished job's output must match.
    pub check_files: Vec<String>,
    /// Additional script arguments in order.
    pub script_arguments: Vec<(String, String)>,
    /// Extension of the generated job scripts.
    pub script_extension: Option<String>,
}

impl CreationOpts {
    /// Returns true if finished jobs are removed from the run set.
    #[must_use]
    pub fn should_drop_jobs(&self) -> bool {
        self.append_jobs || self.resume_jobs
    }
}

/// Options for running the jobs.
#[derive(Debug, Clone)]
pub struct RunnerOpts {
    /// Directory the submit file is written to.
    pub working_directory: PathBuf,
    /// HTCondor job flavour.
    pub jobflavour: String,
    /// Files HTCondor transfers back (`""` disables the transfer).
    pub output_dir: Option<String>,
    /// Host to submit from.
    pub ssh: Option<String>,
    /// Prepare everything but do not run or submit.
    pub dryrun: bool,
    /// Additional submit file arguments.
    pub htc_arguments: HtcArguments,
    /// Run the jobs locally instead of on HTCondor.
    pub run_local: bool,
    /// Number of parallel local jobs.
    pub num_processes: usize,
}

/// The process backends used to run jobs.
#[derive(Clone)]
pub struct Backends {
    /// Runs external commands such as `condor_submit`.
    pub commands: Arc<dyn CommandRunner>,
    /// Runs single jobs locally.
    pub executor: Arc<dyn JobExecutor>,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            commands: Arc::new(SystemCommandRunner),
            executor: Arc::new(ShellExecutor),
        }
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

fn json_to_arg(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Checks the options and sorts them into creation and runner options.
///
/// Replace-dict keys the mask does not use are dropped, so they do not
/// multiply the number of jobs.
///
/// # Errors
///
/// Returns a configuration error for invalid or contradicting options; a
/// mask file that cannot be read is an I/O error.
pub fn check_opts(opts: &SubmitOptions) -> Result<(CreationOpts, RunnerOpts)> {
    debug!("Checking options.");
    if opts.resume_jobs && opts.append_jobs {
        return Err(ConfigError::new("Select either Resume jobs or Append jobs")
            .with_keys(["resume_jobs", "append_jobs"])
            .into());
    }
    if !JOBFLAVOURS.contains(&opts.jobflavour.as_str()) {
        return Err(ConfigError::new(format!(
            "jobflavour needs to be one of '{}' but instead was '{}'",
            JOBFLAVOURS.join("', '"),
            opts.jobflavour
        ))
        .with_keys(["jobflavour"])
        .into());
    }

    let (mask, mask_content) = if mask::is_mask_file(&opts.mask) {
        let path = PathBuf::from(&opts.mask);
        let content = fs::read_to_string(&path)?;
        (MaskSource::File(path), content)
    } else {
        (MaskSource::Inline(opts.mask.clone()), opts.mask.clone())
    };

    if let Some(dest) = &opts.output_destination {
        validate_destination(dest)?;
    }

    let mut space = ParameterSpace::from_json_value(&opts.replace_dict)?;
    let names = space.names();
    let unused = mask::check_mask_keys(&mask_content, names.iter().map(String::as_str))?;
    for key in &unused {
        space.remove(key);
    }
    if space.is_empty() {
        return Err(ConfigError::new("Empty replace-dictionary")
            .with_keys(["replace_dict"])
            .into());
    }
    space.validate()?;
    if let Some(template) = &opts.jobid_mask {
        check_template(template, &space.names())?;
    }
    mask::check_percentage_signs(&mask_content)?;
    debug!("Input parameters: {}", serde_json::to_string(opts)?);

    let creation = CreationOpts {
        working_directory: opts.working_directory.clone(),
        mask,
        jobid_mask: opts.jobid_mask.clone(),
        replace_dict: space,
        output_dir: opts.job_output_dir.clone(),
        output_destination: opts.output_destination.clone(),
        append_jobs: opts.append_jobs,
        resume_jobs: opts.resume_jobs,
        executable: opts.executable.clone(),
        check_files: opts.check_files.clone(),
        script_arguments: opts
            .script_arguments
            .iter()
            .map(|(k, v)| (k.clone(), json_to_arg(v)))
            .collect(),
        script_extension: opts.script_extension.clone(),
    };
    let runner = RunnerOpts {
        working_directory: opts.working_directory.clone(),
        jobflavour: opts.jobflavour.clone(),
        // an empty string stops HTCondor from transferring files
        output_dir: Some(if opts.output_destination.is_some() {
            "\"\"".to_string()
        } else {
            opts.job_output_dir.clone()
        }),
        ssh: opts.ssh.clone(),
        dryrun: opts.dryrun,
        htc_arguments: opts.htc_arguments.clone(),
        run_local: opts.run_local,
        num_processes: opts.num_processes,
    };
    Ok((creation, runner))
}

/// Runs the jobs locally or submits them to HTCondor.
///
/// # Errors
///
/// Returns an error if local jobs fail, the submit file cannot be created or
/// the submission fails.
pub async fn run_jobs(records: &[JobRecord], opts: &RunnerOpts, backends: &Backends) -> Result<()> {
    if opts.run_local {
        if opts.dryrun {
            info!("Dry-run: Skipping local run.");
            return Ok(());
        }
        return run_local(records, opts.num_processes, Arc::clone(&backends.executor)).await;
    }
    run_htc(records, opts, backends.commands.as_ref())
}

/// Creates the submit file and submits the jobs to HTCondor.
///
/// # Errors
///
/// Returns an error if the submit file cannot be created or the submission
/// fails.
pub fn run_htc(records: &[JobRecord], opts: &RunnerOpts, runner: &dyn CommandRunner) -> Result<()> {
    info!(
        "Submitting {} jobs on htcondor, flavour '{}'.",
        records.len(),
        opts.jobflavour
    );
    htcondor::check_job_limit(records.len())?;

    let mut arguments = opts.htc_arguments.clone();
    arguments.insert("duration".into(), opts.jobflavour.clone().into());
    if let Some(output_dir) = &opts.output_dir {
        arguments.insert("output_dir".into(), output_dir.clone().into());
    }
    debug!("Creating htcondor subfile.");
    let subfile = htcondor::make_subfile(&opts.working_directory, records, &arguments)?;

    if opts.dryrun {
        info!("Dry run: submission file created, but not submitting jobs to htcondor.");
        return Ok(());
    }
    debug!("Submitting jobs to htcondor.");
    htcondor::submit_jobfile(runner, &subfile, opts.ssh.as_deref())
}

/// Validates the options, creates all jobs and runs or submits them.
///
/// # Errors
///
/// Returns the first configuration, state, I/O or execution error.
pub async fn submit(opts: &SubmitOptions, backends: &Backends) -> Result<CreatedJobs> {
    if opts.run_local {
        info!("Starting Job-submitter.");
    } else {
        info!("Starting HTCondor Job-submitter.");
    }
    let (creation, runner) = check_opts(opts)?;
    save_config(&opts.working_directory, opts, "job_submitter")?;

    let created = create_jobs(&creation)?;
    run_jobs(&created.to_run, &runner, backends).await?;

    let to_run: Vec<_> = created.to_run.iter().map(|r| r.job_id.clone()).collect();
    print_stats(&to_run, &created.finished);
    Ok(created)
}
