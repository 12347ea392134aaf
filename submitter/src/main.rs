//! lhc-submitter CLI
//!
//! Usage:
//!   lhc-submitter submit --mask job.madx --working-directory study --replace-dict '{"SEED": [1, 2]}'
//!   lhc-submitter autosix --mask study.mask --working-directory study --replace-dict '{...}'

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use lhc_submitter::autosix::{self, AutoSixOptions, SIXDESK_UTILS};
use lhc_submitter::submit::{self, htcondor::HtcArguments, Backends, SubmitOptions, SystemCommandRunner};

#[derive(Parser, Debug)]
#[command(name = "lhc-submitter", version, about = "Parametric MAD-X / SixTrack job submission")]
struct Cli {
    /// Log filter, e.g. `debug` (`RUST_LOG` takes precedence).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Write logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create jobs from a mask and run them locally or on HTCondor.
    Submit(SubmitArgs),
    /// Run SixDesk studies through the autosix stages.
    Autosix(AutoSixArgs),
}

fn parse_json_object(input: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
    match serde_json::from_str(input).context("Not valid JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("Expected a JSON object, e.g. '{{\"SEED\": [1, 2, 3]}}'"),
    }
}

#[derive(Args, Debug)]
struct SubmitArgs {
    /// Program mask file, or the command line template itself.
    #[arg(long)]
    mask: String,
    /// Directory where the job folders are created.
    #[arg(long)]
    working_directory: PathBuf,
    /// Parameters to sweep as JSON object, name to value or list of values.
    #[arg(long, value_parser = parse_json_object)]
    replace_dict: serde_json::Map<String, serde_json::Value>,
    /// Executable alias (`madx`, `python3`, `python2`) or path.
    #[arg(long, default_value = "madx")]
    executable: String,
    /// HTCondor job flavour.
    #[arg(long, default_value = "workday")]
    jobflavour: String,
    /// Run the jobs on this machine.
    #[arg(long)]
    run_local: bool,
    /// Only run jobs that have not finished.
    #[arg(long)]
    resume_jobs: bool,
    /// Add new jobs to an existing study.
    #[arg(long)]
    append_jobs: bool,
    /// Create everything but do not run or submit.
    #[arg(long)]
    dryrun: bool,
    /// Additional script arguments as JSON object.
    #[arg(long, value_parser = parse_json_object)]
    script_arguments: Option<serde_json::Map<String, serde_json::Value>>,
    /// Extension of the job scripts, e.g. `.madx`.
    #[arg(long)]
    script_extension: Option<String>,
    /// Number of parallel local jobs.
    #[arg(long, default_value_t = 4)]
    num_processes: usize,
    /// Glob patterns every finished job's output has to match.
    #[arg(long, num_args = 1..)]
    check_files: Vec<String>,
    /// Template for job names, e.g. `seed%(SEED)s`.
    #[arg(long)]
    jobid_mask: Option<String>,
    /// Output directory inside each job folder.
    #[arg(long, default_value = submit::DEFAULT_OUTPUT_DIR)]
    job_output_dir: String,
    /// Directory or EOS URI the output is copied to.
    #[arg(long)]
    output_destination: Option<String>,
    /// Additional HTCondor arguments as JSON object.
    #[arg(long, value_parser = parse_json_object)]
    htc_arguments: Option<HtcArguments>,
    /// Submit from this host via ssh.
    #[arg(long)]
    ssh: Option<String>,
}

impl From<SubmitArgs> for SubmitOptions {
    fn from(args: SubmitArgs) -> Self {
        let mut opts = Self::new(
            args.mask,
            args.working_directory,
            serde_json::Value::Object(args.replace_dict),
        );
        opts.executable = args.executable;
        opts.jobflavour = args.jobflavour;
        opts.run_local = args.run_local;
        opts.resume_jobs = args.resume_jobs;
        opts.append_jobs = args.append_jobs;
        opts.dryrun = args.dryrun;
        opts.script_arguments = args.script_arguments.unwrap_or_default();
        opts.script_extension = args.script_extension;
        opts.num_processes = args.num_processes;
        opts.check_files = args.check_files;
        opts.jobid_mask = args.jobid_mask;
        opts.job_output_dir = args.job_output_dir;
        opts.output_destination = args.output_destination;
        opts.htc_arguments = args.htc_arguments.unwrap_or_default();
        opts.ssh = args.ssh;
        opts
    }
}

#[derive(Args, Debug)]
struct AutoSixArgs {
    /// Program mask file.
    #[arg(long)]
    mask: PathBuf,
    /// Directory where the workspaces are created.
    #[arg(long)]
    working_directory: PathBuf,
    /// Mask and SixDesk variables as JSON object. Required are TURNS,
    /// AMPMIN, AMPMAX, AMPSTEP and ANGLES.
    #[arg(long, value_parser = parse_json_object)]
    replace_dict: serde_json::Map<String, serde_json::Value>,
    /// Template for job names.
    #[arg(long)]
    jobid_mask: Option<String>,
    /// MAD-X binary.
    #[arg(long, default_value = "madx")]
    executable: String,
    /// Python 2 for `run_six.sh` (its directory is used).
    #[arg(long)]
    python2: Option<PathBuf>,
    /// Python 3 for SixDB.
    #[arg(long, default_value = "python3")]
    python3: PathBuf,
    /// SixDesk installation.
    #[arg(long, default_value = SIXDESK_UTILS)]
    sixdesk_directory: PathBuf,
    /// Run SixDesk commands on this host via ssh.
    #[arg(long)]
    ssh: Option<String>,
    /// Remove lock files.
    #[arg(long)]
    unlock: bool,
    /// Patch the MAD-X call and remove the "TWISS fail" check in `mad6t`.
    #[arg(long)]
    apply_mad6t_hacks: bool,
    /// Stop before workspace initialization for manual changes.
    #[arg(long)]
    stop_workspace_init: bool,
    /// Resubmit failed jobs.
    #[arg(long)]
    resubmit: bool,
    /// Step between turns for DA-vs-turns, passed as `$2` to `--post-process`.
    #[arg(long, default_value_t = 100)]
    da_turnstep: u32,
    /// Last stage to run.
    #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(autosix::STAGE_NAMES))]
    max_stage: Option<String>,
    /// `max_materialize` of the SixTrack submit template, 0 removes it.
    #[arg(long)]
    max_materialize: Option<u32>,
    /// Command run with `sh -c` in `autosix_output` by the post-processing
    /// stage; `$1` is the job name, `$2` the DA turn step.
    #[arg(long)]
    post_process: Option<String>,
}

impl From<AutoSixArgs> for AutoSixOptions {
    fn from(args: AutoSixArgs) -> Self {
        let mut opts = Self::new(
            args.mask,
            args.working_directory,
            serde_json::Value::Object(args.replace_dict),
        );
        opts.jobid_mask = args.jobid_mask;
        opts.executable = args.executable;
        opts.python2 = args.python2;
        opts.python3 = args.python3;
        opts.sixdesk_directory = args.sixdesk_directory;
        opts.ssh = args.ssh;
        opts.unlock = args.unlock;
        opts.apply_mad6t_hacks = args.apply_mad6t_hacks;
        opts.stop_workspace_init = args.stop_workspace_init;
        opts.resubmit = args.resubmit;
        opts.da_turnstep = args.da_turnstep;
        opts.max_stage = args.max_stage;
        opts.max_materialize = args.max_materialize;
        opts.post_process = args.post_process;
        opts
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    lhc_submitter::observability::init_logging(&cli.log_level, cli.log_json)?;

    match cli.command {
        Commands::Submit(args) => {
            let opts = SubmitOptions::from(args);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start the tokio runtime")?;
            runtime.block_on(submit::submit(&opts, &Backends::default()))?;
        }
        Commands::Autosix(args) => {
            let opts = AutoSixOptions::from(args);
            let reports = autosix::autosix(&opts, Arc::new(SystemCommandRunner))?;
            info!("Finished autosix for {} jobs.", reports.len());
        }
    }
    Ok(())
}
