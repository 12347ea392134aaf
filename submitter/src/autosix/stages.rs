//! The ten autosix stages.
//!
//! Each stage is one step a user would otherwise run by hand inside the
//! workspace, e.g. `set_env.sh -N workspace-<job>` for `create_job` or
//! `run_six.sh -a` for `submit_sixtrack`. Submitting stages stop the pipeline
//! since the scheduler has to finish before the next stage makes sense.

use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::environment::AutoSixEnvironment;
use super::paths::WorkspacePaths;
use super::{sixdesk, workspace};
use crate::core::StageOutcome;
use crate::errors::ConfigError;
use crate::pipeline::{PipelineBuilder, StagePipeline};
use crate::stages::{JobContext, Stage};
use crate::submit::command::CommandRunner;

/// Stage names in execution order.
pub const STAGE_NAMES: [&str; 10] = [
    "create_job",
    "initialize_workspace",
    "submit_mask",
    "check_input",
    "submit_sixtrack",
    "check_sixtrack_output",
    "sixdb_load",
    "sixdb_cmd",
    "post_process",
    "final",
];

/// Which step an [`AutoSixStage`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoSixStageKind {
    /// Create the workspace, write `sixdeskenv`, `sysenv` and the mask.
    CreateJob,
    /// `set_env.sh -s`, optionally patch `mad6t`.
    InitializeWorkspace,
    /// `mad6t.sh -s`, then stop.
    SubmitMask,
    /// `mad6t.sh -c`, resubmit with `-w`.
    CheckInput,
    /// `run_six.sh -a`, then stop.
    SubmitSixtrack,
    /// `run_status`, resubmit with `run_six.sh -i`.
    CheckSixtrackOutput,
    /// `sixdb . load_dir`.
    SixdbLoad,
    /// `sixdb <job> da`.
    SixdbCmd,
    /// The user's post-processing command.
    PostProcess,
    /// Report and skip, so it never gets recorded.
    Final,
}

impl AutoSixStageKind {
    /// All stages in execution order.
    pub const ALL: [Self; 10] = [
        Self::CreateJob,
        Self::InitializeWorkspace,
        Self::SubmitMask,
        Self::CheckInput,
        Self::SubmitSixtrack,
        Self::CheckSixtrackOutput,
        Self::SixdbLoad,
        Self::SixdbCmd,
        Self::PostProcess,
        Self::Final,
    ];

    /// The stage name used in the stage log.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::CreateJob => STAGE_NAMES[0],
            Self::InitializeWorkspace => STAGE_NAMES[1],
            Self::SubmitMask => STAGE_NAMES[2],
            Self::CheckInput => STAGE_NAMES[3],
            Self::SubmitSixtrack => STAGE_NAMES[4],
            Self::CheckSixtrackOutput => STAGE_NAMES[5],
            Self::SixdbLoad => STAGE_NAMES[6],
            Self::SixdbCmd => STAGE_NAMES[7],
            Self::PostProcess => STAGE_NAMES[8],
            Self::Final => STAGE_NAMES[9],
        }
    }
}

impl fmt::Display for AutoSixStageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A SixDesk step as pipeline stage.
pub struct AutoSixStage {
    kind: AutoSixStageKind,
    env: Arc<AutoSixEnvironment>,
    runner: Arc<dyn CommandRunner>,
}

impl AutoSixStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(
        kind: AutoSixStageKind,
        env: Arc<AutoSixEnvironment>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self { kind, env, runner }
    }

    /// The step performed.
    #[must_use]
    pub fn kind(&self) -> AutoSixStageKind {
        self.kind
    }
}

impl fmt::Debug for AutoSixStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoSixStage")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Stage for AutoSixStage {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn run(&self, ctx: &JobContext) -> anyhow::Result<StageOutcome> {
        let paths = WorkspacePaths::new(ctx.job_name(), &ctx.base_directory);
        let env = self.env.as_ref();
        let runner = self.runner.as_ref();

        let outcome = match self.kind {
            AutoSixStageKind::CreateJob => {
                workspace::create_job(&paths, &ctx.values, env, runner)?;
                StageOutcome::Completed
            }
            AutoSixStageKind::InitializeWorkspace => {
                if env.stop_workspace_init {
                    info!(
                        "Workspace creation for job {} interrupted. Check directory to manually \
                         adapt ``sixdeskenv`` and ``sysenv``. Remove 'stop_workspace_init' from \
                         input parameters or set to 'False' to continue run.",
                        paths.jobname()
                    );
                    return Ok(StageOutcome::skip_silently());
                }
                workspace::init_workspace(&paths, env, runner)?;
                if env.apply_mad6t_hacks {
                    workspace::fix_pythonfile_call(&paths)?;
                    workspace::remove_twiss_fail_check(&paths)?;
                }
                StageOutcome::Completed
            }
            AutoSixStageKind::SubmitMask => {
                sixdesk::submit_mask(&paths, env, runner)?;
                StageOutcome::Stop
            }
            AutoSixStageKind::CheckInput => sixdesk::check_sixtrack_input(&paths, env, runner)?,
            AutoSixStageKind::SubmitSixtrack => {
                // shared template, so set right before submitting
                workspace::set_max_materialize(&env.sixdesk_directory, env.max_materialize)?;
                match sixdesk::submit_sixtrack(&paths, env, runner, false) {
                    StageOutcome::Completed => StageOutcome::Stop,
                    skipped => skipped,
                }
            }
            AutoSixStageKind::CheckSixtrackOutput => {
                sixdesk::check_sixtrack_output(&paths, env, runner)
            }
            AutoSixStageKind::SixdbLoad => sixdesk::sixdb_load(&paths, env, runner),
            AutoSixStageKind::SixdbCmd => sixdesk::sixdb_cmd(&paths, env, runner, &["da"]),
            AutoSixStageKind::PostProcess => sixdesk::post_process(&paths, env, runner),
            AutoSixStageKind::Final => {
                info!(
                    "All stages run. Check stagefile {} in case you want to rerun some stages.",
                    paths.stagefile().display()
                );
                StageOutcome::skip_silently()
            }
        };
        Ok(outcome)
    }
}

/// Builds the autosix pipeline with all ten stages.
///
/// # Errors
///
/// Returns an error if the environment's maximum stage is unknown.
pub fn build_pipeline(
    env: &Arc<AutoSixEnvironment>,
    runner: &Arc<dyn CommandRunner>,
) -> Result<StagePipeline, ConfigError> {
    AutoSixStageKind::ALL
        .into_iter()
        .fold(PipelineBuilder::new(), |builder, kind| {
            builder.stage(AutoSixStage::new(kind, Arc::clone(env), Arc::clone(runner)))
        })
        .max_stage(env.max_stage.clone())
        .build()
}
