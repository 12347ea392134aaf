//! Resumable, strictly sequential stage execution.
//!
//! Whether a stage runs is decided from the job's [`StageLog`] alone, so an
//! interrupted campaign picks up where it left off on the next invocation.

use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info};

use super::{StageDefinition, StageLog, StageOrder};
use crate::core::{BlockReason, JobId, StageOutcome, StageRunStatus, StageState};
use crate::errors::{ConfigError, Result};
use crate::observability::StageTimer;
use crate::stages::{JobContext, Stage};

/// Ranked stage bodies plus the optional maximum stage.
#[derive(Debug)]
pub struct StagePipeline {
    order: StageOrder,
    bodies: Vec<Box<dyn Stage>>,
    max_stage: Option<StageDefinition>,
}

/// Outcome of one stage within a job report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    /// Stage name.
    pub stage: String,
    /// What happened.
    pub status: StageRunStatus,
}

/// Per-job summary of a `run_all_stages` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    /// The job.
    pub job_id: JobId,
    /// One entry per visited stage, in order.
    pub stages: Vec<StageReport>,
}

impl JobReport {
    /// Status of the given stage, if it was visited.
    #[must_use]
    pub fn status(&self, stage: &str) -> Option<&StageRunStatus> {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| &r.status)
    }

    /// Returns true if a stage halted the pipeline.
    #[must_use]
    pub fn stopped(&self) -> bool {
        self.stages
            .iter()
            .any(|r| matches!(r.status, StageRunStatus::Stopped))
    }

    /// Stages recorded during this run.
    #[must_use]
    pub fn recorded(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|r| r.status.is_recorded())
            .map(|r| r.stage.as_str())
            .collect()
    }
}

impl StagePipeline {
    pub(super) fn new(
        order: StageOrder,
        bodies: Vec<Box<dyn Stage>>,
        max_stage: Option<StageDefinition>,
    ) -> Self {
        Self {
            order,
            bodies,
            max_stage,
        }
    }

    /// The stage order.
    #[must_use]
    pub fn order(&self) -> &StageOrder {
        &self.order
    }

    /// The last stage allowed to run.
    #[must_use]
    pub fn max_stage(&self) -> Option<&StageDefinition> {
        self.max_stage.as_ref()
    }

    fn definition(&self, name: &str) -> Result<&StageDefinition> {
        self.order
            .get(name)
            .ok_or_else(|| ConfigError::new(format!("Unknown stage '{name}'")).into())
    }

    fn state_from_entries(&self, stage: &StageDefinition, entries: &[String]) -> StageState {
        if entries.iter().any(|e| e == stage.name()) {
            return StageState::Completed;
        }
        if stage.rank() == 0 {
            return StageState::NotAttempted;
        }
        if self.max_stage.as_ref().is_some_and(|max| stage > max) {
            return StageState::Blocked(BlockReason::AfterMaxStage);
        }
        let previous = self.order.previous(stage).map(StageDefinition::name);
        if entries.last().map(String::as_str) == previous {
            StageState::NotAttempted
        } else {
            StageState::Blocked(BlockReason::PreviousMissing)
        }
    }

    /// Determines the state of a stage for a job.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is unknown or the log cannot be read.
    pub fn stage_state(&self, stage: &str, log: &StageLog) -> Result<StageState> {
        let stage = self.definition(stage)?;
        Ok(self.state_from_entries(stage, &log.entries()?))
    }

    /// Returns true if the stage would run now; logs why not otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is unknown or the log cannot be read.
    pub fn should_run_stage(&self, stage: &str, log: &StageLog) -> Result<bool> {
        let state = self.stage_state(stage, log)?;
        if state.is_runnable() {
            return Ok(true);
        }
        match state {
            StageState::NotAttempted => {}
            StageState::Completed => info!("Stage '{stage}' has already been run. Skipping."),
            StageState::Blocked(BlockReason::AfterMaxStage) => info!(
                "Stage '{stage}' would run after requested maximum stage '{}'. Skipping.",
                self.max_stage.as_ref().map_or("", StageDefinition::name)
            ),
            StageState::Blocked(BlockReason::PreviousMissing) => {
                info!("Stage '{stage}' not run because previous stage(s) missing.");
            }
        }
        Ok(false)
    }

    /// Runs a single stage for a job if it is runnable.
    ///
    /// Errors and panics inside the stage body are logged and turned into a
    /// skip; only stage log failures are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is unknown or the log cannot be read or
    /// appended to.
    pub fn run_stage(&self, stage: &str, ctx: &JobContext, log: &StageLog) -> Result<StageRunStatus> {
        let definition = self.definition(stage)?;
        if !self.should_run_stage(stage, log)? {
            return Ok(StageRunStatus::NotRun(self.stage_state(stage, log)?));
        }
        let body = self
            .bodies
            .get(definition.rank())
            .ok_or_else(|| ConfigError::new(format!("No body for stage '{stage}'")))?;

        let timer = StageTimer::start(stage);
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| body.run(ctx))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(job = %ctx.job_id, stage = %stage, "{e:?}");
                StageOutcome::skip(format!("Stage {stage} failed: {e:#}"))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(job = %ctx.job_id, stage = %stage, "Stage panicked: {message}");
                StageOutcome::skip(format!("Stage {stage} failed: {message}"))
            }
        };
        timer.finish(match &outcome {
            StageOutcome::Completed => "completed",
            StageOutcome::Skip(_) => "skipped",
            StageOutcome::Stop => "stopped",
        });

        if outcome.is_success() {
            log.append(stage)?;
        }
        if let Some(reason) = outcome.skip_reason() {
            error!(job = %ctx.job_id, stage = %stage, "{reason}");
        }
        Ok(match outcome {
            StageOutcome::Completed => StageRunStatus::Completed,
            StageOutcome::Stop => StageRunStatus::Stopped,
            StageOutcome::Skip(reason) => StageRunStatus::Skipped(reason),
        })
    }

    /// Runs all stages of a job in order.
    ///
    /// A skipped stage does not end the loop, so the remaining stages log
    /// why they are blocked. A stopping stage ends it.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage log cannot be read or appended to.
    pub fn run_all_stages(&self, ctx: &JobContext, log: &StageLog) -> Result<JobReport> {
        let job = &ctx.job_id;
        info!("vv---------------- Job {job} -------------------vv");
        let mut report = JobReport {
            job_id: job.clone(),
            stages: Vec::with_capacity(self.order.len()),
        };
        for stage in self.order.iter() {
            let status = self.run_stage(stage.name(), ctx, log)?;
            let stop = matches!(status, StageRunStatus::Stopped);
            report.stages.push(StageReport {
                stage: stage.name().to_string(),
                status,
            });
            if stop {
                info!(
                    "Stopping after Stage '{stage}' as the submitted jobs will now run. \
                     Check `condor_q` for their progress and restart when they are done."
                );
                break;
            }
        }
        info!("^^---------------- Job {job} -------------------^^");
        Ok(report)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineBuilder;
    use crate::stages::FnStage;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn pipeline(max_stage: Option<&str>) -> StagePipeline {
        let mut builder = PipelineBuilder::new();
        for name in ["a", "b", "c"] {
            builder = builder.stage(FnStage::new(name, |_: &JobContext| Ok(StageOutcome::Completed)));
        }
        builder.max_stage(max_stage).build().unwrap()
    }

    fn log_with(entries: &[&str]) -> (tempfile::TempDir, StageLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = StageLog::new(dir.path().join("stages_completed.txt"));
        for e in entries {
            log.append(e).unwrap();
        }
        (dir, log)
    }

    #[test]
    fn test_first_stage_runs_on_empty_log() {
        let (_dir, log) = log_with(&[]);
        let p = pipeline(None);
        assert_eq!(p.stage_state("a", &log).unwrap(), StageState::NotAttempted);
        assert_eq!(
            p.stage_state("b", &log).unwrap(),
            StageState::Blocked(BlockReason::PreviousMissing)
        );
    }

    #[test]
    fn test_completed_and_next() {
        let (_dir, log) = log_with(&["a"]);
        let p = pipeline(None);
        assert_eq!(p.stage_state("a", &log).unwrap(), StageState::Completed);
        assert!(p.should_run_stage("b", &log).unwrap());
        assert!(!p.should_run_stage("c", &log).unwrap());
    }

    #[test]
    fn test_max_stage_blocks() {
        let (_dir, log) = log_with(&["a"]);
        let p = pipeline(Some("a"));
        assert_eq!(
            p.stage_state("b", &log).unwrap(),
            StageState::Blocked(BlockReason::AfterMaxStage)
        );
    }

    #[test]
    fn test_unknown_stage() {
        let (_dir, log) = log_with(&[]);
        assert!(pipeline(None).stage_state("z", &log).is_err());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }

    #[test]
    fn test_report_helpers() {
        let (_dir, log) = log_with(&[]);
        let ctx = JobContext::new(JobId::Index(0), BTreeMap::new(), "/tmp");
        let report = pipeline(None).run_all_stages(&ctx, &log).unwrap();
        assert_eq!(report.recorded(), vec!["a", "b", "c"]);
        assert!(!report.stopped());
        assert_eq!(report.status("b"), Some(&StageRunStatus::Completed));
    }
}
