//! Stage trait and implementations.
//!
//! Stages are the units of work the auto-sequencing pipeline drives each
//! job through. A stage body is synchronous; it returns a [`StageOutcome`]
//! for control flow and an error for anything unexpected.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::PathBuf;

use crate::core::{JobId, ParamValue, StageOutcome};

/// Per-job input handed to every stage body.
#[derive(Debug, Clone, PartialEq)]
pub struct JobContext {
    /// The job's id.
    pub job_id: JobId,
    /// The job's parameter values.
    pub values: BTreeMap<String, ParamValue>,
    /// Base directory the job's workspace lives in.
    pub base_directory: PathBuf,
}

impl JobContext {
    /// Creates a new context.
    #[must_use]
    pub fn new(
        job_id: JobId,
        values: BTreeMap<String, ParamValue>,
        base_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            job_id,
            values,
            base_directory: base_directory.into(),
        }
    }

    /// Name of the job as used for workspace paths.
    #[must_use]
    pub fn job_name(&self) -> String {
        self.job_id.to_string()
    }
}

/// Trait for pipeline stages.
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage for one job.
    ///
    /// # Errors
    ///
    /// Any error is treated by the engine like a skip.
    fn run(&self, ctx: &JobContext) -> anyhow::Result<StageOutcome>;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&JobContext) -> anyhow::Result<StageOutcome> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&JobContext) -> anyhow::Result<StageOutcome> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&JobContext) -> anyhow::Result<StageOutcome> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

impl<F> Stage for FnStage<F>
where
    F: Fn(&JobContext) -> anyhow::Result<StageOutcome> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &JobContext) -> anyhow::Result<StageOutcome> {
        (self.func)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_stage() {
        let stage = FnStage::new("noop", |ctx: &JobContext| {
            Ok(StageOutcome::skip(format!("nothing for {}", ctx.job_name())))
        });
        let ctx = JobContext::new(JobId::Index(2), BTreeMap::new(), "/work");
        assert_eq!(stage.name(), "noop");
        assert_eq!(
            stage.run(&ctx).unwrap(),
            StageOutcome::skip("nothing for 2")
        );
    }
}
