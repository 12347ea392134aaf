//! Mock stages for testing.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::core::StageOutcome;
use crate::stages::{JobContext, Stage};

/// A stage returning pre-scripted outcomes, then `Completed`.
#[derive(Debug)]
pub struct ScriptedStage {
    name: String,
    outcomes: Mutex<VecDeque<StageOutcome>>,
    call_count: Mutex<usize>,
}

impl ScriptedStage {
    /// Creates a stage that always completes.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::scripted(name, [])
    }

    /// Creates a stage returning the given outcomes in order.
    #[must_use]
    pub fn scripted(name: impl Into<String>, outcomes: impl IntoIterator<Item = StageOutcome>) -> Self {
        Self {
            name: name.into(),
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            call_count: Mutex::new(0),
        }
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, _ctx: &JobContext) -> anyhow::Result<StageOutcome> {
        *self.call_count.lock() += 1;
        Ok(self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or(StageOutcome::Completed))
    }
}

/// A stage that always returns an error.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: String,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
        }
    }
}

impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &JobContext) -> anyhow::Result<StageOutcome> {
        Err(anyhow::anyhow!("{}", self.error).context(format!("job {}", ctx.job_id)))
    }
}

/// A stage that panics.
#[derive(Debug)]
pub struct PanickingStage {
    name: String,
}

impl PanickingStage {
    /// Creates a new panicking stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Stage for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    #[allow(clippy::panic)]
    fn run(&self, _ctx: &JobContext) -> anyhow::Result<StageOutcome> {
        panic!("stage '{}' panicked", self.name)
    }
}
