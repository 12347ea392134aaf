//! Pipeline builder with validation.

use super::{StageOrder, StagePipeline};
use crate::errors::ConfigError;
use crate::stages::Stage;

/// Builder for creating validated stage pipelines.
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    /// Stage bodies in execution order.
    stages: Vec<Box<dyn Stage>>,
    /// Name of the last stage allowed to run.
    max_stage: Option<String>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage; its rank is its position.
    #[must_use]
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Appends an already boxed stage.
    #[must_use]
    pub fn boxed_stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Sets the last stage that may run in this invocation.
    #[must_use]
    pub fn max_stage(mut self, name: Option<impl Into<String>>) -> Self {
        self.max_stage = name.map(Into::into);
        self
    }

    /// Validates names and the maximum stage and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no stages, a name is duplicated or the
    /// maximum stage is unknown.
    pub fn build(self) -> Result<StagePipeline, ConfigError> {
        let order = StageOrder::new(self.stages.iter().map(|s| s.name().to_string()))?;
        let max_stage = order.resolve(self.max_stage.as_deref())?;
        Ok(StagePipeline::new(order, self.stages, max_stage))
    }
}
