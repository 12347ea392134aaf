//! Pipeline building and execution.
//!
//! This module provides:
//! - The ranked stage order
//! - The per-job stage log
//! - Pipeline builder with validation
//! - The resumable sequential engine

mod builder;
mod engine;
mod order;
mod stagelog;


pub use builder::PipelineBuilder;
pub use engine::{JobReport, StagePipeline, StageReport};
pub use order::{StageDefinition, StageOrder};
pub use stagelog::StageLog;
