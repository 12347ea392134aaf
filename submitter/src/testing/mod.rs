//! Testing utilities for stage pipelines.
//!
//! This module provides:
//! - Scripted, failing and panicking stages
//! - Job fixtures with a stage log
//! - Assertions on job reports and stage logs

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_stage_log, assert_stage_status};
pub use fixtures::TestJob;
pub use mocks::{FailingStage, PanickingStage, ScriptedStage};
