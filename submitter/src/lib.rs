//! # LHC Submitter
//!
//! Parametric job submission for MAD-X / SixTrack campaigns on HTCondor.
//!
//! The crate provides:
//!
//! - **Parameter sweeps**: the Cartesian product of named parameter values,
//!   with stable job ids and append/resume against earlier runs
//! - **Job submission**: mask filling, per-job folders and shell wrappers,
//!   HTCondor submit files or a local worker pool
//! - **AutoSix**: SixDesk studies driven through a resumable stage pipeline
//!   whose progress survives between invocations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lhc_submitter::prelude::*;
//!
//! let opts = SubmitOptions::new("job.madx", "study", serde_json::json!({"SEED": [1, 2, 3]}));
//! let created = submit(&opts, &Backends::default()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod autosix;
pub mod core;
pub mod errors;
pub mod grid;
pub mod manifest;
pub mod mask;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod submit;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::autosix::{autosix, AutoSixEnvironment, AutoSixOptions};
    pub use crate::core::{JobId, ParamValue, StageOutcome, StageRunStatus};
    pub use crate::errors::{CommandError, ConfigError, Result, StateError, SubmitterError};
    pub use crate::grid::{GridRow, ParameterSpace};
    pub use crate::manifest::{JobRecord, Manifest};
    pub use crate::pipeline::{JobReport, PipelineBuilder, StageLog, StagePipeline};
    pub use crate::stages::{FnStage, JobContext, Stage};
    pub use crate::submit::{submit, Backends, SubmitOptions};
}
