//! Core domain model types.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Parameter values and job ids
//! - Stage states and outcomes

mod job_id;
mod output;
mod status;
mod value;

pub use job_id::JobId;
pub use output::StageOutcome;
pub use status::{BlockReason, StageRunStatus, StageState};
pub use value::ParamValue;
