//! Stage state and outcome enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable state of a job × stage pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Not in the stage log and runnable.
    NotAttempted,
    /// Recorded in the stage log.
    Completed,
    /// Not runnable in this invocation.
    Blocked(BlockReason),
}

/// Why a stage is not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// The previous stage is not the latest stage log entry.
    PreviousMissing,
    /// The stage lies after the configured maximum stage.
    AfterMaxStage,
}

impl StageState {
    /// Returns true if the stage would be executed.
    #[must_use]
    pub fn is_runnable(&self) -> bool {
        matches!(self, Self::NotAttempted)
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAttempted => write!(f, "not_attempted"),
            Self::Completed => write!(f, "completed"),
            Self::Blocked(reason) => write!(f, "blocked ({reason})"),
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreviousMissing => write!(f, "previous stage missing"),
            Self::AfterMaxStage => write!(f, "after maximum stage"),
        }
    }
}

/// What a single `run` of a stage amounted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRunStatus {
    /// The stage was not executed (already done or blocked).
    NotRun(StageState),
    /// Body returned normally, recorded in the stage log.
    Completed,
    /// Body signalled skip (or failed), not recorded.
    Skipped(Option<String>),
    /// Body succeeded and asked the pipeline to halt.
    Stopped,
}

impl StageRunStatus {
    /// Returns true if the stage was appended to the stage log.
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped)
    }
}

impl fmt::Display for StageRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRun(state) => write!(f, "not run: {state}"),
            Self::Completed => write!(f, "completed"),
            Self::Skipped(_) => write!(f, "skipped"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_state_display() {
        assert_eq!(StageState::Completed.to_string(), "completed");
        assert_eq!(
            StageState::Blocked(BlockReason::AfterMaxStage).to_string(),
            "blocked (after maximum stage)"
        );
    }

    #[test]
    fn test_is_runnable() {
        assert!(StageState::NotAttempted.is_runnable());
        assert!(!StageState::Completed.is_runnable());
        assert!(!StageState::Blocked(BlockReason::PreviousMissing).is_runnable());
    }

    #[test]
    fn test_run_status_recorded() {
        assert!(StageRunStatus::Completed.is_recorded());
        assert!(StageRunStatus::Stopped.is_recorded());
        assert!(!StageRunStatus::Skipped(None).is_recorded());
        assert!(!StageRunStatus::NotRun(StageState::Completed).is_recorded());
    }

    #[test]
    fn test_stage_state_serialize() {
        let json = serde_json::to_string(&StageState::NotAttempted).unwrap();
        assert_eq!(json, r#""not_attempted""#);
    }
}
