//! The value a stage body hands back to the pipeline.

use serde::{Deserialize, Serialize};

/// Control signal returned by a stage body.
///
/// Unexpected faults are not represented here; bodies return them as
/// `Err(anyhow::Error)` and the engine converts them into a skip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// The stage finished; record it and continue.
    #[default]
    Completed,
    /// The stage did not finish; do not record it, continue with the next.
    Skip(Option<String>),
    /// The stage finished, but the pipeline must halt (e.g. jobs submitted).
    Stop,
}

impl StageOutcome {
    /// Creates a skip with a message.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(Some(reason.into()))
    }

    /// Creates a silent skip.
    #[must_use]
    pub fn skip_silently() -> Self {
        Self::Skip(None)
    }

    /// Returns true if the stage should be appended to the stage log.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Stop)
    }

    /// Returns the skip message, if any.
    #[must_use]
    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            Self::Skip(Some(reason)) => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_success() {
        assert!(StageOutcome::Completed.is_success());
        assert!(StageOutcome::Stop.is_success());
        assert!(!StageOutcome::skip("nope").is_success());
    }

    #[test]
    fn test_skip_reason() {
        assert_eq!(StageOutcome::skip("waiting").skip_reason(), Some("waiting"));
        assert_eq!(StageOutcome::skip_silently().skip_reason(), None);
        assert_eq!(StageOutcome::Completed.skip_reason(), None);
    }

    #[test]
    fn test_default_is_completed() {
        assert_eq!(StageOutcome::default(), StageOutcome::Completed);
    }

    #[test]
    fn test_outcome_serialize() {
        let json = serde_json::to_string(&StageOutcome::Stop).unwrap();
        assert_eq!(json, r#""stop""#);
    }
}
