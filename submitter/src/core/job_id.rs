//! Job identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a job within a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobId {
    /// Contiguous integer id.
    Index(u64),
    /// Id rendered from a naming template.
    Name(String),
}

impl JobId {
    /// Name of the job directory, e.g. `Job.3`.
    #[must_use]
    pub fn directory_name(&self) -> String {
        format!("{}.{self}", crate::manifest::JOBDIRECTORY_PREFIX)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Name(n) => f.write_str(n),
        }
    }
}

impl From<u64> for JobId {
    fn from(v: u64) -> Self {
        Self::Index(v)
    }
}

impl From<&str> for JobId {
    fn from(v: &str) -> Self {
        Self::Name(v.to_string())
    }
}
