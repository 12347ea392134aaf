//! The fixed, ranked order of stages.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use crate::errors::ConfigError;

/// A named stage with its position in the order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageDefinition {
    name: String,
    rank: usize,
}

impl StageDefinition {
    /// Name of the stage.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the stage in the order.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }
}

impl PartialOrd for StageDefinition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StageDefinition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank.cmp(&other.rank)
    }
}

impl fmt::Display for StageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Ordered list of uniquely named stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOrder {
    stages: Vec<StageDefinition>,
}

impl StageOrder {
    /// Creates the order from stage names; ranks follow the given order.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty or a name appears twice.
    pub fn new<I, S>(names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut stages = Vec::new();
        for (rank, name) in names.into_iter().enumerate() {
            let name = name.into();
            if !seen.insert(name.clone()) {
                return Err(ConfigError::new(format!("Stage '{name}' is defined twice"))
                    .with_keys([name]));
            }
            stages.push(StageDefinition { name, rank });
        }
        if stages.is_empty() {
            return Err(ConfigError::new("A stage order needs at least one stage"));
        }
        Ok(Self { stages })
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// The stage directly before the given one.
    #[must_use]
    pub fn previous(&self, stage: &StageDefinition) -> Option<&StageDefinition> {
        stage.rank.checked_sub(1).and_then(|r| self.stages.get(r))
    }

    /// Resolves an optional maximum stage name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not part of the order.
    pub fn resolve(&self, name: Option<&str>) -> Result<Option<StageDefinition>, ConfigError> {
        name.map(|n| {
            self.get(n).cloned().ok_or_else(|| {
                ConfigError::new(format!("Unknown stage '{n}'"))
                    .with_keys(["max_stage"])
                    .with_fix_hint(format!("Use one of: {}", self.names().join(", ")))
            })
        })
        .transpose()
    }

    /// Stage names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Iterates the stages in order.
    pub fn iter(&self) -> impl Iterator<Item = &StageDefinition> {
        self.stages.iter()
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false; an order has at least one stage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
