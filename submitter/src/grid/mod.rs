//! Parameter space and Cartesian grid generation.
//!
//! A [`ParameterSpace`] keeps its parameters in insertion order. The grid
//! varies the first parameter slowest and the last one fastest.

mod identity;

pub use identity::{assign_job_ids, check_template};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::ParamValue;
use crate::errors::ConfigError;

/// One combination of parameter values, in parameter order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRow(pub Vec<ParamValue>);

impl GridRow {
    /// Pairs the row's values with the parameter names.
    #[must_use]
    pub fn to_values(&self, names: &[String]) -> BTreeMap<String, ParamValue> {
        names.iter().cloned().zip(self.0.iter().cloned()).collect()
    }

    /// Values of the row.
    #[must_use]
    pub fn values(&self) -> &[ParamValue] {
        &self.0
    }
}

/// Ordered mapping of parameter names to their candidate values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSpace {
    parameters: Vec<(String, Vec<ParamValue>)>,
}

impl ParameterSpace {
    /// Creates an empty parameter space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a parameter.
    #[must_use]
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<ParamValue>>,
    ) -> Self {
        let name = name.into();
        let values: Vec<ParamValue> = values.into_iter().map(Into::into).collect();
        match self.parameters.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = values,
            None => self.parameters.push((name, values)),
        }
        self
    }

    /// Parses a JSON object of `name -> value | [values]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a JSON object or contains
    /// unsupported values.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(input).map_err(|e| {
            ConfigError::new(format!("Could not parse parameter space: {e}"))
                .with_fix_hint("Provide a JSON object, e.g. '{\"SEED\": [1, 2, 3]}'")
        })?;
        Self::from_json_value(&value)
    }

    /// Builds the parameter space from a parsed JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an object or contains
    /// unsupported values.
    pub fn from_json_value(value: &serde_json::Value) -> Result<Self, ConfigError> {
        let object = value
            .as_object()
            .ok_or_else(|| ConfigError::new("Parameter space must be a JSON object"))?;

        let mut space = Self::new();
        for (name, entry) in object {
            let values = match entry {
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(ParamValue::from_json)
                    .collect::<Result<Vec<_>, _>>(),
                scalar => ParamValue::from_json(scalar).map(|v| vec![v]),
            }
            .map_err(|e| ConfigError::new(format!("Parameter '{name}': {e}")).with_keys([name.as_str()]))?;
            space.parameters.push((name.clone(), values));
        }
        Ok(space)
    }

    /// Parameter names in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Candidate values of a parameter.
    #[must_use]
    pub fn values(&self, name: &str) -> Option<&[ParamValue]> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Removes a parameter, returning its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<ParamValue>> {
        let idx = self.parameters.iter().position(|(n, _)| n == name)?;
        Some(self.parameters.remove(idx).1)
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Number of rows the grid will have.
    #[must_use]
    pub fn job_count(&self) -> usize {
        if self.parameters.is_empty() {
            return 0;
        }
        self.parameters.iter().map(|(_, v)| v.len()).product()
    }

    /// Checks that the grid can be generated without building it.
    ///
    /// # Errors
    ///
    /// Returns an error if the space is empty or a parameter has no values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parameters.is_empty() {
            return Err(ConfigError::new("Parameter space is empty")
                .with_fix_hint("Provide at least one parameter with values"));
        }
        let empty: Vec<&str> = self
            .parameters
            .iter()
            .filter(|(_, v)| v.is_empty())
            .map(|(n, _)| n.as_str())
            .collect();
        if !empty.is_empty() {
            return Err(ConfigError::new(format!(
                "No values given for parameter(s): {}",
                empty.join(", ")
            ))
            .with_keys(empty));
        }
        Ok(())
    }

    /// Generates the full Cartesian product.
    ///
    /// # Errors
    ///
    /// Returns an error if the space is empty or a parameter has no values.
    pub fn grid(&self) -> Result<Vec<GridRow>, ConfigError> {
        self.validate()?;
        let mut rows: Vec<Vec<ParamValue>> = vec![Vec::with_capacity(self.len())];
        for (_, values) in &self.parameters {
            rows = rows
                .into_iter()
                .flat_map(|prefix| {
                    values.iter().map(move |v| {
                        let mut row = prefix.clone();
                        row.push(v.clone());
                        row
                    })
                })
                .collect();
        }
        Ok(rows.into_iter().map(GridRow).collect())
    }
}
