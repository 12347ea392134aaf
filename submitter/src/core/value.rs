//! Scalar parameter values.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ConfigError;

/// A single candidate value of a sweep parameter.
///
/// Values keep their type through the manifest round-trip, so `1` and `"1"`
/// stay different jobs. Integers and floats compare numerically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    Str(String),
}

impl ParamValue {
    /// Returns the value as float, if numeric.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Str(_) => None,
        }
    }

    /// Returns the value as integer, if it is one (or an integral float).
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            #[allow(clippy::cast_possible_truncation)]
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    /// Returns the string content, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Converts a JSON scalar into a value.
    ///
    /// # Errors
    ///
    /// Returns an error for `null`, arrays and objects.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ConfigError> {
        match value {
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .ok_or_else(|| ConfigError::new(format!("Unsupported number '{n}'"))),
            serde_json::Value::String(s) => Ok(Self::Str(s.clone())),
            serde_json::Value::Bool(b) => Ok(Self::Str(if *b { "True" } else { "False" }.into())),
            other => Err(ConfigError::new(format!(
                "Parameter values need to be numbers or strings, got '{other}'"
            ))),
        }
    }
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(_), _) | (_, Self::Str(_)) => false,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

/// Shortest round-tripping form, exponent notation below `1e-4` and from
/// `1e16` on (`1e-05`, `1.5e+20`), integral values keep a trailing `.0`.
fn format_float(v: f64) -> String {
    if !v.is_finite() {
        return v.to_string().to_lowercase();
    }
    let scientific = format!("{v:e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if v != 0.0 && !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.abs());
    }
    if v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => f.write_str(&format_float(*v)),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}
