//! Mask (template) handling.
//!
//! Masks use named `%(NAME)s` placeholders. This module finds the
//! placeholders a mask references, validates stray percent signs, fills
//! masks per job and writes the filled job scripts.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, error, warn};

use crate::core::ParamValue;
use crate::errors::{ConfigError, Result};
use crate::manifest::Manifest;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r"%\((\w+)\)").unwrap())
}

fn substitution_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r"%\((\w+)\)([-0]*)(\d+)?(?:\.(\d+))?([sdifFeEr])").unwrap())
}

/// Executable aliases and their default binaries.
pub const EXECUTABLE_PATHS: [(&str, &str); 3] = [
    ("madx", "/afs/cern.ch/user/m/mad/bin/madx"),
    ("python3", "/afs/cern.ch/eng/sl/lintrack/omc_python3/bin/python"),
    ("python2", "/afs/cern.ch/eng/sl/lintrack/miniconda2/bin/python"),
];

/// Script extensions inferred from executable aliases.
pub const SCRIPT_EXTENSIONS: [(&str, &str); 3] =
    [("madx", ".madx"), ("python3", ".py"), ("python2", ".py")];

/// Resolves an executable alias to its binary path (or returns it unchanged).
#[must_use]
pub fn resolve_executable(executable: &str) -> &str {
    EXECUTABLE_PATHS
        .iter()
        .find(|(alias, _)| *alias == executable)
        .map_or(executable, |(_, path)| path)
}

/// Extension for generated job scripts: explicit value, executable alias,
/// or the mask file's own extension.
#[must_use]
pub fn script_extension(explicit: Option<&str>, executable: &str, mask: &Path) -> String {
    if let Some(ext) = explicit {
        return ext.to_string();
    }
    SCRIPT_EXTENSIONS
        .iter()
        .find(|(alias, _)| *alias == executable)
        .map(|(_, ext)| (*ext).to_string())
        .unwrap_or_else(|| {
            mask.extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default()
        })
}

/// Returns true if the given string points to an existing file.
#[must_use]
pub fn is_mask_file(mask: &str) -> bool {
    Path::new(mask).is_file()
}

/// Finds all placeholder names in the mask.
#[must_use]
pub fn find_named_variables(mask: &str) -> BTreeSet<String> {
    placeholder_regex()
        .captures_iter(mask)
        .map(|c| c[1].to_string())
        .collect()
}

/// Checks for `%` signs that are not part of a placeholder.
///
/// # Errors
///
/// Returns a configuration error with the number of stray signs; their
/// positions are logged per line.
pub fn check_percentage_signs(mask: &str) -> Result<(), ConfigError> {
    let cleaned = placeholder_regex().replace_all(mask, "");
    let n_signs = cleaned.matches('%').count();
    if n_signs == 0 {
        return Ok(());
    }

    for (idx, line) in cleaned.split('\n').enumerate() {
        if line.contains('%') {
            let positions: Vec<String> = line
                .char_indices()
                .filter(|(_, c)| *c == '%')
                .map(|(i, _)| i.to_string())
                .collect();
            error!("Problematic '%' sign(s) in line {idx}, pos {}.", positions.join(", "));
        }
    }
    Err(ConfigError::new(format!(
        "{n_signs} problematic '%' signs found in template. Please remove."
    )))
}

/// Compares mask placeholders against the replace keys.
///
/// Returns the keys that are not used by the mask (a warning is logged for
/// them); the caller decides whether to drop them.
///
/// # Errors
///
/// Returns an error naming every placeholder without replacement value.
pub fn check_mask_keys<'a>(
    mask: &str,
    replace_keys: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<String>, ConfigError> {
    let dict_keys: BTreeSet<String> = replace_keys.into_iter().map(str::to_string).collect();
    let mask_keys = find_named_variables(mask);

    let not_in_dict: Vec<&String> = mask_keys.difference(&dict_keys).collect();
    if !not_in_dict.is_empty() {
        return Err(ConfigError::new(format!(
            "The following keys in the mask were not found in the given replace_dict: {}",
            join_keys(&not_in_dict)
        ))
        .with_keys(not_in_dict.iter().map(|k| k.as_str())));
    }

    let not_in_mask: Vec<String> = dict_keys.difference(&mask_keys).cloned().collect();
    if !not_in_mask.is_empty() {
        warn!(
            "The following replace_dict keys were not found in the given mask: {}",
            not_in_mask.join(", ")
        );
    }
    Ok(not_in_mask)
}

fn join_keys(keys: &[&String]) -> String {
    keys.iter().map(|k| format!("'{k}'")).collect::<Vec<_>>().join(", ")
}

/// Fills all placeholders of the mask.
///
/// Supported conversions are `s`, `r`, `d`, `i`, `f`, `F`, `e` and `E`,
/// with optional `-`/`0` flags, width and precision.
///
/// # Errors
///
/// Returns an error if a placeholder has no value or a value does not fit
/// its conversion.
pub fn fill(mask: &str, values: &BTreeMap<String, ParamValue>) -> Result<String, ConfigError> {
    let re = substitution_regex();
    let mut out = String::with_capacity(mask.len());
    let mut last = 0;

    for caps in re.captures_iter(mask) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        out.push_str(&mask[last..whole.start]);
        last = whole.end;

        let name = &caps[1];
        let value = values.get(name).ok_or_else(|| {
            ConfigError::new(format!("No value given for placeholder '{name}'"))
                .with_keys([name])
        })?;
        let flags = caps.get(2).map_or("", |m| m.as_str());
        let width = caps.get(3).and_then(|m| m.as_str().parse::<usize>().ok());
        let precision = caps.get(4).and_then(|m| m.as_str().parse::<usize>().ok());
        let conversion = &caps[5];

        let rendered = convert(name, value, conversion, precision)?;
        out.push_str(&pad(&rendered, flags, width));
    }
    out.push_str(&mask[last..]);
    Ok(out)
}

fn convert(
    name: &str,
    value: &ParamValue,
    conversion: &str,
    precision: Option<usize>,
) -> Result<String, ConfigError> {
    let numeric = || {
        value.as_f64().ok_or_else(|| {
            ConfigError::new(format!(
                "Placeholder '{name}' needs a number for '%{conversion}', got '{value}'"
            ))
        })
    };
    let rendered = match conversion {
        "s" => value.to_string(),
        "r" => match value {
            ParamValue::Str(s) => format!("'{s}'"),
            other => other.to_string(),
        },
        "d" | "i" => match value.as_i64() {
            Some(v) => v.to_string(),
            #[allow(clippy::cast_possible_truncation)]
            None => (numeric()?.trunc() as i64).to_string(),
        },
        "f" | "F" => format!("{:.*}", precision.unwrap_or(6), numeric()?),
        "e" | "E" => {
            let s = python_exponent(numeric()?, precision.unwrap_or(6));
            if conversion == "E" {
                s.to_uppercase()
            } else {
                s
            }
        }
        other => {
            return Err(ConfigError::new(format!(
                "Unsupported conversion '%{other}' for placeholder '{name}'"
            )))
        }
    };
    Ok(rendered)
}

// Rust prints `1e3`, printf-style formatting wants `1.000000e+03`.
fn python_exponent(v: f64, precision: usize) -> String {
    let s = format!("{v:.precision$e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => s,
    }
}

fn pad(s: &str, flags: &str, width: Option<usize>) -> String {
    let Some(width) = width else {
        return s.to_string();
    };
    if s.len() >= width {
        return s.to_string();
    }
    if flags.contains('-') {
        format!("{s:<width$}")
    } else if flags.contains('0') {
        match s.strip_prefix('-') {
            Some(rest) => format!("-{rest:0>w$}", w = width - 1),
            None => format!("{s:0>width$}"),
        }
    } else {
        format!("{s:>width$}")
    }
}

/// Writes the filled mask into every job directory of the manifest.
///
/// The script is named like the mask file with the given extension, and the
/// name is recorded as the job file of each record.
///
/// # Errors
///
/// Returns an error if the mask cannot be read, a value is missing, or a
/// script cannot be written.
pub fn write_job_scripts(manifest: &mut Manifest, mask_path: &Path, extension: &str) -> Result<()> {
    let template = std::fs::read_to_string(mask_path)?;
    let stem = mask_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "job".to_string());
    let filename = format!("{stem}{extension}");

    for record in manifest.records_mut() {
        let filled = fill(&template, &record.values)?;
        let script = record.job_directory.join(&filename);
        std::fs::write(&script, filled)?;
        debug!(job = %record.job_id, "Wrote job script '{}'.", script.display());
        record.job_file = Some(filename.clone());
    }
    Ok(())
}
