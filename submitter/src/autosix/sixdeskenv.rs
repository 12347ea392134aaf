//! The SixDesk study settings (`sixdeskenv`, `sysenv`) and the study mask.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use super::paths::WorkspacePaths;
use crate::core::ParamValue;
use crate::errors::{ConfigError, Result};
use crate::mask;

/// Proton mass in GeV/c².
pub const PMASS: f64 = 0.938_272_088_16;

/// Keys that have to be given per job.
pub const SIXENV_REQUIRED: [&str; 5] = ["TURNS", "AMPMIN", "AMPMAX", "AMPSTEP", "ANGLES"];

/// Keys with defaults that can be overwritten per job.
pub const SIXENV_OPTIONAL: [&str; 11] = [
    "RESUBMISSION",
    "PLATFORM",
    "LOGLEVEL",
    "FIRSTSEED",
    "LASTSEED",
    "RUNTYPE",
    "NPAIRS",
    "EMITTANCE",
    "DIMENSIONS",
    "WRITEBINS",
    "ENERGY",
];

/// Placeholder SixDesk replaces with the seed.
pub const SEED_PLACEHOLDER: &str = "%SEEDRAN";

const SIXDESKENV_TEMPLATE: &str = r#"#!/bin/bash
# Study settings, written by autosix.
export LHCDescrip=%(JOBNAME)s
export sixdeskhome=%(BASEDIR)s/%(WORKSPACE)s/sixjobs
export basedir=%(BASEDIR)s
export scratchdir=%(SCRATCHDIR)s
export trackdir=$sixdeskhome/track
export sixtrack_input=$sixdeskhome/sixtrack_input
export platform=%(PLATFORM)s
export sixdesklevel=%(LOGLEVEL)d
export i_resubmission=%(RESUBMISSION)d
export runtype=%(RUNTYPE)s
export e0=%(ENERGY).1f
export gamma=%(GAMMA).6f
export emit_beam=%(EMITTANCE)s
export dimen=%(DIMENSIONS)d
export ista=%(FIRSTSEED)d
export iend=%(LASTSEED)d
export turnsl=%(TURNS)d
export turnsle=%(TURNSPOWER)d
export writebinl=%(WRITEBINS)d
export ns1l=%(AMPMIN)d
export ns2l=%(AMPMAX)d
export nsincl=%(AMPSTEP)d
export kinil=1
export kendl=%(ANGLES)d
export kmaxl=%(ANGLES)d
export sixdeskpairs=%(NPAIRS)d
"#;

const SYSENV_TEMPLATE: &str = r"#!/bin/bash
# Executable settings, written by autosix.
export MADX_PATH=%(MADXPATH)s
export MADX=%(MADXBIN)s
";

/// Beam energies per run type in MeV.
const ENERGIES: [(&str, f64); 2] = [("inj", 450_000.0), ("col", 7_000_000.0)];

/// Settings of one SixDesk study, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct SixDeskEnvironment {
    values: BTreeMap<String, ParamValue>,
}

fn int_value(values: &BTreeMap<String, ParamValue>, key: &str, default: Option<i64>) -> Result<i64, ConfigError> {
    match values.get(key) {
        Some(v) => v.as_i64().ok_or_else(|| {
            ConfigError::new(format!("{key} needs to be an integer, got '{v}'")).with_keys([key])
        }),
        None => default.ok_or_else(|| {
            ConfigError::new(format!("The following keys are required but missing: {key}"))
                .with_keys([key])
        }),
    }
}

fn float_value(values: &BTreeMap<String, ParamValue>, key: &str) -> Result<Option<f64>, ConfigError> {
    values
        .get(key)
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                ConfigError::new(format!("{key} needs to be a number, got '{v}'")).with_keys([key])
            })
        })
        .transpose()
}

fn string_value(values: &BTreeMap<String, ParamValue>, key: &str, default: &str) -> String {
    values.get(key).map_or_else(|| default.to_string(), ToString::to_string)
}

/// Returns the required SixDesk keys missing from `keys`.
#[must_use]
pub fn missing_required<'a>(keys: impl IntoIterator<Item = &'a str>) -> Vec<&'static str> {
    let keys: Vec<&str> = keys.into_iter().collect();
    SIXENV_REQUIRED
        .iter()
        .filter(|k| !keys.contains(k))
        .copied()
        .collect()
}

impl SixDeskEnvironment {
    /// Builds the study settings from a job's values, filling in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing, a value has the wrong
    /// type, the run type is unknown, the amplitude range is empty or not a
    /// multiple of the step, or the number of angles is even.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_job_args(
        paths: &WorkspacePaths,
        values: &BTreeMap<String, ParamValue>,
    ) -> Result<Self, ConfigError> {
        let missing = missing_required(values.keys().map(String::as_str));
        if !missing.is_empty() {
            return Err(ConfigError::new(format!(
                "The following keys are required but missing: {}",
                missing.join(", ")
            ))
            .with_keys(missing));
        }

        let turns = int_value(values, "TURNS", None)?;
        let ampmin = int_value(values, "AMPMIN", None)?;
        let ampmax = int_value(values, "AMPMAX", None)?;
        let ampstep = int_value(values, "AMPSTEP", None)?;
        let angles = int_value(values, "ANGLES", None)?;

        let runtype = string_value(values, "RUNTYPE", "col");
        let Some(default_energy) = ENERGIES
            .iter()
            .find(|(name, _)| *name == runtype)
            .map(|(_, e)| *e)
        else {
            return Err(ConfigError::new(format!(
                "RUNTYPE needs to be one of 'inj', 'col' but instead was '{runtype}'"
            ))
            .with_keys(["RUNTYPE"]));
        };
        let energy = match float_value(values, "ENERGY")? {
            Some(e) => e,
            None => {
                debug!("Energy for '{runtype}' defaults to {default_energy}");
                default_energy
            }
        };
        if energy >= 6_500_000.0 && runtype != "col" {
            warn!("Runtype is {runtype}, yet energy is set to {energy}. Are you sure?");
        }

        if turns <= 0 {
            return Err(ConfigError::new("TURNS needs to be positive.").with_keys(["TURNS"]));
        }
        if ampmax < ampmin {
            return Err(ConfigError::new("Given AMPMAX is smaller than AMPMIN.")
                .with_keys(["AMPMIN", "AMPMAX"]));
        }
        if ampstep <= 0 || (ampmax - ampmin) % ampstep != 0 {
            return Err(ConfigError::new(
                "The amplitude range needs to be divisible by the amplitude steps!",
            )
            .with_keys(["AMPMIN", "AMPMAX", "AMPSTEP"]));
        }
        if angles % 2 == 0 {
            return Err(ConfigError::new("The number of angles needs to be an uneven one.")
                .with_keys(["ANGLES"]));
        }

        let mut env: BTreeMap<String, ParamValue> = BTreeMap::new();
        let mut set = |key: &str, value: ParamValue| {
            env.insert(key.to_string(), value);
        };
        set("JOBNAME", paths.jobname().into());
        set(
            "WORKSPACE",
            format!("workspace-{}", paths.jobname()).into(),
        );
        set("BASEDIR", paths.basedir().display().to_string().into());
        set("SCRATCHDIR", paths.scratch().display().to_string().into());
        set("TURNS", turns.into());
        set("TURNSPOWER", (turns as f64).log10().into());
        set("AMPMIN", ampmin.into());
        set("AMPMAX", ampmax.into());
        set("AMPSTEP", ampstep.into());
        set("ANGLES", angles.into());
        set("RESUBMISSION", int_value(values, "RESUBMISSION", Some(0))?.into());
        set("PLATFORM", string_value(values, "PLATFORM", "HTCondor").into());
        set("LOGLEVEL", int_value(values, "LOGLEVEL", Some(0))?.into());
        set("FIRSTSEED", int_value(values, "FIRSTSEED", Some(1))?.into());
        set("LASTSEED", int_value(values, "LASTSEED", Some(60))?.into());
        set("RUNTYPE", runtype.into());
        set("NPAIRS", int_value(values, "NPAIRS", Some(30))?.into());
        set(
            "EMITTANCE",
            float_value(values, "EMITTANCE")?.unwrap_or(3.75).into(),
        );
        set("DIMENSIONS", int_value(values, "DIMENSIONS", Some(6))?.into());
        set("WRITEBINS", int_value(values, "WRITEBINS", Some(500))?.into());
        set("ENERGY", energy.into());
        set("GAMMA", (energy / 1000.0 / PMASS).into());
        Ok(Self { values: env })
    }

    /// Value of a setting.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    /// The filled `sixdeskenv` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be filled.
    pub fn render(&self) -> Result<String, ConfigError> {
        mask::fill(SIXDESKENV_TEMPLATE, &self.values)
    }
}

/// Writes `sixdeskenv` into the workspace.
///
/// # Errors
///
/// Returns an error for invalid settings or if the file cannot be written.
pub fn write_sixdeskenv(paths: &WorkspacePaths, values: &BTreeMap<String, ParamValue>) -> Result<()> {
    let env = SixDeskEnvironment::from_job_args(paths, values)?;
    write_file(&paths.sixdeskenv(), &env.render()?)?;
    debug!("sixdeskenv written.");
    Ok(())
}

/// Writes `sysenv` pointing SixDesk to the MAD-X binary.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_sysenv(paths: &WorkspacePaths, executable: &Path) -> Result<()> {
    info!("Chosen binary for mask '{}'", executable.display());
    let mut values = BTreeMap::new();
    values.insert(
        "MADXPATH".to_string(),
        ParamValue::from(
            executable
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        ),
    );
    values.insert(
        "MADXBIN".to_string(),
        ParamValue::from(
            executable
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        ),
    );
    write_file(&paths.sysenv(), &mask::fill(SYSENV_TEMPLATE, &values)?)?;
    debug!("sysenv written.");
    Ok(())
}

/// Checks that seeds are either both active and used in the mask, or both
/// disabled (`0`).
///
/// # Errors
///
/// Returns an error if only one seed is disabled or the mask has no
/// `%SEEDRAN` although seeds are set.
pub fn check_seeds(mask_text: &str, values: &BTreeMap<String, ParamValue>) -> Result<(), ConfigError> {
    let first = int_value(values, "FIRSTSEED", Some(1))?;
    let last = int_value(values, "LASTSEED", Some(60))?;
    if (first == 0) != (last == 0) {
        return Err(ConfigError::new(
            "First- or Lastseed is set, but the other one is deactivated. Set or unset both.",
        )
        .with_keys(["FIRSTSEED", "LASTSEED"]));
    }
    let seed_in_values = values
        .values()
        .any(|v| v.as_str() == Some(SEED_PLACEHOLDER));
    if first != 0 && !mask_text.contains(SEED_PLACEHOLDER) && !seed_in_values {
        return Err(ConfigError::new(format!(
            "First- and Lastseed are set, but no seed-variable '{SEED_PLACEHOLDER}' found in mask."
        ))
        .with_keys(["FIRSTSEED", "LASTSEED"]));
    }
    Ok(())
}

/// Fills the mask with the job's values and writes it to `mask/<job>.mask`.
///
/// `%SEEDRAN` stays in the output for the SixDesk seed loop.
///
/// # Errors
///
/// Returns an error for inconsistent seeds, a missing value or if the file
/// cannot be written.
pub fn write_mask(paths: &WorkspacePaths, mask_text: &str, values: &BTreeMap<String, ParamValue>) -> Result<()> {
    check_seeds(mask_text, values)?;
    let filled = mask::fill(mask_text, values)?;
    write_file(&paths.mask_file(), &filled)?;
    debug!("Mask written to '{}'.", paths.mask_file().display());
    Ok(())
}

fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn job_values(extra: &[(&str, ParamValue)]) -> BTreeMap<String, ParamValue> {
        let mut values: BTreeMap<String, ParamValue> = [
            ("TURNS", 100_000),
            ("AMPMIN", 2),
            ("AMPMAX", 20),
            ("AMPSTEP", 2),
            ("ANGLES", 5),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), ParamValue::from(v)))
        .collect();
        for (k, v) in extra {
            values.insert((*k).to_string(), v.clone());
        }
        values
    }

    #[test]
    fn test_defaults_and_derived_values() {
        let paths = WorkspacePaths::new("job", "/study");
        let env = SixDeskEnvironment::from_job_args(&paths, &job_values(&[])).unwrap();
        assert_eq!(env.get("ENERGY"), Some(&ParamValue::Float(7_000_000.0)));
        assert_eq!(env.get("FIRSTSEED"), Some(&ParamValue::Int(1)));
        assert_eq!(env.get("PLATFORM"), Some(&ParamValue::from("HTCondor")));
        assert_eq!(env.get("WORKSPACE"), Some(&ParamValue::from("workspace-job")));
        let gamma = env.get("GAMMA").and_then(ParamValue::as_f64).unwrap();
        assert!((gamma - 7_000_000.0 / 1000.0 / PMASS).abs() < 1e-9);
        let power = env.get("TURNSPOWER").and_then(ParamValue::as_f64).unwrap();
        assert!((power - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_injection_energy() {
        let paths = WorkspacePaths::new("job", "/study");
        let values = job_values(&[("RUNTYPE", ParamValue::from("inj"))]);
        let env = SixDeskEnvironment::from_job_args(&paths, &values).unwrap();
        assert_eq!(env.get("ENERGY"), Some(&ParamValue::Float(450_000.0)));
    }

    #[test]
    fn test_invalid_settings() {
        let paths = WorkspacePaths::new("job", "/study");
        for (key, value) in [
            ("ANGLES", ParamValue::from(4)),
            ("AMPSTEP", ParamValue::from(7)),
            ("AMPMAX", ParamValue::from(1)),
            ("RUNTYPE", ParamValue::from("top")),
        ] {
            let result = SixDeskEnvironment::from_job_args(&paths, &job_values(&[(key, value)]));
            assert!(result.is_err(), "{key} should be rejected");
        }
    }

    #[test]
    fn test_missing_required() {
        let paths = WorkspacePaths::new("job", "/study");
        let mut values = job_values(&[]);
        values.remove("ANGLES");
        let err = SixDeskEnvironment::from_job_args(&paths, &values).unwrap_err();
        assert_eq!(err.keys, vec!["ANGLES"]);
    }

    #[test]
    fn test_render_sixdeskenv() {
        let paths = WorkspacePaths::new("job", "/study");
        let text = SixDeskEnvironment::from_job_args(&paths, &job_values(&[]))
            .unwrap()
            .render()
            .unwrap();
        assert!(text.contains("export LHCDescrip=job\n"));
        assert!(text.contains("export turnsle=5\n"));
        assert!(text.contains("export kmaxl=5\n"));
        assert!(text.contains("export e0=7000000.0\n"));
    }

    #[test]
    fn test_write_mask_keeps_seed() {
        let dir = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::new("job", dir.path());
        let values = job_values(&[("QX", ParamValue::Float(62.31))]);
        write_mask(&paths, "qx = %(QX)s; seed = %SEEDRAN;", &values).unwrap();
        let written = fs::read_to_string(paths.mask_file()).unwrap();
        assert_eq!(written, "qx = 62.31; seed = %SEEDRAN;");
    }

    #[test]
    fn test_seed_checks() {
        let values = job_values(&[]);
        assert!(check_seeds("no seed here", &values).is_err());

        let disabled = job_values(&[("FIRSTSEED", ParamValue::Int(0)), ("LASTSEED", ParamValue::Int(0))]);
        assert!(check_seeds("no seed here", &disabled).is_ok());

        let half = job_values(&[("FIRSTSEED", ParamValue::Int(0))]);
        assert!(check_seeds("%SEEDRAN", &half).is_err());
    }

    #[test]
    fn test_write_sysenv() {
        let dir = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::new("job", dir.path());
        write_sysenv(&paths, Path::new("/opt/madx/bin/madx")).unwrap();
        let written = fs::read_to_string(paths.sysenv()).unwrap();
        assert!(written.contains("export MADX_PATH=/opt/madx/bin\n"));
        assert!(written.contains("export MADX=madx\n"));
    }
}
