//! HTCondor submit files and submission.
//!
//! All jobs of a run go into a single submit file in the working
//! directory, one `queue` entry per job shell script.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::command::{path_arg, CommandRunner, CommandSpec};
use crate::errors::{ConfigError, Result, SubmitterError};
use crate::manifest::JobRecord;

/// Shebang of the job shell scripts.
pub const SHEBANG: &str = "#!/bin/bash";
/// Name of the submit file.
pub const SUBFILE: &str = "queuehtc.sub";
/// Prefix of the job shell scripts, `Job.<id>.sh`.
pub const BASH_FILENAME: &str = "Job";
/// Maximum number of jobs in one submission.
pub const HTCONDOR_JOBLIMIT: usize = 100_000;
/// Submission command.
pub const CMD_SUBMIT: &str = "condor_submit";

/// Valid job flavours (maximum runtimes).
pub const JOBFLAVOURS: &[&str] = &[
    "espresso",     // 20 min
    "microcentury", // 1 h
    "longlunch",    // 2 h
    "workday",      // 8 h
    "tomorrow",     // 1 d
    "testmatch",    // 3 d
    "nextweek",     // 1 w
];

/// Valid notification settings.
pub const NOTIFICATIONS: &[&str] = &["always", "complete", "error", "never"];

/// Free-form submit file arguments, as given on the command line.
pub type HtcArguments = serde_json::Map<String, Value>;

/// Ordered `key = value` lines of a submit description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitDescription {
    entries: Vec<(String, String)>,
}

impl SubmitDescription {
    /// The defaults used for every submission.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut desc = Self::default();
        for (key, value) in [
            ("MyId", "htcondor"),
            ("universe", "vanilla"),
            ("arguments", "$(ClusterId) $(ProcId)"),
            ("output", "$(initialdir)/$(MyId).$(ClusterId).$(ProcId).out"),
            ("error", "$(initialdir)/$(MyId).$(ClusterId).$(ProcId).err"),
            ("log", "$(initialdir)/$(MyId).$(ClusterId).$(ProcId).log"),
            ("on_exit_remove", "(ExitBySignal == False) && (ExitCode == 0)"),
            ("requirements", "Machine =!= LastRemoteHost"),
        ] {
            desc.set(key, value);
        }
        desc
    }

    /// Sets a value, keeping the position of an existing key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Value of a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Renders the description as submit file text.
    #[must_use]
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k} = {v}\n"))
            .collect()
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Maps the known arguments onto submit keys and passes the rest through.
///
/// | argument | submit key | default |
/// |---|---|---|
/// | `duration` | `+JobFlavour` | `workday` |
/// | `output_dir` | `transfer_output_files` | |
/// | `accounting_group` | `+AccountingGroup` | |
/// | `max_retries` | `max_retries` | `3` |
/// | `notification` | `notification` | `error` |
///
/// # Errors
///
/// Returns an error if `duration` or `notification` is not a valid choice.
pub fn map_kwargs(arguments: &HtcArguments) -> Result<Vec<(String, String)>, ConfigError> {
    let mapping: [(&str, &str, Option<&[&str]>, Option<&str>); 5] = [
        ("duration", "+JobFlavour", Some(JOBFLAVOURS), Some("workday")),
        ("output_dir", "transfer_output_files", None, None),
        ("accounting_group", "+AccountingGroup", None, None),
        ("max_retries", "max_retries", None, Some("3")),
        ("notification", "notification", Some(NOTIFICATIONS), Some("error")),
    ];

    let mut mapped = Vec::new();
    for (key, submit_key, choices, default) in mapping {
        let value = match arguments.get(key).filter(|v| !v.is_null()) {
            Some(v) => {
                let v = value_to_string(v);
                if let Some(choices) = choices {
                    if !choices.contains(&v.as_str()) {
                        return Err(ConfigError::new(format!(
                            "{key} needs to be one of '{}' but instead was '{v}'",
                            choices.join("', '")
                        ))
                        .with_keys([key]));
                    }
                }
                Some(v)
            }
            None => default.map(ToString::to_string),
        };
        if let Some(value) = value {
            let value = if submit_key.starts_with('+') {
                format!("\"{value}\"")
            } else {
                value
            };
            mapped.push((submit_key.to_string(), value));
        }
    }

    let known: Vec<&str> = mapping.iter().map(|(k, ..)| *k).collect();
    let remaining: Vec<(String, String)> = arguments
        .iter()
        .filter(|(k, _)| !known.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), value_to_string(v)))
        .collect();
    debug!("Remaining arguments to be added: {remaining:?}");
    mapped.extend(remaining);
    Ok(mapped)
}

/// Fails if more jobs are requested than HTCondor accepts.
///
/// # Errors
///
/// Returns [`SubmitterError::JobLimit`] above [`HTCONDOR_JOBLIMIT`].
pub fn check_job_limit(count: usize) -> Result<()> {
    if count > HTCONDOR_JOBLIMIT {
        return Err(SubmitterError::JobLimit {
            count,
            limit: HTCONDOR_JOBLIMIT,
        });
    }
    Ok(())
}

/// Creates the submit file content for all job shell scripts.
///
/// # Errors
///
/// Returns an error for invalid arguments or records without shell script.
pub fn create_multijob_for_bashfiles(records: &[JobRecord], arguments: &HtcArguments) -> Result<String> {
    let mut desc = SubmitDescription::with_defaults();
    for (key, value) in map_kwargs(arguments)? {
        desc.set(key, value);
    }

    let mut queue = vec!["queue executable, initialdir from (".to_string()];
    for record in records {
        let script = record.shell_script.as_ref().ok_or_else(|| {
            SubmitterError::config(format!("Job {} has no shell script", record.job_id))
        })?;
        queue.push(format!(
            "{},{}",
            record.job_directory.join(script).display(),
            record.job_directory.display()
        ));
    }
    queue.push(")".to_string());

    let submission = desc.render() + &queue.join("\n");
    debug!("Created HTCondor subfile with content: \n{submission}");
    Ok(submission)
}

/// Writes the submit file into the working directory.
///
/// # Errors
///
/// Returns an error if the content cannot be created or written.
pub fn make_subfile(cwd: &Path, records: &[JobRecord], arguments: &HtcArguments) -> Result<PathBuf> {
    let submission = create_multijob_for_bashfiles(records, arguments)?;
    let subfile = cwd.join(SUBFILE);
    debug!("Writing sub-file '{}'.", subfile.display());
    fs::write(&subfile, submission)?;
    Ok(subfile)
}

/// Submits the submit file, optionally from a remote host.
///
/// # Errors
///
/// Returns an error if the submission command fails.
pub fn submit_jobfile(runner: &dyn CommandRunner, subfile: &Path, ssh: Option<&str>) -> Result<()> {
    let command = CommandSpec::new([CMD_SUBMIT.to_string(), path_arg(subfile)]).ssh(ssh);
    runner.run(&command)?;
    info!("Jobs successfully submitted.");
    Ok(())
}
