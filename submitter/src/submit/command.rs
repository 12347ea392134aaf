//! Running external commands, locally or on a remote host via ssh.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::errors::CommandError;

/// A command line plus where and how to run it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    /// Program (and arguments) to execute.
    pub argv: Vec<String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Host to run the command on.
    pub ssh: Option<String>,
    /// Output text that marks the command as failed even on exit status 0.
    pub failure_marker: Option<String>,
}

impl CommandSpec {
    /// Creates a command from a program and its arguments.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Sets the working directory.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Runs the command on the given host, if any.
    #[must_use]
    pub fn ssh(mut self, host: Option<&str>) -> Self {
        self.ssh = host.map(ToString::to_string);
        self
    }

    /// Sets a failure marker to look for in the output.
    #[must_use]
    pub fn failure_marker(mut self, marker: impl Into<String>) -> Self {
        self.failure_marker = Some(marker.into());
        self
    }

    /// The process arguments actually spawned.
    ///
    /// With ssh, the command is joined into one remote command line and
    /// prefixed with `cd "<cwd>" &&` if a working directory is set.
    #[must_use]
    pub fn process_args(&self) -> Vec<String> {
        match &self.ssh {
            None => self.argv.clone(),
            Some(host) => {
                let mut remote = self.argv.join(" ");
                if let Some(cwd) = &self.cwd {
                    remote = format!("cd \"{}\" && {remote}", cwd.display());
                }
                vec!["ssh".to_string(), host.clone(), remote]
            }
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

/// Executes commands and reports failures.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be started, exits non-zero or
    /// prints its failure marker.
    fn run(&self, command: &CommandSpec) -> Result<(), CommandError>;
}

/// Runs commands as child processes, logging their output at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    fn check_output(command: &CommandSpec, output: &[u8]) -> Result<(), CommandError> {
        for line in String::from_utf8_lossy(output).lines().map(str::trim) {
            if line.is_empty() {
                continue;
            }
            debug!("{line}");
            if let Some(marker) = &command.failure_marker {
                if line.contains(marker.as_str()) {
                    return Err(CommandError::FailureMarker {
                        command: command.to_string(),
                        marker: marker.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, command: &CommandSpec) -> Result<(), CommandError> {
        let args = command.process_args();
        let Some((program, rest)) = args.split_first() else {
            return Err(CommandError::Spawn {
                command: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        };
        match &command.ssh {
            Some(host) => debug!(
                "Executing command '{}' on {host}",
                rest.last().map_or("", String::as_str)
            ),
            None => debug!("Executing command '{command}'"),
        }

        let mut process = Command::new(program);
        process
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = command.cwd.as_deref().filter(|_| command.ssh.is_none()) {
            process.current_dir(cwd);
        }

        let output = process.output().map_err(|source| CommandError::Spawn {
            command: command.to_string(),
            source,
        })?;
        Self::check_output(command, &output.stdout)?;
        Self::check_output(command, &output.stderr)?;

        if !output.status.success() {
            return Err(CommandError::ExitStatus {
                command: command.to_string(),
                status: output.status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

/// Path as owned string for command lines.
#[must_use]
pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_local_args() {
        let cmd = CommandSpec::new(["condor_submit", "queuehtc.sub"]).cwd("/work");
        assert_eq!(cmd.process_args(), vec!["condor_submit", "queuehtc.sub"]);
        assert_eq!(cmd.to_string(), "condor_submit queuehtc.sub");
    }

    #[test]
    fn test_ssh_args() {
        let cmd = CommandSpec::new(["mad6t.sh", "-s"])
            .cwd("/work/sixjobs")
            .ssh(Some("lxplus.cern.ch"));
        assert_eq!(
            cmd.process_args(),
            vec!["ssh", "lxplus.cern.ch", "cd \"/work/sixjobs\" && mad6t.sh -s"]
        );
    }

    #[test]
    fn test_system_runner_success_and_failure() {
        let runner = SystemCommandRunner;
        assert!(runner.run(&CommandSpec::new(["sh", "-c", "echo ok"])).is_ok());
        let err = runner.run(&CommandSpec::new(["sh", "-c", "exit 3"])).unwrap_err();
        assert!(matches!(err, CommandError::ExitStatus { status: 3, .. }));
    }

    #[test]
    fn test_system_runner_failure_marker() {
        let cmd = CommandSpec::new(["sh", "-c", "echo 'exit status: 1'"]).failure_marker("exit status: 1");
        let err = SystemCommandRunner.run(&cmd).unwrap_err();
        assert!(matches!(err, CommandError::FailureMarker { .. }));
    }

    #[test]
    fn test_system_runner_missing_program() {
        let err = SystemCommandRunner
            .run(&CommandSpec::new(["this-program-does-not-exist-42"]))
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[test]
    fn test_system_runner_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = CommandSpec::new(["sh", "-c", "touch here"]).cwd(dir.path());
        SystemCommandRunner.run(&cmd).unwrap();
        assert!(dir.path().join("here").exists());
    }
}
