//! Calls into the SixDesk scripts, run from the workspace's `sixjobs`.

use tracing::{debug, info};

use super::environment::{python_directory, AutoSixEnvironment};
use super::paths::{WorkspacePaths, MAD_TO_SIXTRACK_SH, RUNSIX_SH, RUNSTATUS_SH, SIXDB};
use crate::core::StageOutcome;
use crate::errors::Result;
use crate::submit::command::{path_arg, CommandRunner, CommandSpec};

/// `run_six.sh` prints this when a submission went wrong.
const RUNSIX_FAILURE: &str = "exit status: 1";

fn sixjobs_command(paths: &WorkspacePaths, env: &AutoSixEnvironment, argv: Vec<String>) -> CommandSpec {
    CommandSpec::new(argv)
        .cwd(paths.sixjobs())
        .ssh(env.ssh.as_deref())
}

fn script(env: &AutoSixEnvironment, relative: &str) -> String {
    path_arg(&env.sixdesk_path(relative))
}

/// Submits the mask jobs generating the SixTrack input.
///
/// # Errors
///
/// Returns an error if `mad6t.sh -s` fails.
pub fn submit_mask(paths: &WorkspacePaths, env: &AutoSixEnvironment, runner: &dyn CommandRunner) -> Result<()> {
    info!("Submitting mask to run for sixtrack input generation.");
    runner.run(&sixjobs_command(
        paths,
        env,
        vec![script(env, MAD_TO_SIXTRACK_SH), "-s".into()],
    ))?;
    info!("Submitted mask-jobs.");
    Ok(())
}

/// Checks the generated SixTrack input, resubmitting failed seeds if asked.
///
/// # Errors
///
/// Returns an error only if the resubmission itself fails.
pub fn check_sixtrack_input(
    paths: &WorkspacePaths,
    env: &AutoSixEnvironment,
    runner: &dyn CommandRunner,
) -> Result<StageOutcome> {
    info!("Checking if input files are present.");
    let check = sixjobs_command(paths, env, vec![script(env, MAD_TO_SIXTRACK_SH), "-c".into()]);
    match runner.run(&check) {
        Ok(()) => {
            info!("Check for input files was successful.");
            Ok(StageOutcome::Completed)
        }
        Err(e) if env.resubmit => {
            debug!("{e}");
            info!("Resubmitting mask to run wrong seeds for sixtrack input generation.");
            runner.run(&sixjobs_command(
                paths,
                env,
                vec![script(env, MAD_TO_SIXTRACK_SH), "-w".into()],
            ))?;
            Ok(StageOutcome::skip(
                "Resubmitted input generation jobs (Not really an error, but the run is now interrupted).",
            ))
        }
        Err(e) => {
            debug!("{e}");
            Ok(StageOutcome::skip(
                "Checking input files failed. Check (debug-) logs. Maybe restart with 'resubmit' flag.",
            ))
        }
    }
}

/// Generates, checks and submits the tracking jobs (`run_six.sh -a`), or
/// only the incomplete ones on resubmission (`-i`).
pub fn submit_sixtrack(
    paths: &WorkspacePaths,
    env: &AutoSixEnvironment,
    runner: &dyn CommandRunner,
    resubmit: bool,
) -> StageOutcome {
    let re = if resubmit { "Re-" } else { "" };
    info!("{re}Submitting to sixtrack.");
    let mut argv = vec![
        script(env, RUNSIX_SH),
        if resubmit { "-i" } else { "-a" }.to_string(),
    ];
    if let Some(python) = &env.python2 {
        argv.push("-P".into());
        argv.push(path_arg(&python_directory(python)));
    }
    let command = sixjobs_command(paths, env, argv).failure_marker(RUNSIX_FAILURE);
    match runner.run(&command) {
        Ok(()) => {
            info!("{re}Submitted jobs to Sixtrack");
            StageOutcome::Completed
        }
        Err(e) => {
            debug!("{e}");
            StageOutcome::skip(format!(
                "{re}Submit to sixtrack for {} ended in error. \
                 Input generation possibly not finished. Check your Scheduler.",
                paths.jobname()
            ))
        }
    }
}

/// Checks that all tracking output is there, resubmitting if asked.
pub fn check_sixtrack_output(
    paths: &WorkspacePaths,
    env: &AutoSixEnvironment,
    runner: &dyn CommandRunner,
) -> StageOutcome {
    info!("Checking if sixtrack has finished.");
    let status = sixjobs_command(paths, env, vec![script(env, RUNSTATUS_SH)]);
    let Err(e) = runner.run(&status) else {
        info!("Sixtrack results are all present.");
        return StageOutcome::Completed;
    };
    debug!("{e}");
    let jobname = paths.jobname();
    if !env.resubmit {
        return StageOutcome::skip(format!(
            "Sixtrack for {jobname} seems to be incomplete. \
             Run possibly not finished. Check (debug-) log or your Scheduler."
        ));
    }
    match submit_sixtrack(paths, env, runner, true) {
        StageOutcome::Completed => StageOutcome::skip(format!(
            "Sixtrack for {jobname} seems to be incomplete. \
             Resubmitted incomplete sixtrack jobs. Wait until they have finished and run again."
        )),
        failed => failed,
    }
}

/// Loads the study results into the SixDB database.
pub fn sixdb_load(paths: &WorkspacePaths, env: &AutoSixEnvironment, runner: &dyn CommandRunner) -> StageOutcome {
    info!("Loading study into database.");
    let argv = vec![
        path_arg(&env.python3),
        script(env, SIXDB),
        ".".into(),
        "load_dir".into(),
    ];
    match runner.run(&sixjobs_command(paths, env, argv)) {
        Ok(()) => {
            info!("Created database for study.");
            StageOutcome::Completed
        }
        Err(e) => {
            debug!("{e}");
            StageOutcome::skip(format!(
                "Sixdb loading for {} failed. Check (debug-) log.",
                paths.jobname()
            ))
        }
    }
}

/// Runs an analysis command on the SixDB database.
pub fn sixdb_cmd(
    paths: &WorkspacePaths,
    env: &AutoSixEnvironment,
    runner: &dyn CommandRunner,
    cmd: &[&str],
) -> StageOutcome {
    let cmd_str = cmd.join(" ");
    info!("Performing sixdb command `{cmd_str}`.");
    let mut argv = vec![
        path_arg(&env.python3),
        script(env, SIXDB),
        paths.jobname().to_string(),
    ];
    argv.extend(cmd.iter().map(ToString::to_string));
    match runner.run(&sixjobs_command(paths, env, argv)) {
        Ok(()) => {
            info!("SixDB command '{cmd_str}' successfully run.");
            StageOutcome::Completed
        }
        Err(e) => {
            debug!("{e}");
            StageOutcome::skip(format!(
                "SixDB command {cmd_str} for {} failed. Check (debug-) log.",
                paths.jobname()
            ))
        }
    }
}

/// Runs the user's post-processing command through `sh -c` in the
/// `autosix_output` directory, with the job name as `$1` and the
/// DA-vs-turns step as `$2`.
pub fn post_process(paths: &WorkspacePaths, env: &AutoSixEnvironment, runner: &dyn CommandRunner) -> StageOutcome {
    let Some(command) = &env.post_process else {
        info!("No post-processing command given.");
        return StageOutcome::Completed;
    };
    info!("Post-processing with `{command}`.");
    let spec = CommandSpec::new([
        "sh".to_string(),
        "-c".to_string(),
        command.clone(),
        "autosix".to_string(),
        paths.jobname().to_string(),
        env.da_turnstep.to_string(),
    ])
    .cwd(paths.autosix_output());
    match runner.run(&spec) {
        Ok(()) => StageOutcome::Completed,
        Err(e) => {
            debug!("{e}");
            StageOutcome::skip(format!(
                "Post-processing for {} failed. Check (debug-) log.",
                paths.jobname()
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CommandError;
    use crate::submit::command::MockCommandRunner;
    use mockall::Sequence;
    use pretty_assertions::assert_eq;

    fn env(resubmit: bool) -> AutoSixEnvironment {
        AutoSixEnvironment::builder("mask", "/study")
            .sixdesk_directory("/sixdesk")
            .resubmit(resubmit)
            .build()
            .unwrap()
    }

    fn failure(cmd: &CommandSpec) -> Result<(), CommandError> {
        Err(CommandError::ExitStatus {
            command: cmd.to_string(),
            status: 1,
        })
    }

    fn last_arg(cmd: &CommandSpec) -> &str {
        cmd.argv.last().map_or("", String::as_str)
    }

    #[test]
    fn test_submit_mask_command() {
        let paths = WorkspacePaths::new("job", "/study");
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|cmd| {
                cmd.argv == ["/sixdesk/utilities/bash/mad6t.sh", "-s"]
                    && cmd.cwd.as_deref() == Some(std::path::Path::new("/study/workspace-job/sixjobs"))
            })
            .times(1)
            .returning(|_| Ok(()));
        submit_mask(&paths, &env(false), &runner).unwrap();
    }

    #[test]
    fn test_check_input_without_resubmit() {
        let paths = WorkspacePaths::new("job", "/study");
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(1).returning(failure);
        let outcome = check_sixtrack_input(&paths, &env(false), &runner).unwrap();
        assert!(outcome.skip_reason().unwrap().contains("'resubmit'"));
    }

    #[test]
    fn test_check_input_resubmits() {
        let paths = WorkspacePaths::new("job", "/study");
        let mut seq = Sequence::new();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|cmd| last_arg(cmd) == "-c")
            .times(1)
            .in_sequence(&mut seq)
            .returning(failure);
        runner
            .expect_run()
            .withf(|cmd| last_arg(cmd) == "-w")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let outcome = check_sixtrack_input(&paths, &env(true), &runner).unwrap();
        assert!(outcome.skip_reason().unwrap().starts_with("Resubmitted"));
    }

    #[test]
    fn test_submit_sixtrack_python_and_marker() {
        let paths = WorkspacePaths::new("job", "/study");
        let env = AutoSixEnvironment::builder("mask", "/study")
            .sixdesk_directory("/sixdesk")
            .python2(Some("/opt/py2/bin/python".into()))
            .build()
            .unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|cmd| {
                cmd.argv == ["/sixdesk/utilities/bash/run_six.sh", "-a", "-P", "/opt/py2/bin"]
                    && cmd.failure_marker.as_deref() == Some(RUNSIX_FAILURE)
            })
            .times(1)
            .returning(|_| Ok(()));
        assert_eq!(submit_sixtrack(&paths, &env, &runner, false), StageOutcome::Completed);
    }

    #[test]
    fn test_check_output_resubmits_incomplete() {
        let paths = WorkspacePaths::new("job", "/study");
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|cmd| last_arg(cmd).ends_with("run_status"))
            .times(1)
            .returning(failure);
        runner
            .expect_run()
            .withf(|cmd| last_arg(cmd) == "-i")
            .times(1)
            .returning(|_| Ok(()));
        let outcome = check_sixtrack_output(&paths, &env(true), &runner);
        assert!(outcome.skip_reason().unwrap().contains("Resubmitted incomplete"));
    }

    #[test]
    fn test_sixdb_cmd() {
        let paths = WorkspacePaths::new("job", "/study");
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|cmd| {
                cmd.argv == ["python3", "/sixdesk/utilities/externals/SixDeskDB/sixdb", "job", "da"]
            })
            .times(1)
            .returning(|_| Ok(()));
        assert_eq!(sixdb_cmd(&paths, &env(false), &runner, &["da"]), StageOutcome::Completed);
    }

    #[test]
    fn test_post_process_without_command() {
        let paths = WorkspacePaths::new("job", "/study");
        let mut runner = MockCommandRunner::new();
        runner.expect_run().never();
        assert_eq!(post_process(&paths, &env(false), &runner), StageOutcome::Completed);
    }

    #[test]
    fn test_post_process_passes_job_and_turnstep() {
        let paths = WorkspacePaths::new("job", "/study");
        let env = AutoSixEnvironment::builder("mask", "/study")
            .da_turnstep(250)
            .post_process(Some("./da_vs_turns.sh \"$1\" \"$2\"".into()))
            .build()
            .unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|cmd| {
                cmd.argv[..2] == ["sh", "-c"]
                    && cmd.argv[3..] == ["autosix", "job", "250"]
                    && cmd.cwd.as_deref() == Some(std::path::Path::new("/study/workspace-job/sixjobs/autosix_output"))
            })
            .times(1)
            .returning(failure);
        assert!(post_process(&paths, &env, &runner).skip_reason().is_some());
    }
}
