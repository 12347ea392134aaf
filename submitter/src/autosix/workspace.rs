//! Creating, patching and unlocking SixDesk workspaces.

use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::environment::AutoSixEnvironment;
use super::paths::{WorkspacePaths, HTCONDOR_RUN_SIX_SUB, SETENV_SH, SIXDESKLOCKFILE};
use super::sixdeskenv::{write_mask, write_sixdeskenv, write_sysenv};
use crate::core::ParamValue;
use crate::errors::{Result, SubmitterError};
use crate::submit::command::{path_arg, CommandRunner, CommandSpec};

/// Creates the workspace and writes `sysenv`, `sixdeskenv` and the mask.
///
/// # Errors
///
/// Returns an error if SixDesk fails to create the workspace, the settings
/// are invalid or a file cannot be written.
pub fn create_job(
    paths: &WorkspacePaths,
    values: &BTreeMap<String, ParamValue>,
    env: &AutoSixEnvironment,
    runner: &dyn CommandRunner,
) -> Result<()> {
    create_workspace(paths, env, runner)?;
    write_sysenv(paths, &env.executable)?;
    write_sixdeskenv(paths, values)?;
    write_mask(paths, &env.mask_text, values)?;
    info!("Workspace prepared.");
    Ok(())
}

/// Creates an empty workspace via `set_env.sh -N`.
///
/// An existing workspace is kept as-is.
///
/// # Errors
///
/// Returns an error if a directory cannot be created or SixDesk fails.
pub fn create_workspace(
    paths: &WorkspacePaths,
    env: &AutoSixEnvironment,
    runner: &dyn CommandRunner,
) -> Result<()> {
    let workspace = paths.workspace();
    info!("Creating new workspace in '{}'", workspace.display());

    if workspace.exists() {
        warn!(
            "Workspace in '{}' already exists. Keeping Workspace as-is.",
            workspace.display()
        );
    } else {
        fs::create_dir_all(paths.scratch())?;
        let workspace_name = workspace
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        runner.run(
            &CommandSpec::new([path_arg(&env.sixdesk_path(SETENV_SH)), "-N".into(), workspace_name])
                .cwd(paths.basedir())
                .ssh(env.ssh.as_deref()),
        )?;
    }
    // after set_env.sh, which refuses to run into existing folders
    fs::create_dir_all(paths.autosix_output())?;
    Ok(())
}

/// Initializes the workspace from `sixdeskenv` and `sysenv`.
///
/// # Errors
///
/// Returns an error if `set_env.sh -s` fails.
pub fn init_workspace(paths: &WorkspacePaths, env: &AutoSixEnvironment, runner: &dyn CommandRunner) -> Result<()> {
    runner.run(
        &CommandSpec::new([path_arg(&env.sixdesk_path(SETENV_SH)), "-s".into()])
            .cwd(paths.sixjobs())
            .ssh(env.ssh.as_deref()),
    )?;
    info!("Workspace initialized.");
    Ok(())
}

/// Comments out the "TWISS fail" check in the `mad6t` scripts.
///
/// # Errors
///
/// Returns an error if a script cannot be read or written.
pub fn remove_twiss_fail_check(paths: &WorkspacePaths) -> Result<()> {
    info!("Applying twiss-fail hack.");
    for mad6t in [paths.mad6t_mask(), paths.mad6t1_mask()] {
        let content = fs::read_to_string(&mad6t)?;
        let mut lines: Vec<String> = content.split_inclusive('\n').map(String::from).collect();

        let Some(start) = lines
            .iter()
            .position(|l| l.starts_with("grep -i \"TWISS fail\""))
        else {
            info!("'TWISS fail' not found in {}", file_name(&mad6t));
            continue;
        };
        for line in &mut lines[start..] {
            let done = line.starts_with("fi");
            *line = format!("# {line}");
            if done {
                break;
            }
        }
        fs::write(&mad6t, lines.concat())?;
    }
    Ok(())
}

/// Calls the mask directly instead of piping it into MAD-X.
///
/// # Errors
///
/// Returns an error if a script cannot be read or written, or has no MAD-X
/// call.
pub fn fix_pythonfile_call(paths: &WorkspacePaths) -> Result<()> {
    info!("Applying python-file call fix.");
    for mad6t in [paths.mad6t_mask(), paths.mad6t1_mask()] {
        let content = fs::read_to_string(&mad6t)?;
        let mut lines: Vec<String> = content.split_inclusive('\n').map(String::from).collect();
        let line = lines
            .iter_mut()
            .find(|l| l.starts_with("$MADX_PATH/$MADX"))
            .ok_or_else(|| {
                SubmitterError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("'$MADX_PATH/$MADX' line not found in {}", file_name(&mad6t)),
                ))
            })?;
        *line = "$MADX_PATH/$MADX $junktmp/$filejob.\"$i\" > $filejob.out.\"$i\"\n".to_string();
        fs::write(&mad6t, lines.concat())?;
    }
    Ok(())
}

fn max_materialize_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r"max_materialize\s*=\s*\d+").unwrap())
}

// the setting including trailing whitespace and line break
fn max_materialize_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r"max_materialize\s*=\s*\d+\s*").unwrap())
}

/// Sets `max_materialize` in the SixDesk HTCondor template.
///
/// `None` leaves the template alone, `Some(0)` removes the setting. This
/// changes the SixDesk installation for everyone using it.
///
/// # Errors
///
/// Returns an error if the template cannot be read or written.
pub fn set_max_materialize(sixdesk: &Path, max_materialize: Option<u32>) -> Result<()> {
    let Some(max_materialize) = max_materialize else {
        return Ok(());
    };
    info!("Setting max_materialize for SixTrack to {max_materialize}.");
    let sub_path = sixdesk.join(HTCONDOR_RUN_SIX_SUB);
    let content = fs::read_to_string(&sub_path)?;
    let re = max_materialize_regex();

    let content = if max_materialize == 0 {
        if re.is_match(&content) {
            info!("'max_materialize' already set. Removing.");
            max_materialize_line_regex()
                .replace_all(&content, "")
                .into_owned()
        } else {
            debug!("'max_materialize' is already not present (as desired).");
            content
        }
    } else {
        let setting = format!("max_materialize = {max_materialize}");
        if re.is_match(&content) {
            info!("max_materialize already set. Replacing it with new number.");
            re.replace_all(&content, setting.as_str()).into_owned()
        } else {
            content.replacen("\nqueue", &format!("\n{setting}\nqueue"), 1)
        }
    };

    fs::write(&sub_path, content).map_err(|e| {
        SubmitterError::Io(std::io::Error::new(
            e.kind(),
            format!(
                "Could not write to {}. `max_materialize` could not be set. \
                 Remove option or use a SixDesk with writing rights.",
                sub_path.display()
            ),
        ))
    })?;
    Ok(())
}

/// Reports `sixdesklock` files in the workspace and removes them if asked.
///
/// Returns true if the workspace is still locked.
///
/// # Errors
///
/// Returns an error if a lock file cannot be read or removed.
pub fn is_locked(paths: &WorkspacePaths, sixdesk: &Path, unlock: bool) -> Result<bool> {
    let locks: Vec<_> = WalkDir::new(paths.workspace())
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file() && e.file_name() == SIXDESKLOCKFILE)
        .map(walkdir::DirEntry::into_path)
        .collect();
    if locks.is_empty() {
        return Ok(false);
    }

    info!("The following folders are locked:");
    let sixdesk = sixdesk.display().to_string();
    for lock in &locks {
        info!("{}", lock.parent().unwrap_or(lock.as_path()).display());
        let text = fs::read_to_string(lock)?.replace(&sixdesk, "$SIXUTILS");
        let text = text.trim_matches('\n');
        if !text.is_empty() {
            debug!(" -> locked by: {text}");
        }
    }

    if !unlock {
        return Ok(true);
    }
    for lock in &locks {
        debug!("Removing lock {}", lock.display());
        fs::remove_file(lock)?;
    }
    Ok(false)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submit::command::MockCommandRunner;
    use pretty_assertions::assert_eq;

    const MAD6T: &str = "\
#!/bin/bash
$MADX_PATH/$MADX < $junktmp/$filejob.\"$i\" > $filejob.out.\"$i\"
grep -i \"TWISS fail\" $filejob.out.\"$i\" > /dev/null
if test $? -eq 0; then
  exit 1
fi
echo done
";

    fn workspace_with_mad6t(dir: &Path) -> WorkspacePaths {
        let paths = WorkspacePaths::new("job", dir);
        fs::create_dir_all(paths.sixtrack_input()).unwrap();
        fs::write(paths.mad6t_mask(), MAD6T).unwrap();
        fs::write(paths.mad6t1_mask(), MAD6T).unwrap();
        paths
    }

    #[test]
    fn test_remove_twiss_fail_check() {
        let dir = tempfile::tempdir().unwrap();
        let paths = workspace_with_mad6t(dir.path());
        remove_twiss_fail_check(&paths).unwrap();
        let patched = fs::read_to_string(paths.mad6t1_mask()).unwrap();
        assert!(patched.contains("# grep -i \"TWISS fail\""));
        assert!(patched.contains("#   exit 1\n"));
        assert!(patched.contains("# fi\necho done\n"));
    }

    #[test]
    fn test_fix_pythonfile_call() {
        let dir = tempfile::tempdir().unwrap();
        let paths = workspace_with_mad6t(dir.path());
        fix_pythonfile_call(&paths).unwrap();
        let patched = fs::read_to_string(paths.mad6t_mask()).unwrap();
        assert!(patched.contains("$MADX_PATH/$MADX $junktmp/$filejob.\"$i\" > $filejob.out.\"$i\"\n"));
        assert!(!patched.contains("$MADX < "));
    }

    #[test]
    fn test_fix_pythonfile_call_without_madx_line() {
        let dir = tempfile::tempdir().unwrap();
        let paths = workspace_with_mad6t(dir.path());
        fs::write(paths.mad6t_mask(), "echo nothing\n").unwrap();
        assert!(fix_pythonfile_call(&paths).is_err());
    }

    #[test]
    fn test_set_max_materialize() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join(HTCONDOR_RUN_SIX_SUB);
        fs::create_dir_all(sub.parent().unwrap()).unwrap();
        fs::write(&sub, "universe = vanilla\nqueue\n").unwrap();

        set_max_materialize(dir.path(), None).unwrap();
        assert_eq!(fs::read_to_string(&sub).unwrap(), "universe = vanilla\nqueue\n");

        set_max_materialize(dir.path(), Some(100)).unwrap();
        assert_eq!(
            fs::read_to_string(&sub).unwrap(),
            "universe = vanilla\nmax_materialize = 100\nqueue\n"
        );

        set_max_materialize(dir.path(), Some(20)).unwrap();
        assert!(fs::read_to_string(&sub).unwrap().contains("max_materialize = 20\n"));

        set_max_materialize(dir.path(), Some(0)).unwrap();
        assert_eq!(fs::read_to_string(&sub).unwrap(), "universe = vanilla\nqueue\n");
    }

    #[test]
    fn test_locks() {
        let dir = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::new("job", dir.path());
        assert!(!is_locked(&paths, Path::new("/sixdesk"), false).unwrap());

        fs::create_dir_all(paths.sixjobs()).unwrap();
        let lock = paths.sixjobs().join(SIXDESKLOCKFILE);
        fs::write(&lock, "/sixdesk/utilities/bash/run_six.sh\n").unwrap();
        assert!(is_locked(&paths, Path::new("/sixdesk"), false).unwrap());
        assert!(lock.exists());

        assert!(!is_locked(&paths, Path::new("/sixdesk"), true).unwrap());
        assert!(!lock.exists());
    }

    #[test]
    fn test_create_workspace_runs_set_env() {
        let dir = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::new("job", dir.path());
        let env = AutoSixEnvironment::builder("m", dir.path())
            .sixdesk_directory("/sixdesk")
            .build()
            .unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|cmd| {
                cmd.argv == ["/sixdesk/utilities/bash/set_env.sh", "-N", "workspace-job"]
            })
            .times(1)
            .returning(|_| Ok(()));

        create_workspace(&paths, &env, &runner).unwrap();
        assert!(paths.scratch().is_dir());
        assert!(paths.autosix_output().is_dir());

        // existing workspace is kept and set_env.sh not called again
        create_workspace(&paths, &env, &runner).unwrap();
    }
}
