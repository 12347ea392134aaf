//! Job creation: folders, scripts and the manifest on disk.

use std::fs;
use std::path::Path;
use tracing::debug;

use super::htcondor::{check_job_limit, BASH_FILENAME, SHEBANG};
use super::{CreationOpts, MaskSource};
use crate::core::JobId;
use crate::errors::Result;
use crate::manifest::{self, CompletionCheck, JobRecord, Manifest};
use crate::mask;
use crate::utils::uri::{is_eos_uri, server_from_uri, uri_to_path};

/// The jobs of a run after creation.
#[derive(Debug, Clone)]
pub struct CreatedJobs {
    /// All jobs, including prior and finished ones.
    pub manifest: Manifest,
    /// Jobs that still need to run.
    pub to_run: Vec<JobRecord>,
    /// Jobs found to be finished already.
    pub finished: Vec<JobId>,
}

/// Prepares all jobs and the folder structure.
///
/// Builds the manifest from the parameter space (appending to the prior
/// one if requested), creates a folder per job, writes job scripts and
/// shell wrappers, persists the manifest and finally drops finished jobs in
/// append and resume mode.
///
/// # Errors
///
/// Returns an error if the manifest cannot be built or any file operation
/// fails.
pub fn create_jobs(opts: &CreationOpts) -> Result<CreatedJobs> {
    debug!("Creating Jobs.");
    fs::create_dir_all(&opts.working_directory)?;
    let mut manifest = manifest::reconcile(
        &opts.replace_dict,
        opts.jobid_mask.as_deref(),
        &opts.working_directory,
        opts.append_jobs,
    )?;

    create_folders(
        &mut manifest,
        &opts.working_directory,
        opts.output_destination.as_deref(),
    )?;

    if let MaskSource::File(path) = &opts.mask {
        debug!("Creating all jobs from mask.");
        let extension =
            mask::script_extension(opts.script_extension.as_deref(), &opts.executable, path);
        mask::write_job_scripts(&mut manifest, path, &extension)?;
    }

    debug!("Creating shell scripts.");
    write_bash(&mut manifest, opts)?;

    manifest.write(&opts.working_directory)?;

    if !opts.should_drop_jobs() {
        let to_run = manifest.records().to_vec();
        return Ok(CreatedJobs {
            manifest,
            to_run,
            finished: Vec::new(),
        });
    }
    let check = CompletionCheck::new(opts.output_dir.clone(), &opts.check_files)?;
    let (to_run, finished) = manifest::drop_finished_jobs(&manifest, &check);
    Ok(CreatedJobs {
        manifest,
        to_run,
        finished,
    })
}

/// Creates a folder per job and, if given, the destination folders.
///
/// The destination gets a `SUBMISSION_DIR` link back to the working
/// directory and the working directory an `OUTPUT_DIR` link to the
/// destination.
///
/// # Errors
///
/// Returns an error if a directory or link cannot be created.
pub fn create_folders(
    manifest: &mut Manifest,
    working_directory: &Path,
    destination: Option<&str>,
) -> Result<()> {
    debug!("Setting up folders: ");
    for record in manifest.records_mut() {
        record.job_directory = working_directory.join(record.job_id.directory_name());
        fs::create_dir_all(&record.job_directory)?;
        debug!("   created '{}'.", record.job_directory.display());
    }

    let Some(destination) = destination else {
        return Ok(());
    };
    let dest_path = uri_to_path(destination);
    fs::create_dir_all(&dest_path)?;
    let server = server_from_uri(destination);

    replace_symlink(&dest_path.join("SUBMISSION_DIR"), &working_directory.canonicalize()?)?;
    replace_symlink(&working_directory.join("OUTPUT_DIR"), &dest_path.canonicalize()?)?;

    for record in manifest.records_mut() {
        let job_dest = dest_path.join(record.job_id.directory_name());
        fs::create_dir_all(&job_dest)?;
        let dest = format!("{server}{}", job_dest.display());
        debug!("   created '{dest}'.");
        record.destination_directory = Some(dest);
    }
    Ok(())
}

#[cfg(unix)]
fn replace_symlink(link: &Path, target: &Path) -> std::io::Result<()> {
    if link.symlink_metadata().is_ok() {
        fs::remove_file(link)?;
    }
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn replace_symlink(_link: &Path, _target: &Path) -> std::io::Result<()> {
    Ok(())
}

fn with_trailing_slash(s: &str) -> String {
    if s.ends_with('/') {
        s.to_string()
    } else {
        format!("{s}/")
    }
}

/// Writes the shell wrapper `Job.<id>.sh` into every job directory.
///
/// The wrapper creates the output directory, calls the executable on the
/// job script (or runs the filled inline mask) with the script arguments,
/// and copies the output to the destination if one is set.
///
/// # Errors
///
/// Returns an error above the HTCondor job limit, if an inline mask cannot
/// be filled or a script cannot be written.
pub fn write_bash(manifest: &mut Manifest, opts: &CreationOpts) -> Result<()> {
    check_job_limit(manifest.len())?;

    let exec_path = if opts.executable.is_empty() {
        String::new()
    } else {
        format!("{} ", mask::resolve_executable(&opts.executable))
    };
    let cmds: String = opts
        .script_arguments
        .iter()
        .map(|(param, val)| format!(" {param} {val}"))
        .collect();
    let output_dir = opts.output_dir.as_str();

    for (idx, record) in manifest.records_mut().enumerate() {
        let bash_file_name = format!("{BASH_FILENAME}.{}.sh", record.job_id);
        let jobfile = record.job_directory.join(&bash_file_name);
        debug!("Writing bash-file {idx} '{}'.", jobfile.display());

        let mut content = format!("{SHEBANG}\n");
        if !output_dir.is_empty() {
            content.push_str(&format!("mkdir {output_dir}\n"));
        }
        content.push_str(&exec_path);
        match &opts.mask {
            MaskSource::File(_) => {
                let job_file = record.job_file.as_deref().unwrap_or_default();
                content.push_str(&record.job_directory.join(job_file).display().to_string());
            }
            MaskSource::Inline(text) => content.push_str(&mask::fill(text, &record.values)?),
        }
        content.push_str(&cmds);
        content.push('\n');

        if let Some(dest_dir) = record.destination_directory.as_deref() {
            if !output_dir.is_empty() && output_dir != dest_dir {
                let cp_command = if is_eos_uri(dest_dir) {
                    format!(
                        "eos cp -r {} {}",
                        with_trailing_slash(output_dir),
                        with_trailing_slash(dest_dir)
                    )
                } else {
                    format!("cp -r {output_dir} {}", with_trailing_slash(dest_dir))
                };
                content.push_str(&cp_command);
                content.push('\n');
            }
        }

        fs::write(&jobfile, content)?;
        record.shell_script = Some(bash_file_name.into());
    }
    Ok(())
}
