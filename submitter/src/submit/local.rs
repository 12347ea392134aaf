//! Running job shell scripts on the local machine.

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use std::fs::File;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::core::JobId;
use crate::errors::{CommandError, Result, SubmitterError};
use crate::manifest::JobRecord;

/// Name of the per-job log file of local runs.
pub const LOCAL_LOGFILE: &str = "log.tmp";

/// Executes a single job.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Runs the job to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot be started or fails.
    async fn execute(&self, record: &JobRecord) -> Result<(), CommandError>;
}

/// Runs the job's shell script with `sh` inside the job directory.
///
/// Standard output and error go to `log.tmp` in the job directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

#[async_trait]
impl JobExecutor for ShellExecutor {
    async fn execute(&self, record: &JobRecord) -> Result<(), CommandError> {
        let script = record
            .shell_script
            .as_ref()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let command = format!("sh {script}");
        let spawn_err = |source| CommandError::Spawn {
            command: command.clone(),
            source,
        };

        let logfile = File::create(record.job_directory.join(LOCAL_LOGFILE)).map_err(spawn_err)?;
        let stderr = logfile.try_clone().map_err(spawn_err)?;
        let status = Command::new("sh")
            .arg(&script)
            .current_dir(&record.job_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::from(logfile))
            .stderr(Stdio::from(stderr))
            .status()
            .await
            .map_err(spawn_err)?;

        if status.success() {
            Ok(())
        } else {
            Err(CommandError::ExitStatus {
                command,
                status: status.code().unwrap_or(-1),
            })
        }
    }
}

/// Runs all jobs with at most `num_processes` running at the same time.
///
/// Every job is attempted; failures are collected and reported together.
///
/// # Errors
///
/// Returns [`SubmitterError::LocalRunFailed`] listing every failed job.
pub async fn run_local(
    records: &[JobRecord],
    num_processes: usize,
    executor: Arc<dyn JobExecutor>,
) -> Result<()> {
    info!(
        "Running {} jobs locally in {num_processes} processes.",
        records.len()
    );
    let semaphore = Arc::new(Semaphore::new(num_processes.max(1)));
    let failed: Arc<Mutex<Vec<(usize, JobId)>>> = Arc::new(Mutex::new(Vec::new()));

    let workers = records.iter().cloned().enumerate().map(|(idx, record)| {
        let semaphore = Arc::clone(&semaphore);
        let failed = Arc::clone(&failed);
        let executor = Arc::clone(&executor);
        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                failed.lock().push((idx, record.job_id.clone()));
                return;
            };
            debug!(job = %record.job_id, "Starting job.");
            if let Err(e) = executor.execute(&record).await {
                error!(job = %record.job_id, "{e}");
                failed.lock().push((idx, record.job_id.clone()));
            }
        })
    });

    for (idx, joined) in join_all(workers).await.into_iter().enumerate() {
        if let Err(e) = joined {
            error!("Worker for job {} crashed: {e}", records[idx].job_id);
            failed.lock().push((idx, records[idx].job_id.clone()));
        }
    }

    let mut failed = std::mem::take(&mut *failed.lock());
    if failed.is_empty() {
        return Ok(());
    }
    failed.sort_by_key(|(idx, _)| *idx);
    let err = SubmitterError::LocalRunFailed {
        failed: failed.into_iter().map(|(_, id)| id).collect(),
        total: records.len(),
    };
    error!("{err}");
    Err(err)
}
