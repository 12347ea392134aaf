//! Logging setup and timing of stage bodies.

use std::time::Instant;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` if set, else from `level`. With `json`
/// every event is written as one JSON object per line.
///
/// # Errors
///
/// Returns an error if the level is not a valid filter or a subscriber is
/// already installed.
pub fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().try_init().map_err(anyhow::Error::msg)?;
    } else {
        builder.try_init().map_err(anyhow::Error::msg)?;
    }
    Ok(())
}

/// Measures how long a stage body ran and logs it when finished.
#[derive(Debug)]
pub struct StageTimer {
    stage: String,
    start: Instant,
}

impl StageTimer {
    /// Starts timing the stage.
    #[must_use]
    pub fn start(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            start: Instant::now(),
        }
    }

    /// Stops the timer, logs and returns the duration in milliseconds.
    pub fn finish(self, status: &str) -> f64 {
        let duration_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        debug!(stage = %self.stage, status, duration_ms, "Stage body finished");
        duration_ms
    }
}
