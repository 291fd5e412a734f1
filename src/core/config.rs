use std::path::PathBuf;
use tracing::info;

use crate::error::TrackError;
use crate::models::{Overrides, TaskOptions};

/// Load configuration from the working directory with CLI overrides
pub fn load_config(project_root: &PathBuf, overrides: Overrides) -> Result<TaskOptions, TrackError> {
    let config = TaskOptions::load_from_dir(project_root)?;
    let config = config.with_overrides(overrides);

    info!(
        "Configuration loaded: url={}, job={}, poll={}ms, retries={}",
        config.server.url,
        config.job.name.as_deref().unwrap_or("-"),
        config.tracking.poll_interval_ms,
        config.tracking.retry_count
    );

    Ok(config)
}
