use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::commands::track::run_tracking;
use crate::core::{load_config, poll_queue_item, poll_submit_job, JenkinsClient, RemoteClient};
use crate::models::{ConfigError, Overrides};

/// Queue options
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    pub overrides: Overrides,
    /// Where to write the markdown summary
    pub summary: Option<PathBuf>,
}

/// Submit the configured job and track it; `Ok(false)` when the run failed
pub async fn queue_job(project_root: &PathBuf, options: QueueOptions) -> anyhow::Result<bool> {
    let config = load_config(project_root, options.overrides)?;
    let job_name = config.job.name.clone().ok_or(ConfigError::MissingJobName)?;
    let client: Arc<dyn RemoteClient> = Arc::new(JenkinsClient::new(&config.server)?);

    info!("Queueing Jenkins job: {}", job_name);
    let queue_url = poll_submit_job(client.as_ref(), &config).await?;
    let executable =
        poll_queue_item(client.as_ref(), &queue_url, config.tracking.poll_interval()).await?;

    run_tracking(config, client, executable, options.summary).await
}
