use anyhow::{bail, Context};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::core::urls::add_url_segment;
use crate::core::{load_config, poll_queue_item, JenkinsClient, JobQueue, QueuedExecutable, RemoteClient};
use crate::models::{Overrides, TaskOptions};

/// Which submission to attach to
#[derive(Debug, Clone, Default)]
pub struct TrackTarget {
    /// Queue item API URL returned by a submission
    pub queue_url: Option<String>,
    /// Job definition URL, used together with `build`
    pub job_url: Option<String>,
    pub build: Option<u64>,
    /// Display name; defaults to the last segment of the job URL
    pub name: Option<String>,
}

/// Track options
#[derive(Debug, Clone, Default)]
pub struct TrackOptions {
    pub target: TrackTarget,
    pub overrides: Overrides,
    /// Where to write the markdown summary
    pub summary: Option<PathBuf>,
}

fn name_from_url(job_url: &str) -> String {
    job_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(job_url)
        .to_string()
}

/// Track an execution that was already queued; `Ok(false)` when the run failed
pub async fn track_job(project_root: &PathBuf, options: TrackOptions) -> anyhow::Result<bool> {
    let config = load_config(project_root, options.overrides)?;
    let client: Arc<dyn RemoteClient> = Arc::new(JenkinsClient::new(&config.server)?);

    let target = options.target;
    let executable = match (target.queue_url, target.job_url, target.build) {
        (Some(queue_url), _, _) => {
            info!("Waiting for queue item: {}", queue_url);
            let mut executable =
                poll_queue_item(client.as_ref(), &queue_url, config.tracking.poll_interval()).await?;
            if let Some(name) = target.name {
                executable.name = name;
            }
            executable
        }
        (None, Some(job_url), Some(number)) => {
            let task_url = add_url_segment(&job_url, "");
            QueuedExecutable {
                name: target.name.unwrap_or_else(|| name_from_url(&job_url)),
                executable_url: add_url_segment(&task_url, &number.to_string()),
                task_url,
                number,
            }
        }
        _ => bail!("Either --queue-url or both --job-url and --build are required"),
    };

    run_tracking(config, client, executable, options.summary).await
}

/// Follow a root execution and its pipeline until the run completes
pub async fn run_tracking(
    config: TaskOptions,
    client: Arc<dyn RemoteClient>,
    executable: QueuedExecutable,
    summary_path: Option<PathBuf>,
) -> anyhow::Result<bool> {
    info!("Jenkins job started: {}", executable.executable_url);

    let mut queue = JobQueue::new(config, client);
    queue.add_root(&executable.task_url, &executable.name, executable.number);
    let summary = queue.run().await?;

    println!();
    println!("{}", summary.message);
    println!("Result: {}", summary.root_result);

    if let Some(path) = summary_path {
        std::fs::write(&path, &summary.report)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        info!("Summary written to {}", path.display());
    }

    Ok(summary.succeeded)
}
