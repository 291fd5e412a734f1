//! Queueing a job on the server and waiting for the queue item to become an execution

use std::time::Duration;
use tracing::{debug, info};

use crate::core::urls::{add_url_segment, job_path};
use crate::core::RemoteClient;
use crate::error::{Result, TrackError};
use crate::models::{ConfigError, QueueItem, TaskOptions};

const CRUMB_PATH: &str = "/crumbIssuer/api/xml?xpath=concat(//crumbRequestField,%22:%22,//crumb)";

/// Execution a queue item turned into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedExecutable {
    pub task_url: String,
    pub name: String,
    pub executable_url: String,
    pub number: u64,
}

fn is_transient(err: &TrackError) -> bool {
    matches!(err, TrackError::Remote(e) if e.is_transient())
}

/// Fetch the CSRF crumb as `field:value`; `None` when the server issues none
pub async fn get_crumb(client: &dyn RemoteClient, server_url: &str) -> Result<Option<String>> {
    let url = add_url_segment(server_url, CRUMB_PATH);
    debug!("crumbRequestUrl: {}", url);
    let response = client.get(&url).await?;
    match response.status {
        404 => {
            debug!("crumb endpoint not found");
            Ok(None)
        }
        200 => Ok(Some(response.text().trim().to_string())),
        status => Err(TrackError::UnexpectedStatus {
            context: "Crumb request failed.".to_string(),
            status,
            message: response.text(),
        }),
    }
}

/// Parse `name=value` lines into form fields
pub fn parse_job_parameters(lines: &[String]) -> std::result::Result<Vec<(String, String)>, ConfigError> {
    let mut fields = Vec::with_capacity(lines.len());
    for line in lines {
        let trimmed = line.trim();
        match trimmed.find('=') {
            Some(idx) if idx > 0 => {
                let name = trimmed[..idx].trim().to_string();
                let value = trimmed[idx + 1..].trim().to_string();
                fields.push((name, value));
            }
            _ => return Err(ConfigError::InvalidParameter(line.clone())),
        }
    }
    Ok(fields)
}

fn crumb_header(crumb: &str) -> Vec<(String, String)> {
    match crumb.split_once(':') {
        Some((name, value)) if !name.is_empty() => vec![(name.to_string(), value.to_string())],
        _ => Vec::new(),
    }
}

/// Queue the configured job and return the queue item's API URL
pub async fn submit_job(
    client: &dyn RemoteClient,
    options: &TaskOptions,
    crumb: Option<&str>,
) -> Result<String> {
    let name = options.job.name.as_deref().ok_or(ConfigError::MissingJobName)?;
    let (endpoint, form) = if options.job.parameterized {
        ("/buildWithParameters", parse_job_parameters(&options.job.parameters)?)
    } else {
        ("/build", Vec::new())
    };
    let url = add_url_segment(&options.server.url, &format!("{}{}", job_path(name), endpoint));
    let headers = crumb.map(crumb_header).unwrap_or_default();
    debug!("submitting job: {} ({} parameters)", url, form.len());

    let response = client.post_form(&url, &form, &headers).await?;
    if response.status != 201 {
        return Err(TrackError::UnexpectedStatus {
            context: "Job creation failed.".to_string(),
            status: response.status,
            message: response.text(),
        });
    }
    let location = response
        .header("location")
        .ok_or_else(|| TrackError::parse(&url, "response has no Location header"))?;
    Ok(add_url_segment(location, "api/json"))
}

async fn submit_once(client: &dyn RemoteClient, options: &TaskOptions) -> Result<String> {
    let crumb = get_crumb(client, &options.server.url).await?;
    submit_job(client, options, crumb.as_deref()).await
}

/// Submit the job, trying again after connection resets
pub async fn poll_submit_job(client: &dyn RemoteClient, options: &TaskOptions) -> Result<String> {
    let poll = options.tracking.poll_interval();
    loop {
        match submit_once(client, options).await {
            Ok(queue_url) => {
                info!("Jenkins job queued: {}", queue_url);
                return Ok(queue_url);
            }
            Err(e) if is_transient(&e) => {
                debug!("{}", e);
                tokio::time::sleep(poll).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Wait for a queue item to start executing
pub async fn poll_queue_item(
    client: &dyn RemoteClient,
    queue_url: &str,
    poll: Duration,
) -> Result<QueuedExecutable> {
    loop {
        let response = match client.get(queue_url).await {
            Ok(response) => response,
            Err(e) if e.is_transient() => {
                debug!("{}", e);
                tokio::time::sleep(poll).await;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if response.status != 200 {
            return Err(TrackError::UnexpectedStatus {
                context: "Job progress tracking failed to read job queue".to_string(),
                status: response.status,
                message: response.text(),
            });
        }
        let item: QueueItem = serde_json::from_slice(&response.body)
            .map_err(|e| TrackError::parse(queue_url, e))?;
        if item.is_cancelled() {
            return Err(TrackError::Cancelled);
        }
        match (item.task, item.executable) {
            (Some(task), Some(executable)) => {
                return Ok(QueuedExecutable {
                    task_url: task.url,
                    name: task.name,
                    executable_url: executable.url,
                    number: executable.number,
                });
            }
            // not started yet
            _ => tokio::time::sleep(poll).await,
        }
    }
}
