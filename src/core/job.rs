use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::core::artifacts::save_and_extract;
use crate::core::queue::JobQueue;
use crate::core::urls::add_url_segment;
use crate::error::{RemoteError, Result, TrackError};
use crate::models::{ExecutionResult, JobId, JobState, ResultBody};

const DIVIDER: &str =
    "******************************************************************************";

const PROGRESS_FAILURE: &str = "Job progress tracking failed to read job progress";
const RESULT_FAILURE: &str = "Job progress tracking failed to read job result";

fn block_message(message: &str) -> String {
    format!("{}\n{} \n{}\n", DIVIDER, message, DIVIDER)
}

impl JobQueue {
    /// Run one unit of work for a job, chosen by its state
    pub(crate) async fn advance(&mut self, id: JobId) -> Result<()> {
        let (state, expanded) = (self.jobs[id.0].state, self.jobs[id.0].expanded);
        if !expanded && state.is_unresolved() {
            return self.initialize_job(id).await;
        }
        match state {
            JobState::Streaming => self.stream_console(id).await,
            JobState::Finishing => self.finish(id).await,
            JobState::Downloading => self.download_results(id).await,
            // joined or cut by another step while waiting
            _ => self.stop_work(id, self.poll_interval(), None),
        }
    }

    /// Fetch the definition, register downstream jobs and try to settle the job
    async fn initialize_job(&mut self, id: JobId) -> Result<()> {
        let key = self.jobs[id.0].identifier.clone();
        let poll = self.poll_interval();
        if !self.initialize_search(&key).await? {
            return self.stop_work(id, poll, None);
        }

        self.jobs[id.0].expanded = true;
        if self.flags.capture_pipeline {
            let projects = self
                .searches
                .get(&key)
                .and_then(|s| s.task_body.as_ref())
                .map(|body| body.downstream_projects.clone())
                .unwrap_or_default();
            for project in projects.iter().filter(|p| !p.is_disabled()) {
                self.register(Some(id), &project.url, &project.name);
            }
        }

        self.resolve_if_known(id)?;
        let job = &self.jobs[id.0];
        if job.state == JobState::New {
            self.stop_work(id, poll, Some(JobState::Locating))
        } else {
            let delay = job.timer.delay;
            self.stop_work(id, delay, None)
        }
    }

    /// Count a failed request; gives up on the job once the retry budget is spent
    fn retry_or_fail(&mut self, id: JobId, context: &str, cause: &str) -> Result<()> {
        let tracking = &self.options.tracking;
        let (count, delay) = (tracking.retry_count, tracking.retry_delay());
        let job = &mut self.jobs[id.0];
        job.retries += 1;
        if job.retries >= count {
            error!("{}: {}", context, cause);
            job.failure = Some(format!("{}: {}", context, cause));
            return self.stop_work(id, self.poll_interval(), None);
        }
        let retries = job.retries;
        self.console_log(
            id,
            &format!(
                "Connection error. Retrying again in {} seconds. Retry {} out of {}\n",
                delay.as_secs(),
                retries,
                count
            ),
        )?;
        self.stop_work(id, delay, None)
    }

    async fn stream_console(&mut self, id: JobId) -> Result<()> {
        let job = &self.jobs[id.0];
        let path = format!("/logText/progressiveText/?start={}", job.console_offset);
        let url = add_url_segment(&self.execution_url(id)?, &path);
        debug!("{} tracking progress of job URL: {}", self.describe(id), url);
        let poll = self.poll_interval();

        let response = match self.client.get(&url).await {
            Ok(response) => response,
            Err(e) => return self.retry_or_fail(id, PROGRESS_FAILURE, &e.to_string()),
        };
        match response.status {
            404 => self.stop_work(id, poll, None),
            401 => {
                error!(
                    "{}\nHttpResponse.statusCode={}\nHttpResponse.body={}",
                    PROGRESS_FAILURE,
                    response.status,
                    response.text()
                );
                self.flags.capture_console = false;
                self.flags.capture_pipeline = false;
                self.flags.failure = Some(PROGRESS_FAILURE.to_string());
                self.stop_work(id, Duration::ZERO, Some(JobState::Finishing))
            }
            200 => {
                self.console_log(id, &response.text())?;
                if response.header("x-more-data") == Some("true") {
                    let job = &mut self.jobs[id.0];
                    let size = response.header("x-text-size").unwrap_or_default();
                    job.console_offset = match size.trim().parse::<u64>() {
                        Ok(offset) => offset,
                        Err(e) => {
                            // continue after the bytes just received
                            warn!("unreadable x-text-size {:?} from {}: {}", size, url, e);
                            job.console_offset + response.body.len() as u64
                        }
                    };
                    self.stop_work(id, poll, None)
                } else {
                    self.stop_work(id, Duration::ZERO, Some(JobState::Finishing))
                }
            }
            status => self.retry_or_fail(
                id,
                PROGRESS_FAILURE,
                &format!("HttpResponse.statusCode={} HttpResponse.body={}", status, response.text()),
            ),
        }
    }

    fn set_result(&mut self, id: JobId, body: ResultBody, result: String) -> Result<()> {
        self.jobs[id.0].result = Some(ExecutionResult {
            result,
            timestamp: body.timestamp,
        });
        let job = &self.jobs[id.0];
        let message = format!(
            "Jenkins job finished: {}\n{}",
            job.name,
            job.executable_url.as_deref().unwrap_or_default()
        );
        self.console_log(id, &block_message(&message))
    }

    /// Poll for the execution result
    async fn finish(&mut self, id: JobId) -> Result<()> {
        if !self.flags.capture_console {
            return self.stop_work(id, Duration::ZERO, Some(JobState::Queued));
        }
        let url = add_url_segment(&self.execution_url(id)?, "api/json?tree=result,timestamp");
        debug!("{} tracking completion status of job: {}", self.describe(id), url);
        let poll = self.poll_interval();

        let response = match self.client.get(&url).await {
            Ok(response) => response,
            Err(e) if e.is_transient() => {
                return self.retry_or_fail(id, RESULT_FAILURE, &e.to_string());
            }
            Err(e) => return self.kill(id, e.to_string()),
        };
        match response.status {
            404 => self.stop_work(id, poll, None),
            200 => {
                let body: ResultBody = match serde_json::from_slice(&response.body) {
                    Ok(body) => body,
                    Err(e) => {
                        let cause = TrackError::parse(&url, e).to_string();
                        return self.retry_or_fail(id, RESULT_FAILURE, &cause);
                    }
                };
                match body.result.clone() {
                    Some(result) => {
                        self.set_result(id, body, result)?;
                        let next = if self.options.tracking.download_results {
                            JobState::Downloading
                        } else {
                            JobState::Done
                        };
                        self.stop_work(id, Duration::ZERO, Some(next))
                    }
                    // still running
                    None => self.stop_work(id, poll, None),
                }
            }
            status => {
                error!(
                    "Job was killed because of an response with unexpected status code from Jenkins - {}",
                    status
                );
                self.kill(
                    id,
                    format!(
                        "{}\nHttpResponse.statusCode={}\nHttpResponse.body={}",
                        RESULT_FAILURE,
                        status,
                        response.text()
                    ),
                )
            }
        }
    }

    fn kill(&mut self, id: JobId, reason: String) -> Result<()> {
        self.jobs[id.0].failure = Some(reason);
        self.stop_work(id, Duration::ZERO, Some(JobState::Killed))
    }

    /// Fetch and unpack the result archive; never fails the job
    async fn download_results(&mut self, id: JobId) -> Result<()> {
        let url = add_url_segment(&self.execution_url(id)?, "team-results/zip");
        debug!("downloadResults(), url: {}", url);

        let response = match self.client.get(&url).await {
            Ok(response) => response,
            Err(e) => return self.retry_download(id, e),
        };
        match response.status {
            404 => debug!("no results to download"),
            200 => {
                let dest = self.options.tracking.save_results_to.join(&self.jobs[id.0].name);
                match save_and_extract(&dest, &response.body) {
                    Ok(archive) => debug!("extracted results from {}", archive.display()),
                    Err(e) => warn!(
                        "unable to download results to: {} for Jenkins Job: {}: {}",
                        dest.display(),
                        self.jobs[id.0].executable_url.as_deref().unwrap_or_default(),
                        e
                    ),
                }
            }
            status if status >= 500 => {
                warn!("A Jenkins error occurred while retrieving results. Results could not be downloaded.");
                warn!("{}", response.text());
            }
            _ => {
                warn!("Jenkins results could not be downloaded.");
                warn!("{}", response.text());
            }
        }
        self.stop_work(id, Duration::ZERO, Some(JobState::Done))
    }

    fn retry_download(&mut self, id: JobId, err: RemoteError) -> Result<()> {
        let tracking = &self.options.tracking;
        let (count, delay) = (tracking.retry_count, tracking.retry_delay());
        let job = &mut self.jobs[id.0];
        job.retries += 1;
        if !err.is_transient() || job.retries >= count {
            warn!("Jenkins results could not be downloaded: {}", err);
            return self.stop_work(id, Duration::ZERO, Some(JobState::Done));
        }
        self.stop_work(id, delay, None)
    }

    /// Bind a job to execution `number` and fold sibling candidates into it
    pub(crate) fn set_streaming(&mut self, id: JobId, number: u64) -> Result<()> {
        let state = self.jobs[id.0].state;
        if !self.flags.capture_console {
            if state.is_unresolved() {
                self.record_execution(id, number);
                self.change_state(id, JobState::Streaming)?;
                self.change_state(id, JobState::Finishing)?;
            }
            return Ok(());
        }

        if state.is_unresolved() {
            self.record_execution(id, number);
            self.change_state(id, JobState::Streaming)?;
            let job = &self.jobs[id.0];
            let url = job.executable_url.clone().unwrap_or_default();
            let banner = block_message(&format!("Jenkins job started: {}\n{}", job.name, url));
            self.console_log(id, &banner)?;
            if self.find_active_emitter().is_none() {
                info!("Jenkins job pending: {}", url);
            }
        } else if state.is_folded() {
            return Err(TrackError::IllegalStreaming(self.describe(id)));
        }
        self.join_others_to_me(id)
    }

    fn join_others_to_me(&mut self, id: JobId) -> Result<()> {
        let job = &self.jobs[id.0];
        if job.parent.is_none() {
            return Ok(());
        }
        let Some(number) = job.executable_number else {
            return Err(TrackError::IllegalJoinCall {
                job: self.describe(id),
            });
        };
        let key = job.identifier.clone();
        let (main, secondaries) = self.determine_main_job(&key, number)?;
        if main != Some(id) {
            return Err(TrackError::IllegalJoinCall {
                job: self.describe(id),
            });
        }
        for secondary in secondaries {
            if self.jobs[secondary.0].state.is_unresolved() {
                self.set_joined(secondary, id)?;
            }
        }
        Ok(())
    }

    /// Fold a job into `main` and cut everything below it
    pub fn set_joined(&mut self, id: JobId, main: JobId) -> Result<()> {
        debug!("{}.set_joined({})", self.describe(id), self.describe(main));
        if self.jobs[main.0].state.is_folded() {
            return Err(TrackError::InvalidJoin {
                job: self.describe(id),
                target: self.describe(main),
            });
        }
        self.change_state(id, JobState::Joined)?;
        self.jobs[id.0].joined = Some(main);
        for child in self.jobs[id.0].children.clone() {
            self.cut(child)?;
        }
        Ok(())
    }

    /// Mark a job and all of its descendants as never running
    pub fn cut(&mut self, id: JobId) -> Result<()> {
        self.change_state(id, JobState::Cut)?;
        for child in self.jobs[id.0].children.clone() {
            self.cut(child)?;
        }
        Ok(())
    }
}
