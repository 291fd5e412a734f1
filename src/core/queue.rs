use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::core::report::render_summary;
use crate::core::scheduler::{Scheduler, Task};
use crate::core::search::JobSearch;
use crate::core::urls::{add_url_segment, job_identifier};
use crate::core::RemoteClient;
use crate::error::{Result, TrackError};
use crate::models::{is_valid_transition, Job, JobId, JobOutcome, JobState, TaskOptions};

/// Flags the engine changes while running
#[derive(Debug, Clone)]
pub struct RunFlags {
    pub capture_console: bool,
    pub capture_pipeline: bool,
    /// Run-wide failure recorded by the engine (authorization loss)
    pub failure: Option<String>,
}

/// Outcome of a whole tracking run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub succeeded: bool,
    pub message: String,
    /// Result string of the root job
    pub root_result: String,
    /// Markdown rendering of the tracked job tree
    pub report: String,
}

/// Registry of every tracked job and driver of all state progress
///
/// Jobs live in an arena and reference each other by [`JobId`]. Each job and
/// each search arms its own timer; [`JobQueue::tick`] runs whatever is due,
/// one step at a time, so registry and cause-table updates never interleave.
pub struct JobQueue {
    pub(crate) options: TaskOptions,
    pub(crate) flags: RunFlags,
    pub(crate) client: Arc<dyn RemoteClient>,
    pub(crate) jobs: Vec<Job>,
    pub(crate) searches: BTreeMap<String, JobSearch>,
    scheduler: Scheduler,
    /// Holder of the console; everyone else buffers
    emitter: Option<JobId>,
    /// Jobs in the order they started streaming
    start_order: Vec<JobId>,
    /// Jobs before this index in `start_order` are finished and flushed
    flush_cursor: usize,
    sink: Box<dyn Write + Send>,
}

impl JobQueue {
    pub fn new(options: TaskOptions, client: Arc<dyn RemoteClient>) -> Self {
        Self::with_sink(options, client, Box::new(io::stdout()))
    }

    /// Queue writing remote console text to `sink`
    pub fn with_sink(
        options: TaskOptions,
        client: Arc<dyn RemoteClient>,
        sink: Box<dyn Write + Send>,
    ) -> Self {
        let options = options.normalized();
        let flags = RunFlags {
            capture_console: options.tracking.capture_console,
            capture_pipeline: options.tracking.capture_pipeline,
            failure: None,
        };
        Self {
            options,
            flags,
            client,
            jobs: Vec::new(),
            searches: BTreeMap::new(),
            scheduler: Scheduler::new(),
            emitter: None,
            start_order: Vec::new(),
            flush_cursor: 0,
            sink,
        }
    }

    /// Create the root job for an execution the server already started
    pub fn add_root(&mut self, task_url: &str, name: &str, executable_number: u64) -> JobId {
        let id = self.register(None, task_url, name);
        self.jobs[id.0].executable_number = Some(executable_number);
        id
    }

    /// Add a job to the registry, its parent's children and its definition's search
    pub fn register(&mut self, parent: Option<JobId>, task_url: &str, name: &str) -> JobId {
        let id = JobId(self.jobs.len());
        let identifier = job_identifier(task_url, &self.options.server.url);
        self.searches
            .entry(identifier.clone())
            .or_insert_with(|| JobSearch::new(task_url, &identifier));
        self.jobs
            .push(Job::new(id, parent, task_url, identifier, name));
        if let Some(parent) = parent {
            self.jobs[parent.0].children.push(id);
        }
        debug!("{} created", self.describe(id));
        id
    }

    pub fn root(&self) -> Option<JobId> {
        if self.jobs.is_empty() {
            None
        } else {
            Some(JobId(0))
        }
    }

    pub fn job(&self, id: JobId) -> &Job {
        &self.jobs[id.0]
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn search(&self, identifier: &str) -> Option<&JobSearch> {
        self.searches.get(identifier)
    }

    pub fn flags(&self) -> &RunFlags {
        &self.flags
    }

    pub fn options(&self) -> &TaskOptions {
        &self.options
    }

    /// Job tracking the given execution of a definition
    pub fn find_job(&self, identifier: &str, executable_number: u64) -> Option<JobId> {
        let identifier = identifier.trim_start_matches('/');
        self.jobs
            .iter()
            .find(|j| j.identifier == identifier && j.executable_number == Some(executable_number))
            .map(|j| j.id)
    }

    /// Follow joins to the job that actually ran
    pub fn working_job(&self, id: JobId) -> JobId {
        let mut current = id;
        while let (JobState::Joined, Some(main)) = (self.jobs[current.0].state, self.jobs[current.0].joined) {
            current = main;
        }
        current
    }

    /// `(state:name:number, p:parent, j:joined)`
    pub fn describe(&self, id: JobId) -> String {
        let job = &self.jobs[id.0];
        let number = job
            .executable_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-1".to_string());
        let mut text = format!("({}:{}:{}", job.state, job.name, number);
        if let Some(parent) = job.parent {
            text.push_str(&format!(", p:{}", self.describe(parent)));
        }
        if let Some(joined) = job.joined {
            text.push_str(&format!(", j:{}", self.describe(joined)));
        }
        text.push(')');
        text
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.options.tracking.poll_interval()
    }

    /// Every state change goes through here
    pub(crate) fn change_state(&mut self, id: JobId, next: JobState) -> Result<()> {
        let current = self.jobs[id.0].state;
        if current == next {
            return Ok(());
        }
        debug!("{} state changed from {} to {}", self.describe(id), current, next);
        if !is_valid_transition(current, next) {
            return Err(TrackError::InvalidTransition {
                from: current,
                to: next,
                job: self.describe(id),
            });
        }
        self.jobs[id.0].state = next;
        if next == JobState::Streaming {
            self.start_order.push(id);
        }
        Ok(())
    }

    /// End a work step: optionally change state, then wait `delay` before the next one
    pub(crate) fn stop_work(
        &mut self,
        id: JobId,
        delay: Duration,
        state: Option<JobState>,
    ) -> Result<()> {
        if let Some(state) = state {
            if state != self.jobs[id.0].state {
                self.change_state(id, state)?;
                if !self.jobs[id.0].is_active() {
                    self.flush_consoles()?;
                }
            }
        }
        self.jobs[id.0].timer.delay = delay;
        Ok(())
    }

    pub(crate) fn execution_url(&self, id: JobId) -> Result<String> {
        self.jobs[id.0]
            .executable_url
            .clone()
            .ok_or_else(|| TrackError::IllegalStreaming(self.describe(id)))
    }

    pub(crate) fn record_execution(&mut self, id: JobId, number: u64) {
        let job = &mut self.jobs[id.0];
        job.executable_number = Some(number);
        job.executable_url = Some(add_url_segment(&job.task_url, &number.to_string()));
    }

    // --- console arbitration -------------------------------------------------

    /// Job currently allowed to write console text
    pub fn find_active_emitter(&self) -> Option<JobId> {
        self.emitter.filter(|id| self.jobs[id.0].is_active())
    }

    /// Append console text to a job, writing it straight through if it holds the console
    pub(crate) fn console_log(&mut self, id: JobId, text: &str) -> Result<()> {
        self.jobs[id.0].console.push(text);
        if self.emitter == Some(id) {
            self.write_pending(id)?;
        }
        Ok(())
    }

    fn write_pending(&mut self, id: JobId) -> Result<()> {
        let job = &mut self.jobs[id.0];
        let pending = job.console.pending();
        if !pending.is_empty() {
            self.sink.write_all(pending.as_bytes())?;
            self.sink.flush()?;
        }
        job.console.mark_emitted();
        Ok(())
    }

    /// Hand the console to the next job in start order once the holder is done
    ///
    /// Finished jobs are flushed in full, in the order they started; the first
    /// job still running becomes the new holder.
    pub fn flush_consoles(&mut self) -> Result<()> {
        if self.find_active_emitter().is_some() {
            return Ok(());
        }
        if let Some(previous) = self.emitter.take() {
            self.write_pending(previous)?;
        }
        while self.flush_cursor < self.start_order.len() {
            let id = self.start_order[self.flush_cursor];
            self.write_pending(id)?;
            if self.jobs[id.0].is_active() {
                self.emitter = Some(id);
                return Ok(());
            }
            self.flush_cursor += 1;
        }
        Ok(())
    }

    fn flush_all(&mut self) -> Result<()> {
        self.emitter = None;
        let order: Vec<JobId> = self
            .start_order
            .iter()
            .copied()
            .chain(self.jobs.iter().map(|j| j.id))
            .collect();
        for id in order {
            self.write_pending(id)?;
        }
        Ok(())
    }

    // --- scheduling ----------------------------------------------------------

    /// Jobs waiting on the search for `identifier` whose parent has finished
    pub(crate) fn search_targets(&self, identifier: &str) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|j| j.identifier == identifier && j.state == JobState::Locating)
            .filter(|j| match j.parent {
                Some(p) => self.jobs[p.0].state == JobState::Done,
                None => true,
            })
            .map(|j| j.id)
            .collect()
    }

    fn needs_job_timer(job: &Job) -> bool {
        job.failure.is_none()
            && !job.timer.armed
            && job.is_active()
            && job.state != JobState::Locating
    }

    fn arm_timers(&mut self, now: Instant) {
        for index in 0..self.jobs.len() {
            let job = &mut self.jobs[index];
            if Self::needs_job_timer(job) {
                job.timer.armed = true;
                self.scheduler
                    .schedule(Task::Job(job.id), now + job.timer.delay);
            }
        }

        let mut keys: Vec<String> = Vec::new();
        for job in &self.jobs {
            if job.state == JobState::Locating && !keys.contains(&job.identifier) {
                keys.push(job.identifier.clone());
            }
        }
        for key in keys {
            if self.search_targets(&key).is_empty() {
                continue;
            }
            if let Some(search) = self.searches.get_mut(&key) {
                if !search.timer.armed {
                    search.timer.armed = true;
                    self.scheduler
                        .schedule(Task::Search(key.clone()), now + search.timer.delay);
                }
            }
        }
    }

    /// Run every job and search step that is due at `now`
    pub async fn tick(&mut self, now: Instant) -> Result<()> {
        self.arm_timers(now);
        for task in self.scheduler.pop_due(now) {
            match task {
                Task::Job(id) => {
                    self.jobs[id.0].timer.armed = false;
                    self.advance(id).await?;
                }
                Task::Search(key) => {
                    if let Some(search) = self.searches.get_mut(&key) {
                        search.timer.armed = false;
                    }
                    self.locate_execution(&key).await?;
                }
            }
        }
        self.flush_consoles()?;
        self.arm_timers(now);
        Ok(())
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.scheduler.next_due()
    }

    fn has_failed_jobs(&self) -> bool {
        let fail_on_unstable = self.options.tracking.fail_on_unstable;
        self.jobs.iter().any(|j| {
            j.failure.is_some()
                || j.state == JobState::Killed
                || (j.state == JobState::Done && j.outcome(fail_on_unstable) == JobOutcome::Failed)
        })
    }

    /// `Some(true)` when everything finished, `Some(false)` when the run failed
    pub fn completion(&self) -> Option<bool> {
        if self.jobs.is_empty() {
            return None;
        }
        if self.has_failed_jobs() {
            return Some(false);
        }
        if self.flags.failure.is_some() && !self.jobs.iter().any(|j| j.state.is_running()) {
            return Some(false);
        }
        if !self.jobs.iter().any(Job::is_active) {
            return Some(true);
        }
        None
    }

    /// Drive the jobs until the run completes
    pub async fn run(&mut self) -> Result<RunSummary> {
        loop {
            let now = Instant::now();
            self.tick(now).await?;
            if let Some(complete) = self.completion() {
                return self.finish_run(complete);
            }
            let wake = self
                .scheduler
                .next_due()
                .unwrap_or(now + self.poll_interval());
            tokio::time::sleep_until(wake).await;
        }
    }

    fn finish_run(&mut self, complete: bool) -> Result<RunSummary> {
        self.flush_all()?;

        let tracking = &self.options.tracking;
        let mut message = match (complete, tracking.capture_pipeline, tracking.capture_console) {
            (true, true, _) => "Jenkins pipeline complete".to_string(),
            (true, false, true) => "Jenkins job complete".to_string(),
            (true, false, false) => "Jenkins job queued".to_string(),
            (false, true, _) => "Jenkins pipeline failed".to_string(),
            (false, false, true) => "Jenkins job failed".to_string(),
            (false, false, false) => "Jenkins job failed to queue".to_string(),
        };
        if let Some(reason) = &self.flags.failure {
            message = format!("{}: {}", message, reason);
        }

        let root_result = self
            .root()
            .map(|root| self.jobs[root.0].result_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let succeeded = complete && self.flags.failure.is_none();
        info!("{} ({})", message, root_result);

        Ok(RunSummary {
            succeeded,
            message,
            root_result,
            report: render_summary(self),
        })
    }
}
