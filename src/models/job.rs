use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::models::JobState;

/// Handle of a job inside the coordinator's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Result and start timestamp of a finished execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Result code as reported by the server (SUCCESS, UNSTABLE, FAILURE, ...)
    pub result: String,
    /// Milliseconds since the epoch
    pub timestamp: i64,
}

/// Success/failure signal for a tracked job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    Failed,
}

/// Console text collected for a job and not yet written out
#[derive(Debug, Clone, Default)]
pub struct ConsoleBuffer {
    pending: String,
}

impl ConsoleBuffer {
    pub fn push(&mut self, text: &str) {
        self.pending.push_str(text);
    }

    /// Text not yet written to the console sink
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Drop the text once it has been written out
    pub fn mark_emitted(&mut self) {
        self.pending.clear();
    }
}

/// Work timer of a job or search: armed entries sit in the scheduler
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    pub armed: bool,
    pub delay: Duration,
}

/// One tracked execution, or the local intent to find one
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    /// Display name of the job definition
    pub name: String,
    /// URL of the job definition
    pub task_url: String,
    /// Definition path relative to the server, e.g. `job/folder/job/name/`
    pub identifier: String,
    pub state: JobState,
    pub executable_url: Option<String>,
    pub executable_number: Option<u64>,
    /// Job that pipelines to this one
    pub parent: Option<JobId>,
    /// Jobs this one pipelines to, in discovery order
    pub children: Vec<JobId>,
    /// Main job this one was folded into
    pub joined: Option<JobId>,
    pub console: ConsoleBuffer,
    /// Byte offset for the next progressive log request
    pub console_offset: u64,
    pub retries: u32,
    /// Set on leaving Finishing with a result
    pub result: Option<ExecutionResult>,
    /// Tracking gave up on this job
    pub failure: Option<String>,
    /// Definition details fetched and downstream children registered
    pub expanded: bool,
    pub timer: Timer,
}

impl Job {
    pub fn new(
        id: JobId,
        parent: Option<JobId>,
        task_url: impl Into<String>,
        identifier: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            task_url: task_url.into(),
            identifier: identifier.into(),
            state: JobState::New,
            executable_url: None,
            executable_number: None,
            parent,
            children: Vec::new(),
            joined: None,
            console: ConsoleBuffer::default(),
            console_offset: 0,
            retries: 0,
            result: None,
            failure: None,
            expanded: false,
            timer: Timer::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    fn result_code(&self) -> Option<String> {
        self.result.as_ref().map(|r| r.result.to_uppercase())
    }

    /// Map the terminal state and result code to success or failure
    pub fn outcome(&self, fail_on_unstable: bool) -> JobOutcome {
        match self.state {
            JobState::Queued => JobOutcome::Succeeded,
            JobState::Done => match self.result_code().as_deref() {
                Some("SUCCESS") => JobOutcome::Succeeded,
                Some("UNSTABLE") if !fail_on_unstable => JobOutcome::Succeeded,
                _ => JobOutcome::Failed,
            },
            _ => JobOutcome::Failed,
        }
    }

    /// Human readable result
    pub fn result_string(&self) -> String {
        match self.state {
            JobState::Queued => "Queued".to_string(),
            JobState::Done => match self.result_code() {
                Some(code) => match code.as_str() {
                    "SUCCESS" => "Succeeded".to_string(),
                    "UNSTABLE" => "Unstable".to_string(),
                    "FAILURE" => "Failed".to_string(),
                    "NOT_BUILT" => "Not built".to_string(),
                    "ABORTED" => "Aborted".to_string(),
                    _ => code,
                },
                None => "Unknown".to_string(),
            },
            _ => "Unknown".to_string(),
        }
    }
}
