use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a tracked job
///
/// ```text
/// New         -> Locating, Streaming, Joined, Cut
/// Locating    -> Streaming, Joined, Cut
/// Streaming   -> Finishing
/// Finishing   -> Downloading, Queued, Done, Killed
/// Downloading -> Done
/// ```
///
/// `Done`, `Joined`, `Queued`, `Cut` and `Killed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// The job is yet to begin
    New,
    /// The execution for this job is being located
    Locating,
    /// The job is running and its console output is streaming
    Streaming,
    /// The job has run and its result is being read
    Finishing,
    /// The job's results archive is being downloaded
    Downloading,
    /// The job has run and is done
    Done,
    /// Folded into another execution of the same definition
    Joined,
    /// Queued only, completion is not tracked
    Queued,
    /// Cut from the pipeline because its slot was filled by a joined sibling
    Cut,
    /// Tracking failed while reading the result
    Killed,
}

impl JobState {
    pub const ALL: [JobState; 10] = [
        JobState::New,
        JobState::Locating,
        JobState::Streaming,
        JobState::Finishing,
        JobState::Downloading,
        JobState::Done,
        JobState::Joined,
        JobState::Queued,
        JobState::Cut,
        JobState::Killed,
    ];

    /// States reachable from this one
    pub fn successors(&self) -> &'static [JobState] {
        match self {
            JobState::New => &[
                JobState::Locating,
                JobState::Streaming,
                JobState::Joined,
                JobState::Cut,
            ],
            JobState::Locating => &[JobState::Streaming, JobState::Joined, JobState::Cut],
            JobState::Streaming => &[JobState::Finishing],
            JobState::Finishing => &[
                JobState::Downloading,
                JobState::Queued,
                JobState::Done,
                JobState::Killed,
            ],
            JobState::Downloading => &[JobState::Done],
            JobState::Done
            | JobState::Joined
            | JobState::Queued
            | JobState::Cut
            | JobState::Killed => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    /// Job still needs work from the coordinator
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Execution has not been identified yet
    pub fn is_unresolved(&self) -> bool {
        matches!(self, JobState::New | JobState::Locating)
    }

    /// The job will never run on its own
    pub fn is_folded(&self) -> bool {
        matches!(self, JobState::Joined | JobState::Cut)
    }

    /// An execution exists for this job (running or already finished)
    pub fn has_run(&self) -> bool {
        matches!(
            self,
            JobState::Streaming
                | JobState::Finishing
                | JobState::Downloading
                | JobState::Queued
                | JobState::Done
                | JobState::Killed
        )
    }

    /// Currently polling the server for console, result or artifacts
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            JobState::Streaming | JobState::Finishing | JobState::Downloading
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::New => "New",
            JobState::Locating => "Locating",
            JobState::Streaming => "Streaming",
            JobState::Finishing => "Finishing",
            JobState::Downloading => "Downloading",
            JobState::Done => "Done",
            JobState::Joined => "Joined",
            JobState::Queued => "Queued",
            JobState::Cut => "Cut",
            JobState::Killed => "Killed",
        };
        f.write_str(name)
    }
}

/// Check a state change against the transition table
pub fn is_valid_transition(current: JobState, next: JobState) -> bool {
    current.successors().contains(&next)
}
