use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::core::queue::JobQueue;
use crate::core::urls::add_url_segment;
use crate::error::{Result, TrackError};
use crate::models::{BuildCauses, Cause, JobId, TaskBody, Timer};

const DEFINITION_TREE: &str = "/api/json?tree=downstreamProjects[name,url,color],lastBuild[number]";
const CAUSES_TREE: &str =
    "/api/json?tree=actions[causes[shortDescription,upstreamBuild,upstreamProject,upstreamUrl]],timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    Backward,
    Forward,
}

/// Discovery state for one job definition, shared by every job of that definition
#[derive(Debug, Clone)]
pub struct JobSearch {
    pub task_url: String,
    pub identifier: String,
    /// Definition details; `Some` once initialized
    pub task_body: Option<TaskBody>,
    /// Causes of every probed execution, by execution number
    pub found_causes: BTreeMap<u64, Vec<Cause>>,
    pub initial_search_build_number: u64,
    pub next_search_build_number: u64,
    pub search_direction: SearchDirection,
    pub timer: Timer,
}

impl JobSearch {
    pub fn new(task_url: &str, identifier: &str) -> Self {
        Self {
            task_url: task_url.to_string(),
            identifier: identifier.to_string(),
            task_body: None,
            found_causes: BTreeMap::new(),
            initial_search_build_number: 1,
            next_search_build_number: 1,
            search_direction: SearchDirection::Backward,
            timer: Timer::default(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.task_body.is_some()
    }

    /// Cache the definition and start the search at its last build, walking backward
    pub fn initialize(&mut self, body: TaskBody) {
        let start = body.last_build.as_ref().map(|b| b.number).unwrap_or(1);
        self.initial_search_build_number = start;
        self.next_search_build_number = start;
        self.search_direction = SearchDirection::Backward;
        self.task_body = Some(body);
    }

    /// Move to the next build number to probe
    ///
    /// Walking backward stops at build 1 or at a build older than the root
    /// job; the walk then restarts forward from one past the initial build.
    pub fn advance_cursor(&mut self, probed_timestamp: i64, root_timestamp: Option<i64>) {
        match self.search_direction {
            SearchDirection::Backward => {
                let predates_root = root_timestamp.is_some_and(|root| probed_timestamp < root);
                if self.next_search_build_number <= 1 || predates_root {
                    self.turn_forward();
                } else {
                    self.next_search_build_number -= 1;
                }
            }
            SearchDirection::Forward => self.next_search_build_number += 1,
        }
    }

    fn turn_forward(&mut self) {
        self.search_direction = SearchDirection::Forward;
        self.next_search_build_number = self.initial_search_build_number + 1;
    }
}

impl JobQueue {
    /// Fetch the definition of `key` once; `Ok(false)` means try again later
    pub(crate) async fn initialize_search(&mut self, key: &str) -> Result<bool> {
        let url = match self.searches.get(key) {
            Some(search) if search.is_initialized() => return Ok(true),
            Some(search) => add_url_segment(&search.task_url, DEFINITION_TREE),
            None => return Ok(false),
        };
        debug!("getting job task URL: {}", url);

        let response = match self.client.get(&url).await {
            Ok(response) => response,
            Err(e) if e.is_transient() => {
                debug!("{}", e);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        if response.status != 200 {
            return Err(TrackError::UnexpectedStatus {
                context: format!("Unable to retrieve job: {}", key),
                status: response.status,
                message: response.text(),
            });
        }
        let body: TaskBody =
            serde_json::from_slice(&response.body).map_err(|e| TrackError::parse(&url, e))?;

        if let Some(search) = self.searches.get_mut(key) {
            // another step may have finished the fetch first
            if !search.is_initialized() {
                search.initialize(body);
            }
        }
        Ok(true)
    }

    /// Elect the main job and the secondaries for execution `number` of definition `key`
    ///
    /// Causes whose upstream job already ran vote for their child of this
    /// definition. A child already running is the main job; otherwise the
    /// first unresolved candidate wins. Children of upstream jobs that were
    /// folded can never run, so they join the main job.
    pub fn determine_main_job(
        &self,
        key: &str,
        number: u64,
    ) -> Result<(Option<JobId>, Vec<JobId>)> {
        let causes = self
            .searches
            .get(key)
            .and_then(|s| s.found_causes.get(&number))
            .ok_or_else(|| TrackError::UnknownExecution {
                number,
                identifier: key.to_string(),
            })?;

        let mut ran: Vec<JobId> = Vec::new();
        let mut wont_run: Vec<JobId> = Vec::new();
        for cause in causes {
            let (Some(url), Some(build)) = (&cause.upstream_url, cause.upstream_build) else {
                continue;
            };
            let Some(upstream) = self.find_job(url, build) else {
                continue;
            };
            if ran.contains(&upstream) || wont_run.contains(&upstream) {
                continue;
            }
            let state = self.jobs[upstream.0].state;
            if state.has_run() {
                ran.push(upstream);
            } else if state.is_folded() {
                wont_run.push(upstream);
            }
        }

        let mut main: Option<JobId> = None;
        let mut potentials: Vec<JobId> = Vec::new();
        for upstream in ran {
            let Some(child) = self.child_of_definition(upstream, key) else {
                continue;
            };
            let state = self.jobs[child.0].state;
            if state.has_run() {
                match main {
                    Some(existing) if existing != child => {
                        return Err(TrackError::MultipleMainJobs(self.describe(child)));
                    }
                    _ => main = Some(child),
                }
            } else if state.is_unresolved() && !potentials.contains(&child) {
                potentials.push(child);
            }
        }

        if main.is_none() && !potentials.is_empty() {
            main = Some(potentials.remove(0));
        }

        let mut secondaries = Vec::new();
        if main.is_some() {
            secondaries = potentials;
            for upstream in wont_run {
                if let Some(child) = self.child_of_definition(upstream, key) {
                    if !secondaries.contains(&child) && Some(child) != main {
                        secondaries.push(child);
                    }
                }
            }
        }
        Ok((main, secondaries))
    }

    fn child_of_definition(&self, parent: JobId, key: &str) -> Option<JobId> {
        self.jobs[parent.0]
            .children
            .iter()
            .copied()
            .find(|c| self.jobs[c.0].identifier == key)
    }

    /// Settle `id` from what is already known; `true` when its fate is decided
    pub(crate) fn resolve_if_known(&mut self, id: JobId) -> Result<bool> {
        let job = &self.jobs[id.0];
        if !job.state.is_unresolved() {
            return Ok(true);
        }
        let Some(parent) = job.parent else {
            let number = job
                .executable_number
                .ok_or_else(|| TrackError::IllegalStreaming(self.describe(id)))?;
            self.set_streaming(id, number)?;
            return Ok(true);
        };
        if self.jobs[parent.0].state.is_folded() {
            self.cut(id)?;
            return Ok(true);
        }

        let key = job.identifier.clone();
        let numbers: Vec<u64> = self
            .searches
            .get(&key)
            .map(|s| s.found_causes.keys().copied().collect())
            .unwrap_or_default();
        for number in numbers {
            let (main, secondaries) = self.determine_main_job(&key, number)?;
            let Some(main) = main else {
                continue;
            };
            if main == id {
                self.set_streaming(id, number)?;
                return Ok(true);
            }
            if secondaries.contains(&id) {
                self.set_joined(id, main)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn stop_search(&mut self, key: &str, delay: Duration) {
        if let Some(search) = self.searches.get_mut(key) {
            search.timer.delay = delay;
        }
    }

    /// One probe of the bidirectional execution search for definition `key`
    pub(crate) async fn locate_execution(&mut self, key: &str) -> Result<()> {
        let mut found_all = true;
        for id in self.search_targets(key) {
            let found = self.resolve_if_known(id)?;
            found_all = found_all && found;
        }
        if found_all {
            self.stop_search(key, Duration::ZERO);
            return Ok(());
        }

        let (url, number) = match self.searches.get(key) {
            Some(search) => {
                let number = search.next_search_build_number;
                let path = format!("{}{}", number, CAUSES_TREE);
                (add_url_segment(&search.task_url, &path), number)
            }
            None => return Ok(()),
        };
        debug!("pipeline, locating child execution URL: {}", url);

        let poll = self.poll_interval();
        let response = match self.client.get(&url).await {
            Ok(response) => response,
            Err(e) if e.is_transient() => {
                debug!("{}", e);
                self.stop_search(key, poll);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match response.status {
            404 => {
                if let Some(search) = self.searches.get_mut(key) {
                    // a build removed from history; the forward walk picks up from here
                    if search.search_direction == SearchDirection::Backward {
                        search.turn_forward();
                    }
                }
                self.stop_search(key, poll);
                Ok(())
            }
            200 => {
                let body: BuildCauses = serde_json::from_slice(&response.body)
                    .map_err(|e| TrackError::parse(&url, e))?;
                if let Some(search) = self.searches.get_mut(key) {
                    search.found_causes.insert(number, body.causes());
                }

                let (main, _) = self.determine_main_job(key, number)?;
                if let Some(main) = main {
                    self.set_streaming(main, number)?;
                }

                let root_timestamp = self
                    .root()
                    .and_then(|root| self.jobs[root.0].result.as_ref())
                    .map(|r| r.timestamp);
                if let Some(search) = self.searches.get_mut(key) {
                    search.advance_cursor(body.timestamp, root_timestamp);
                }
                self.stop_search(key, Duration::ZERO);
                Ok(())
            }
            status => Err(TrackError::UnexpectedStatus {
                context: "Job pipeline tracking failed to read downstream project".to_string(),
                status,
                message: response.text(),
            }),
        }
    }
}
