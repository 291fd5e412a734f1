//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jenkins_queue::core::{HttpResponse, JobQueue, RemoteClient, RunSummary};
use jenkins_queue::error::RemoteError;
use jenkins_queue::models::TaskOptions;

pub const SERVER: &str = "http://jenkins/";

type Reply = Result<HttpResponse, RemoteError>;

/// Scripted Jenkins server
///
/// Each URL answers with its queued replies in order; the last reply repeats.
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct FakeServer {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<String>>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, url: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn on(&self, url: &str, response: HttpResponse) {
        self.reply(url, Ok(response));
    }

    pub fn on_json(&self, url: &str, json: &str) {
        self.on(url, HttpResponse::new(200, json));
    }

    pub fn on_reset(&self, url: &str) {
        self.reply(url, Err(RemoteError::ConnectionReset("connection reset by peer".to_string())));
    }

    /// Number of requests made to exactly `url`
    pub fn hits(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn answer(&self, url: &str) -> Reply {
        self.requests.lock().unwrap().push(url.to_string());
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(url) {
            Some(replies) if replies.len() > 1 => replies.pop_front().unwrap(),
            Some(replies) if !replies.is_empty() => replies[0].clone(),
            _ => Ok(HttpResponse::new(404, "Not Found")),
        }
    }
}

#[async_trait]
impl RemoteClient for FakeServer {
    async fn get(&self, url: &str) -> Result<HttpResponse, RemoteError> {
        self.answer(url)
    }

    async fn post_form(
        &self,
        url: &str,
        _form: &[(String, String)],
        _headers: &[(String, String)],
    ) -> Result<HttpResponse, RemoteError> {
        self.answer(url)
    }
}

/// Console sink the test can read back
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn test_options() -> TaskOptions {
    let mut options = TaskOptions::default();
    options.server.url = SERVER.to_string();
    options.tracking.poll_interval_ms = 100;
    options.tracking.delay_between_retries = 1;
    options
}

pub fn new_queue(options: TaskOptions, server: &Arc<FakeServer>) -> (JobQueue, SharedBuffer) {
    let sink = SharedBuffer::default();
    let client: Arc<dyn RemoteClient> = server.clone();
    let queue = JobQueue::with_sink(options, client, Box::new(sink.clone()));
    (queue, sink)
}

/// Run the queue, failing the test instead of hanging if it never completes
pub async fn run_to_completion(queue: &mut JobQueue) -> RunSummary {
    tokio::time::timeout(Duration::from_secs(3600), queue.run())
        .await
        .expect("tracking run did not complete")
        .expect("tracking run failed")
}

pub fn task_url(job: &str) -> String {
    format!("{}job/{}/", SERVER, job)
}

pub fn definition_url(job: &str) -> String {
    format!(
        "{}api/json?tree=downstreamProjects[name,url,color],lastBuild[number]",
        task_url(job)
    )
}

pub fn causes_url(job: &str, number: u64) -> String {
    format!(
        "{}{}/api/json?tree=actions[causes[shortDescription,upstreamBuild,upstreamProject,upstreamUrl]],timestamp",
        task_url(job),
        number
    )
}

pub fn console_url(job: &str, number: u64, offset: u64) -> String {
    format!("{}{}/logText/progressiveText/?start={}", task_url(job), number, offset)
}

pub fn result_url(job: &str, number: u64) -> String {
    format!("{}{}/api/json?tree=result,timestamp", task_url(job), number)
}

pub fn zip_url(job: &str, number: u64) -> String {
    format!("{}{}/team-results/zip", task_url(job), number)
}

/// Definition JSON with the given downstream jobs
pub fn definition(downstream: &[&str], last_build: Option<u64>) -> String {
    let projects: Vec<String> = downstream
        .iter()
        .map(|name| format!(r#"{{"name":"{}","url":"{}","color":"blue"}}"#, name, task_url(name)))
        .collect();
    match last_build {
        Some(n) => format!(
            r#"{{"downstreamProjects":[{}],"lastBuild":{{"number":{}}}}}"#,
            projects.join(","),
            n
        ),
        None => format!(r#"{{"downstreamProjects":[{}]}}"#, projects.join(",")),
    }
}

/// Causes JSON naming upstream `(job, build)` pairs
pub fn causes(upstream: &[(&str, u64)], timestamp: i64) -> String {
    let causes: Vec<String> = upstream
        .iter()
        .map(|(job, build)| {
            format!(
                r#"{{"shortDescription":"Started by upstream project","upstreamProject":"{}","upstreamUrl":"job/{}/","upstreamBuild":{}}}"#,
                job, job, build
            )
        })
        .collect();
    format!(
        r#"{{"actions":[{{"_class":"hudson.model.ParametersAction"}},{{"causes":[{}]}}],"timestamp":{}}}"#,
        causes.join(","),
        timestamp
    )
}

/// Console chunk; `next_offset` set means more text follows
pub fn console_chunk(text: &str, next_offset: Option<u64>) -> HttpResponse {
    let response = HttpResponse::new(200, text);
    match next_offset {
        Some(offset) => response
            .with_header("X-More-Data", "true")
            .with_header("X-Text-Size", &offset.to_string()),
        None => response,
    }
}

pub fn result(code: &str, timestamp: i64) -> String {
    format!(r#"{{"result":"{}","timestamp":{}}}"#, code, timestamp)
}

/// Script a job that logs `text` in one chunk and finishes with `code`
pub fn script_execution(server: &FakeServer, job: &str, number: u64, text: &str, code: &str, timestamp: i64) {
    server.on(&console_url(job, number, 0), console_chunk(text, None));
    server.on_json(&result_url(job, number), &result(code, timestamp));
}
