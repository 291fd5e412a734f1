use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration loaded from jenkins-queue.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskOptions {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

/// Server endpoint and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server endpoint URL
    #[serde(default = "default_server_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Accept self-signed or otherwise invalid certificates
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Timeout in seconds for a single request
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            username: None,
            password: None,
            accept_invalid_certs: false,
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_server_url() -> String {
    "http://localhost:8080/".to_string()
}

fn default_timeout() -> u64 {
    60
}

/// Job to submit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job name, folders separated by '/'
    #[serde(default)]
    pub name: Option<String>,
    /// "name=value" lines
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Submit through buildWithParameters
    #[serde(default)]
    pub parameterized: bool,
}

/// Tracking behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Connection failures tolerated per job before giving up
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Seconds to wait before retrying after a connection failure
    #[serde(default = "default_delay_between_retries")]
    pub delay_between_retries: u64,
    /// Stream the console and wait for the result
    #[serde(default = "default_true")]
    pub capture_console: bool,
    /// Also track downstream jobs (requires capture_console)
    #[serde(default = "default_true")]
    pub capture_pipeline: bool,
    /// Treat UNSTABLE as a failure
    #[serde(default)]
    pub fail_on_unstable: bool,
    /// Download the team-results archive after a job finishes
    #[serde(default)]
    pub download_results: bool,
    /// Destination folder for downloaded results
    #[serde(default = "default_save_results_to")]
    pub save_results_to: PathBuf,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            retry_count: default_retry_count(),
            delay_between_retries: default_delay_between_retries(),
            capture_console: true,
            capture_pipeline: true,
            fail_on_unstable: false,
            download_results: false,
            save_results_to: default_save_results_to(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_retry_count() -> u32 {
    5
}

fn default_delay_between_retries() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_save_results_to() -> PathBuf {
    PathBuf::from("jenkinsResults")
}

impl TrackingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.delay_between_retries)
    }
}

/// CLI overrides applied on top of the file configuration
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub job_name: Option<String>,
    pub parameters: Vec<String>,
    pub poll_interval_ms: Option<u64>,
    pub no_console: bool,
    pub no_pipeline: bool,
    pub fail_on_unstable: bool,
    pub download_results: bool,
    pub save_results_to: Option<PathBuf>,
}

impl TaskOptions {
    /// Load config from a TOML file
    pub fn load_from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(path.clone(), e))?;
        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(path.clone(), e))
    }

    /// Try to load config from jenkins-queue.toml in the given directory
    pub fn load_from_dir(dir: &PathBuf) -> Result<Self, ConfigError> {
        let config_path = dir.join("jenkins-queue.toml");
        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Merge CLI overrides into the config
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(u) = overrides.url {
            self.server.url = u;
        }
        if let Some(u) = overrides.username {
            self.server.username = Some(u);
        }
        if let Some(p) = overrides.password {
            self.server.password = Some(p);
        }
        if let Some(n) = overrides.job_name {
            self.job.name = Some(n);
        }
        if !overrides.parameters.is_empty() {
            self.job.parameters = overrides.parameters;
            self.job.parameterized = true;
        }
        if let Some(p) = overrides.poll_interval_ms {
            self.tracking.poll_interval_ms = p;
        }
        if overrides.no_console {
            self.tracking.capture_console = false;
        }
        if overrides.no_pipeline {
            self.tracking.capture_pipeline = false;
        }
        if overrides.fail_on_unstable {
            self.tracking.fail_on_unstable = true;
        }
        if overrides.download_results {
            self.tracking.download_results = true;
        }
        if let Some(dir) = overrides.save_results_to {
            self.tracking.save_results_to = dir;
        }
        self.normalized()
    }

    /// Pipeline capture only makes sense while the console is captured
    pub fn normalized(mut self) -> Self {
        if !self.tracking.capture_console {
            self.tracking.capture_pipeline = false;
        }
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, std::io::Error),
    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, toml::de::Error),
    #[error("Job parameters should be specified as \"parameterName=parameterValue\", one per line. Invalid parameter line: {0}")]
    InvalidParameter(String),
    #[error("No job name configured")]
    MissingJobName,
}
