use std::error::Error as StdError;
use std::io::ErrorKind;
use thiserror::Error;

use crate::models::{ConfigError, JobState};

/// Main error type for jenkins-queue
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse response from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("{context}\nHttpResponse.statusCode={status}\nHttpResponse.body={message}")]
    UnexpectedStatus {
        context: String,
        status: u16,
        message: String,
    },

    #[error("Jenkins job canceled.")]
    Cancelled,

    #[error("Invalid state change from: {from} to: {to} {job}")]
    InvalidTransition {
        from: JobState,
        to: JobState,
        job: String,
    },

    #[error("Invalid join: {job} can not be joined to {target}")]
    InvalidJoin { job: String, target: String },

    #[error("Can not be set to streaming: {0}")]
    IllegalStreaming(String),

    #[error("Can not have more than one main job: {0}")]
    MultipleMainJobs(String),

    #[error("No known execution number: {number} for job: {identifier}")]
    UnknownExecution { number: u64, identifier: String },

    #[error("Illegal join resolution, {job} is not the main job for its execution")]
    IllegalJoinCall { job: String },
}

impl TrackError {
    /// Violations of the tracking invariants; these always end the run
    pub fn is_state_violation(&self) -> bool {
        matches!(
            self,
            TrackError::InvalidTransition { .. }
                | TrackError::InvalidJoin { .. }
                | TrackError::IllegalStreaming(_)
                | TrackError::MultipleMainJobs(_)
                | TrackError::UnknownExecution { .. }
                | TrackError::IllegalJoinCall { .. }
        )
    }

    pub fn parse(url: &str, err: impl std::fmt::Display) -> Self {
        TrackError::Parse {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Transport level errors talking to the server
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),
}

impl RemoteError {
    /// Resets and timeouts are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::ConnectionReset(_))
    }
}

fn io_kind(err: &(dyn StdError + 'static)) -> Option<ErrorKind> {
    let mut source = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = e.source();
    }
    None
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        let kind = io_kind(&err);
        if err.is_timeout()
            || matches!(
                kind,
                Some(
                    ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::BrokenPipe
                        | ErrorKind::TimedOut
                        | ErrorKind::UnexpectedEof
                )
            )
        {
            RemoteError::ConnectionReset(err.to_string())
        } else if err.is_connect() {
            RemoteError::ConnectionRefused(err.to_string())
        } else if err.is_builder() {
            RemoteError::InvalidUrl(err.to_string())
        } else {
            RemoteError::RequestFailed(err.to_string())
        }
    }
}

/// Errors saving or unpacking downloaded result archives
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, TrackError>;
