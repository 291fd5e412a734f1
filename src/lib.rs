#![allow(dead_code)]
//! jenkins-queue - queue a Jenkins job and track it to completion
//!
//! jenkins-queue submits a job to a Jenkins server, streams its console, and follows
//! every downstream job the build triggers. Because the server does not say which
//! downstream execution belongs to which trigger, executions are located by walking
//! build numbers and matching their recorded causes against the jobs being tracked.
//!
//! # Architecture
//!
//! - **commands**: CLI command implementations (queue, track)
//! - **core**: Tracking engine (job queue, scheduler, search, HTTP client, submission)
//! - **models**: Data structures (config, job, state, server payloads)
//! - **error**: Error types

pub mod commands;
pub mod core;
pub mod error;
pub mod models;

pub use error::{Result, TrackError};
