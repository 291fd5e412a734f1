use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;
mod core;
mod error;
mod models;

use commands::{queue_job, track_job, QueueOptions, TrackOptions, TrackTarget};
use models::Overrides;

/// jenkins-queue - queue a Jenkins job and follow it, and its downstream jobs, to completion
#[derive(Parser)]
#[command(name = "jenkins-queue")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every command; each one overrides jenkins-queue.toml
#[derive(Args)]
struct TrackingArgs {
    /// Override the Jenkins server URL
    #[arg(long)]
    url: Option<String>,

    /// Override the user name
    #[arg(long)]
    user: Option<String>,

    /// Override the password or API token
    #[arg(long)]
    password: Option<String>,

    /// Override the poll interval in milliseconds
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Do not stream the job console or wait for the result
    #[arg(long)]
    no_console: bool,

    /// Do not follow downstream jobs
    #[arg(long)]
    no_pipeline: bool,

    /// Treat an UNSTABLE result as a failure
    #[arg(long)]
    fail_on_unstable: bool,

    /// Download and extract each job's results archive
    #[arg(long)]
    download_results: bool,

    /// Directory the results archives are extracted into
    #[arg(long)]
    save_results_to: Option<PathBuf>,

    /// Write a markdown summary of the job tree to this file
    #[arg(long)]
    summary: Option<PathBuf>,
}

impl TrackingArgs {
    fn into_parts(self, job_name: Option<String>, parameters: Vec<String>) -> (Overrides, Option<PathBuf>) {
        let overrides = Overrides {
            url: self.url,
            username: self.user,
            password: self.password,
            job_name,
            parameters,
            poll_interval_ms: self.poll_interval,
            no_console: self.no_console,
            no_pipeline: self.no_pipeline,
            fail_on_unstable: self.fail_on_unstable,
            download_results: self.download_results,
            save_results_to: self.save_results_to,
        };
        (overrides, self.summary)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a job and track it to completion
    Queue {
        /// Job name; folders are separated by '/'
        #[arg(short, long)]
        job: Option<String>,

        /// Job parameter as name=value (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,

        #[command(flatten)]
        tracking: TrackingArgs,
    },

    /// Track a job that was already queued
    Track {
        /// Queue item URL returned when the job was queued
        #[arg(long, conflicts_with_all = ["job_url", "build"])]
        queue_url: Option<String>,

        /// Job URL of an execution that already started
        #[arg(long, requires = "build")]
        job_url: Option<String>,

        /// Execution number, used with --job-url
        #[arg(long)]
        build: Option<u64>,

        /// Display name of the job
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        tracking: TrackingArgs,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .init();

    let project_root = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Queue {
            job,
            params,
            tracking,
        } => {
            let (overrides, summary) = tracking.into_parts(job, params);
            queue_job(&project_root, QueueOptions { overrides, summary }).await
        }

        Commands::Track {
            queue_url,
            job_url,
            build,
            name,
            tracking,
        } => {
            let (overrides, summary) = tracking.into_parts(None, Vec::new());
            let options = TrackOptions {
                target: TrackTarget {
                    queue_url,
                    job_url,
                    build,
                    name,
                },
                overrides,
                summary,
            };
            track_job(&project_root, options).await
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
