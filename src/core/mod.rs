pub mod artifacts;
pub mod client;
pub mod config;
mod job;
pub mod queue;
pub mod report;
pub mod scheduler;
pub mod search;
pub mod submit;
pub mod urls;

pub use artifacts::*;
pub use client::*;
pub use config::*;
pub use queue::*;
pub use report::*;
pub use scheduler::*;
pub use search::*;
pub use submit::*;
