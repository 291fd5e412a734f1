pub mod config;
pub mod job;
pub mod remote;
pub mod state;

pub use config::*;
pub use job::*;
pub use remote::*;
pub use state::*;
