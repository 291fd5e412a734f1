pub mod queue;
pub mod track;

pub use queue::*;
pub use track::*;
