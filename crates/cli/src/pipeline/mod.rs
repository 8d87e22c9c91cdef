//! Pipeline orchestration module.

mod orchestrator;
mod sampling;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig};
pub use stats::{PipelineStats, StopReason};
