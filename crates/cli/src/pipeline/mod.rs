//! Pipeline orchestration module.

mod orchestrator;
mod replay;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig};
pub use replay::{ReplaySource, ReplayStats, Replayer};
pub use stats::PipelineStats;
