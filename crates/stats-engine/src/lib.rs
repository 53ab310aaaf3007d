//! Metrics & Quality Engine
//!
//! Rolling windows of processing time, FPS, and confidence, cumulative
//! per-class counters, and the derived 0-100 quality score.

mod engine;
mod quality;

pub use engine::{ClassSample, PerformanceMetrics, Statistics, StatsConfig, StatsEngine};
pub use quality::quality_score;
