//! The classification pipeline: periodic triage of unanalyzed backlog
//! items via the scoring and similarity heuristics, with per-item
//! timeout/retry and a reentrancy-guarded run loop.

pub mod analyzer;
pub mod pipeline;

pub use analyzer::{AnalyzerError, HeuristicAnalyzer, ItemAnalyzer};
pub use pipeline::{ClassificationPipeline, PipelineError, PipelineState};
