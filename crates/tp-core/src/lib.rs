//! Core domain model for the taskpilot orchestration engine: work item
//! types, the scoring and similarity heuristics, the synthetic module
//! analysis generator, and configuration.

pub mod analysis;
pub mod config;
pub mod ids;
pub mod scoring;
pub mod similarity;
pub mod types;
