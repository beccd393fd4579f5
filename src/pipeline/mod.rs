// Complaint pipeline: processing stages, register storage and the orchestrator

pub mod pipeline;
pub mod processing;
pub mod storage;

// Re-export key types and functions from each stage
pub use pipeline::{Pipeline, PipelineResult};
pub use processing::parser;
