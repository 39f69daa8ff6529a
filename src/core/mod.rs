//! Core orchestration logic.
//!
//! This module contains:
//! - RecordingStore: Append-only event logging per recording
//! - MergePolicy: Cross-pass dedup and higher-score-wins merging
//! - Orchestrator: Main execution engine

pub mod merge;
pub mod orchestrator;
pub mod store;

// Re-export commonly used types
pub use merge::{MergeOutcome, MergePolicy, MergeReport};
pub use orchestrator::{Orchestrator, PassOutcome, RetryPolicy};
pub use store::RecordingStore;
