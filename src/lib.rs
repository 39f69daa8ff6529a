//! acta - Event-sourced validator for machine-extracted action items
//!
//! A Rust engine that turns noisy candidate actions extracted from
//! recorded conversations into a deduplicated, quality-gated accepted
//! set.
//!
//! # Architecture
//!
//! The system is built around event sourcing:
//! - All state changes are recorded as immutable events
//! - Current state is derived by replaying events
//! - A cancelled pass flushes nothing, so it leaves no trace
//!
//! Validation itself is pure: every candidate starts at 100 points and
//! each rule that fires subtracts a fixed penalty. Candidates at or
//! above the acceptance threshold enter the recording's accepted set;
//! duplicates are resolved by keeping the higher-scoring item.
//!
//! # Modules
//!
//! - `adapters`: External extractors (subprocess, scripted)
//! - `core`: Orchestration logic (RecordingStore, MergePolicy, Orchestrator)
//! - `domain`: Data structures (CandidateAction, Recording, RecordingEvent)
//! - `scoring`: Rule scorer and validation gate
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run an extraction pass over a transcript
//! acta process meeting.txt --finalize
//!
//! # Score candidates directly
//! cat candidates.json | acta score
//!
//! # Check recording status
//! acta status <recording-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod scoring;

// Re-export main types at crate root for convenience
pub use crate::core::Orchestrator;
pub use domain::{
    ActionType, CandidateAction, Recording, RecordingEvent, RecordingEventType, RecordingState,
    ScoredCandidate, Verdict,
};
pub use scoring::{GatePolicy, Scorer};
