//! Domain types for action item extraction.
//!
//! Candidates, scoring verdicts, recording lifecycle state, and the
//! events the pipeline appends while processing a recording.

pub mod candidate;
pub mod events;
pub mod recording;

pub use candidate::{ActionType, CandidateAction, ScoredCandidate, Verdict};
pub use events::{RecordingEvent, RecordingEventType};
pub use recording::{
    AcceptedItem, AcceptedSet, DisplacedRecord, PassState, PassSummary, Recording,
    RecordingState,
};
