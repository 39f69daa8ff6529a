//! Event types for the recording lifecycle log.
//!
//! Every state change of a recording is recorded as an immutable event in
//! an append-only log. Replaying a recording's events reproduces its
//! current state, its accepted item set, and the audit trail of merges,
//! including candidates that were rejected or displaced and are no longer
//! visible anywhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single event in a recording's append-only log.
///
/// Item-level events carry their subject in `data` (a `ScoredCandidate`
/// for rejections, an `AcceptedItem` for acceptances) so the accepted set
/// can be rebuilt from the log alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred
    pub timestamp: DateTime<Utc>,

    /// The recording this event belongs to
    pub recording_id: Uuid,

    /// Extraction pass the event belongs to, if any
    pub pass_index: Option<u32>,

    /// Type of event
    pub event_type: RecordingEventType,

    /// Human-readable summary
    pub detail: String,

    /// Event payload (depends on event type)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error message if this event records a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordingEvent {
    /// Create a new event with the current timestamp
    pub fn new(
        recording_id: Uuid,
        pass_index: Option<u32>,
        event_type: RecordingEventType,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            recording_id,
            pass_index,
            event_type,
            detail: detail.into(),
            data: None,
            error: None,
        }
    }

    /// Attach a payload to this event
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach an error message to this event
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Types of events in a recording's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingEventType {
    /// A new recording entered the pipeline
    RecordingCreated,

    /// An extraction pass started
    PassStarted,

    /// An extraction attempt failed and is being retried
    PassRetrying,

    /// An extraction pass completed (validated and merged)
    PassCompleted,

    /// An extraction pass failed permanently
    PassFailed,

    /// A candidate passed the validation gate and entered the accepted set
    ItemAccepted,

    /// A candidate failed the validation gate (payload carries its issues)
    ItemRejected,

    /// An accepted item lost a dedup contest (audit trail only)
    ItemDisplaced,

    /// The recording reached its terminal complete state
    RecordingCompleted,

    /// The recording reached its terminal failed state
    RecordingFailed,
}
