//! Recording state and reconstruction from events.
//!
//! A `Recording` is the unit of work for the extraction pipeline: one
//! captured conversation, processed by a sequence of extraction passes,
//! accumulating a deduplicated set of accepted items. Current state is
//! derived by replaying the recording's event log; the in-flight states
//! (`Validating`, `Merging`) exist only while the orchestrator is actively
//! working a pass and are never observed in a replayed log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::candidate::{CandidateAction, ScoredCandidate};
use super::events::{RecordingEvent, RecordingEventType};

/// One recorded conversation moving through the extraction lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    /// Unique identifier for this recording
    pub id: Uuid,

    /// Current lifecycle state
    pub state: RecordingState,

    /// Terminal passes, in order (the in-flight pass is not listed)
    pub passes: Vec<PassSummary>,

    /// Deduplicated accepted items across all passes
    pub accepted: AcceptedSet,

    /// When the recording entered the pipeline
    pub created_at: DateTime<Utc>,

    /// When the recording reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

impl Recording {
    /// Create a fresh recording in the `Created` state
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            state: RecordingState::Created,
            passes: Vec::new(),
            accepted: AcceptedSet::empty(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Reconstruct recording state from a sequence of events
    pub fn from_events(events: &[RecordingEvent]) -> Option<Self> {
        let first = events.first()?;

        let mut recording = Self {
            id: first.recording_id,
            state: RecordingState::Created,
            passes: Vec::new(),
            accepted: AcceptedSet::empty(),
            created_at: first.timestamp,
            completed_at: None,
        };

        for event in events {
            recording.apply_event(event);
        }

        Some(recording)
    }

    /// Apply a single event to update recording state
    pub fn apply_event(&mut self, event: &RecordingEvent) {
        match event.event_type {
            RecordingEventType::RecordingCreated => {
                self.state = RecordingState::Created;
                self.created_at = event.timestamp;
            }
            RecordingEventType::PassStarted => {
                // Also reopens a failed recording on explicit reprocess
                self.state = RecordingState::Extracting;
                self.completed_at = None;
            }
            RecordingEventType::PassRetrying => {
                // Attempt-level detail, tracked in the completed summary
            }
            RecordingEventType::PassCompleted => {
                if let Some(summary) = event
                    .data
                    .as_ref()
                    .and_then(|d| serde_json::from_value::<PassSummary>(d.clone()).ok())
                {
                    self.passes.push(summary);
                }
                self.accepted.version += 1;
                self.state = RecordingState::Extracting;
            }
            RecordingEventType::PassFailed => {
                if let Some(summary) = event
                    .data
                    .as_ref()
                    .and_then(|d| serde_json::from_value::<PassSummary>(d.clone()).ok())
                {
                    self.passes.push(summary);
                }
            }
            RecordingEventType::ItemAccepted => {
                if let Some(item) = event
                    .data
                    .as_ref()
                    .and_then(|d| serde_json::from_value::<AcceptedItem>(d.clone()).ok())
                {
                    self.accepted.apply_accept(item);
                }
            }
            RecordingEventType::ItemDisplaced => {
                if let Some(record) = event
                    .data
                    .as_ref()
                    .and_then(|d| serde_json::from_value::<DisplacedRecord>(d.clone()).ok())
                {
                    self.accepted.apply_displacement(record);
                }
            }
            RecordingEventType::ItemRejected => {
                // Observability only; rejected candidates never enter the set
            }
            RecordingEventType::RecordingCompleted => {
                self.state = RecordingState::Complete;
                self.completed_at = Some(event.timestamp);
            }
            RecordingEventType::RecordingFailed => {
                self.state = RecordingState::Failed {
                    reason: event.error.clone().unwrap_or_default(),
                };
                self.completed_at = Some(event.timestamp);
            }
        }
    }

    /// Check whether the recording reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            RecordingState::Complete | RecordingState::Failed { .. }
        )
    }

    /// Check whether a new extraction pass may be started.
    ///
    /// Failed recordings accept a fresh pass (explicit reprocess);
    /// completed recordings are sealed.
    pub fn accepts_new_pass(&self) -> bool {
        matches!(
            self.state,
            RecordingState::Created
                | RecordingState::Extracting
                | RecordingState::Failed { .. }
        )
    }
}

/// Lifecycle state of a recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RecordingState {
    /// Created, no pass started yet
    Created,

    /// An extraction pass is running, or the recording awaits the next one
    Extracting,

    /// Candidates of the current pass are being scored and gated
    Validating,

    /// Accepted candidates are being merged into the accepted set
    Merging,

    /// Terminal: finalized, accepted set sealed
    Complete,

    /// Terminal: extractor failure or nothing usable found
    Failed { reason: String },
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingState::Created => write!(f, "created"),
            RecordingState::Extracting => write!(f, "extracting"),
            RecordingState::Validating => write!(f, "validating"),
            RecordingState::Merging => write!(f, "merging"),
            RecordingState::Complete => write!(f, "complete"),
            RecordingState::Failed { .. } => write!(f, "failed"),
        }
    }
}

/// Terminal state of one extraction pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassState {
    /// Validated and merged
    Completed,

    /// Extraction failed after exhausting retries
    Failed,
}

/// Summary of one terminal extraction pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassSummary {
    /// Zero-based pass number within the recording
    pub index: u32,

    /// How the pass ended
    pub state: PassState,

    /// Raw candidates the extractor produced
    pub raw: usize,

    /// Candidates that passed the gate
    pub accepted: usize,

    /// Candidates that failed the gate
    pub rejected: usize,

    /// Extraction attempts beyond the first
    pub retries: u32,

    /// Error message for failed passes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the pass reached its terminal state
    pub finished_at: DateTime<Utc>,
}

/// The deduplicated accepted items of a recording.
///
/// Merging never mutates a set in place: each merge clones the current
/// value, bumps `version`, and applies the outcome, so every pass sees an
/// immutable snapshot and the single-writer discipline is checkable by
/// comparing versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedSet {
    /// Number of merges applied (one per completed pass)
    pub version: u64,

    /// Current accepted items
    pub items: Vec<AcceptedItem>,

    /// Items that lost a dedup contest; never shown to the user
    pub audit: Vec<DisplacedRecord>,
}

impl AcceptedSet {
    /// An empty set at version zero
    pub fn empty() -> Self {
        Self {
            version: 0,
            items: Vec::new(),
            audit: Vec::new(),
        }
    }

    /// Number of accepted items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check whether the set holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up an item by its scoring identity
    pub fn get(&self, id: Uuid) -> Option<&AcceptedItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Add an item (merge outcome or replay)
    pub(crate) fn apply_accept(&mut self, item: AcceptedItem) {
        self.items.push(item);
    }

    /// Remove a displaced item if present and record it in the audit
    /// trail. Incoming losers were never in the set; they only land in
    /// the audit. A record naming itself as its replacement marks a
    /// re-merged identical copy and must not evict the incumbent.
    pub(crate) fn apply_displacement(&mut self, record: DisplacedRecord) {
        if record.item_id != record.replaced_by {
            self.items.retain(|item| item.id != record.item_id);
        }
        self.audit.push(record);
    }
}

impl Default for AcceptedSet {
    fn default() -> Self {
        Self::empty()
    }
}

/// An accepted candidate inside a recording's accepted set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedItem {
    /// Scoring identity (same as the `ScoredCandidate` it came from)
    pub id: Uuid,

    /// The candidate as scored
    pub candidate: CandidateAction,

    /// Validation score in [0,100]
    pub score: u8,

    /// Issues collected during scoring (kept for audit/debugging)
    pub issues: Vec<String>,

    /// Candidate fingerprint, cached for audit lookups
    pub fingerprint: String,

    /// Pass that produced this item
    pub pass_index: u32,

    /// When the item entered the accepted set
    pub accepted_at: DateTime<Utc>,
}

impl AcceptedItem {
    /// Build an accepted item from a gated candidate
    pub fn from_scored(scored: ScoredCandidate, pass_index: u32) -> Self {
        let fingerprint = scored.fingerprint();
        Self {
            id: scored.id,
            candidate: scored.candidate,
            score: scored.score,
            issues: scored.issues,
            fingerprint,
            pass_index,
            accepted_at: Utc::now(),
        }
    }
}

/// Audit record for an item that lost a dedup contest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplacedRecord {
    /// Identity of the losing copy
    pub item_id: Uuid,

    /// Fingerprint of the losing copy
    pub fingerprint: String,

    /// Score of the losing copy
    pub score: u8,

    /// Identity of the winning copy
    pub replaced_by: Uuid,

    /// When the contest was decided
    pub displaced_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candidate::Verdict;

    fn accepted_item(text: &str, score: u8, pass_index: u32) -> AcceptedItem {
        let scored = ScoredCandidate::new(
            CandidateAction::new(text),
            score,
            vec![],
            Verdict::Accepted,
        );
        AcceptedItem::from_scored(scored, pass_index)
    }

    #[test]
    fn test_new_recording_is_created() {
        let recording = Recording::new(Uuid::new_v4());
        assert_eq!(recording.state, RecordingState::Created);
        assert!(!recording.is_terminal());
        assert!(recording.accepts_new_pass());
    }

    #[test]
    fn test_from_events_full_lifecycle() {
        let id = Uuid::new_v4();
        let item = accepted_item("Call the pharmacy to confirm refill", 100, 0);
        let summary = PassSummary {
            index: 0,
            state: PassState::Completed,
            raw: 2,
            accepted: 1,
            rejected: 1,
            retries: 0,
            error: None,
            finished_at: Utc::now(),
        };

        let events = vec![
            RecordingEvent::new(
                id,
                None,
                RecordingEventType::RecordingCreated,
                "Recording created",
            ),
            RecordingEvent::new(id, Some(0), RecordingEventType::PassStarted, "Pass 0"),
            RecordingEvent::new(
                id,
                Some(0),
                RecordingEventType::ItemAccepted,
                "Accepted",
            )
            .with_data(serde_json::to_value(&item).unwrap()),
            RecordingEvent::new(
                id,
                Some(0),
                RecordingEventType::PassCompleted,
                "Pass 0 done",
            )
            .with_data(serde_json::to_value(&summary).unwrap()),
            RecordingEvent::new(
                id,
                None,
                RecordingEventType::RecordingCompleted,
                "Finalized",
            ),
        ];

        let recording = Recording::from_events(&events).unwrap();
        assert_eq!(recording.state, RecordingState::Complete);
        assert_eq!(recording.passes.len(), 1);
        assert_eq!(recording.accepted.len(), 1);
        assert_eq!(recording.accepted.version, 1);
        assert!(recording.is_terminal());
        assert!(!recording.accepts_new_pass());
        assert!(recording.completed_at.is_some());
    }

    #[test]
    fn test_failed_recording_keeps_accepted_items() {
        let id = Uuid::new_v4();
        let item = accepted_item("Email the vendor about renewal", 85, 0);

        let events = vec![
            RecordingEvent::new(
                id,
                None,
                RecordingEventType::RecordingCreated,
                "Recording created",
            ),
            RecordingEvent::new(
                id,
                Some(0),
                RecordingEventType::ItemAccepted,
                "Accepted",
            )
            .with_data(serde_json::to_value(&item).unwrap()),
            RecordingEvent::new(
                id,
                None,
                RecordingEventType::RecordingFailed,
                "Pass 1 failed",
            )
            .with_error("extractor timed out"),
        ];

        let recording = Recording::from_events(&events).unwrap();
        assert_eq!(recording.accepted.len(), 1);
        assert!(matches!(
            recording.state,
            RecordingState::Failed { ref reason } if reason == "extractor timed out"
        ));
        // Failed recordings may be reprocessed with a fresh pass
        assert!(recording.accepts_new_pass());
    }

    #[test]
    fn test_displacement_removes_item_and_records_audit() {
        let mut set = AcceptedSet::empty();
        let loser = accepted_item("Call the pharmacy", 75, 0);
        let winner = accepted_item("Call the pharmacy today please", 90, 1);
        let loser_id = loser.id;

        set.apply_accept(loser);
        set.apply_displacement(DisplacedRecord {
            item_id: loser_id,
            fingerprint: "abc123".into(),
            score: 75,
            replaced_by: winner.id,
            displaced_at: Utc::now(),
        });
        set.apply_accept(winner);

        assert_eq!(set.len(), 1);
        assert_eq!(set.audit.len(), 1);
        assert_eq!(set.audit[0].item_id, loser_id);
    }

    #[test]
    fn test_self_displacement_record_keeps_the_item() {
        let mut set = AcceptedSet::empty();
        let item = accepted_item("Call the pharmacy", 90, 0);
        let id = item.id;

        set.apply_accept(item);
        // A re-merged identical copy produces a record pointing at the
        // surviving item itself; the item must not be evicted
        set.apply_displacement(DisplacedRecord {
            item_id: id,
            fingerprint: "abc123".into(),
            score: 90,
            replaced_by: id,
            displaced_at: Utc::now(),
        });

        assert_eq!(set.len(), 1);
        assert_eq!(set.items[0].id, id);
        assert_eq!(set.audit.len(), 1);
    }

    #[test]
    fn test_pass_started_reopens_failed_recording() {
        let id = Uuid::new_v4();
        let events = vec![
            RecordingEvent::new(
                id,
                None,
                RecordingEventType::RecordingCreated,
                "Recording created",
            ),
            RecordingEvent::new(
                id,
                None,
                RecordingEventType::RecordingFailed,
                "Nothing usable",
            )
            .with_error("no accepted items"),
            RecordingEvent::new(id, Some(1), RecordingEventType::PassStarted, "Reprocess"),
        ];

        let recording = Recording::from_events(&events).unwrap();
        assert_eq!(recording.state, RecordingState::Extracting);
        assert!(recording.completed_at.is_none());
    }
}
