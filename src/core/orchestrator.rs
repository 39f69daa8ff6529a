//! Extraction orchestration across a recording's lifecycle.
//!
//! Owns the per-recording state machine: each pass extracts raw
//! candidates (with retry and a call timeout), scores and gates them,
//! merges survivors into the recording's accepted set, and appends the
//! pass's events as one batch. Passes for one recording run strictly
//! sequentially; different recordings are independent. Cancellation is
//! cooperative: it is checked between steps, and a cancelled pass
//! discards its results instead of persisting them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::Extractor;
use crate::domain::recording::{
    AcceptedItem, PassState, PassSummary, Recording, RecordingState,
};
use crate::domain::{RecordingEvent, RecordingEventType, ScoredCandidate};
use crate::scoring::{GatePolicy, Scorer};

use super::merge::{MergePolicy, MergeReport};
use super::store::RecordingStore;

/// Serializes passes for one recording and carries its cancel flag
struct RecordingSlot {
    work: tokio::sync::Mutex<RecordingWork>,

    cancelled: AtomicBool,
}

/// Mutable per-recording state, guarded by the slot lock
struct RecordingWork {
    recording: Recording,

    next_pass_index: u32,
}

/// Drives recordings through extraction, validation, and merging
pub struct Orchestrator {
    extractor: Arc<dyn Extractor>,

    scorer: Scorer,

    gate: GatePolicy,

    merge_policy: MergePolicy,

    retry_policy: RetryPolicy,

    extract_timeout: Duration,

    base_dir: PathBuf,

    slots: Mutex<HashMap<Uuid, Arc<RecordingSlot>>>,
}

impl Orchestrator {
    /// Create an orchestrator around an extractor, taking policies and
    /// paths from configuration
    pub fn new(extractor: Arc<dyn Extractor>) -> Result<Self> {
        let settings = crate::config::settings()?;

        Ok(Self {
            extractor,
            scorer: Scorer::new(),
            gate: settings.validation.gate_policy(),
            merge_policy: settings.validation.merge_policy(),
            retry_policy: settings.retry.clone(),
            extract_timeout: Duration::from_secs(settings.extractor.timeout_seconds),
            base_dir: crate::config::recordings_dir()?,
            slots: Mutex::new(HashMap::new()),
        })
    }

    /// Override the gate policy
    pub fn with_gate(mut self, gate: GatePolicy) -> Self {
        self.gate = gate;
        self
    }

    /// Override the merge policy
    pub fn with_merge_policy(mut self, merge_policy: MergePolicy) -> Self {
        self.merge_policy = merge_policy;
        self
    }

    /// Override the retry policy
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Override the extractor call timeout
    pub fn with_extract_timeout(mut self, timeout: Duration) -> Self {
        self.extract_timeout = timeout;
        self
    }

    /// Override the base directory recordings are stored under
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Register a new recording and persist its creation
    pub async fn create_recording(&self) -> Result<Recording> {
        let recording_id = Uuid::new_v4();
        let store = RecordingStore::open_in(&self.base_dir, recording_id).await?;

        let event = RecordingEvent::new(
            recording_id,
            None,
            RecordingEventType::RecordingCreated,
            "Recording created",
        );
        store.append(&event).await?;

        let mut recording = Recording::new(recording_id);
        recording.created_at = event.timestamp;

        let slot = Arc::new(RecordingSlot {
            work: tokio::sync::Mutex::new(RecordingWork {
                recording: recording.clone(),
                next_pass_index: 0,
            }),
            cancelled: AtomicBool::new(false),
        });
        self.slots
            .lock()
            .map_err(|_| anyhow::anyhow!("Recording slot table poisoned"))?
            .insert(recording_id, slot);

        info!(%recording_id, "Recording created");
        Ok(recording)
    }

    /// Run one extraction pass over the transcript.
    ///
    /// Holds the recording's slot for the whole pass, so concurrent
    /// calls for the same recording queue up and run one at a time. The
    /// pass's events are buffered and land in the log only at the end;
    /// a cancellation observed at any step boundary discards the pass.
    #[instrument(skip(self, transcript), fields(recording_id = %recording_id))]
    pub async fn run_pass(&self, recording_id: Uuid, transcript: &str) -> Result<PassOutcome> {
        let slot = self.slot(recording_id).await?;
        let mut work = slot.work.lock().await;

        if slot.cancelled.load(Ordering::SeqCst) {
            anyhow::bail!("Recording {} has been cancelled", recording_id);
        }
        if !work.recording.accepts_new_pass() {
            anyhow::bail!(
                "Recording {} is already complete and accepts no further passes",
                recording_id
            );
        }

        let pass_index = work.next_pass_index;
        let store = RecordingStore::open_in(&self.base_dir, recording_id).await?;

        // All durable changes go through events applied to a scratch
        // copy; committing means flushing the buffer and adopting the
        // scratch, so a discarded pass leaves no trace anywhere.
        let mut scratch = work.recording.clone();
        let mut buffer: Vec<RecordingEvent> = Vec::new();
        let record = |scratch: &mut Recording, buffer: &mut Vec<RecordingEvent>,
                      event: RecordingEvent| {
            scratch.apply_event(&event);
            buffer.push(event);
        };

        record(
            &mut scratch,
            &mut buffer,
            RecordingEvent::new(
                recording_id,
                Some(pass_index),
                RecordingEventType::PassStarted,
                format!("Pass {} started", pass_index),
            ),
        );

        // Extract, retrying transient failures with backoff
        let mut attempt = 0u32;
        let raw_candidates = loop {
            attempt += 1;

            match self
                .extractor
                .extract(transcript, self.extract_timeout)
                .await
            {
                Ok(batch) => break batch,
                Err(e) => {
                    if self.retry_policy.should_retry(attempt) {
                        let delay = self.retry_policy.delay_for_attempt(attempt);
                        record(
                            &mut scratch,
                            &mut buffer,
                            RecordingEvent::new(
                                recording_id,
                                Some(pass_index),
                                RecordingEventType::PassRetrying,
                                format!(
                                    "Extractor failed, retrying in {:?}: {}",
                                    delay, e
                                ),
                            )
                            .with_error(e.to_string()),
                        );
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Extractor failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    error!(attempt, error = %e, "Extractor failed permanently");
                    if self.pass_discarded(&slot, pass_index, "after extraction failure") {
                        return Ok(PassOutcome::discarded(
                            recording_id,
                            pass_index,
                            0,
                            &work.recording,
                        ));
                    }
                    return self
                        .fail_pass(&mut work, scratch, buffer, pass_index, attempt, e)
                        .await;
                }
            }
        };

        let raw = raw_candidates.len();
        if self.pass_discarded(&slot, pass_index, "after extraction") {
            return Ok(PassOutcome::discarded(recording_id, pass_index, raw, &work.recording));
        }

        // Validate: score and gate each candidate independently
        scratch.state = RecordingState::Validating;
        let mut accepted_items: Vec<AcceptedItem> = Vec::new();
        let mut rejection_issues: Vec<String> = Vec::new();
        let mut rejected = 0usize;

        for candidate in raw_candidates {
            let scored = self
                .scorer
                .evaluate(candidate, &self.gate)
                .context("Candidate validation broke the scoring contract")?;

            if scored.is_accepted() {
                accepted_items.push(AcceptedItem::from_scored(scored, pass_index));
            } else {
                rejected += 1;
                record(
                    &mut scratch,
                    &mut buffer,
                    rejection_event(recording_id, pass_index, &scored),
                );
                for issue in scored.issues {
                    if !rejection_issues.contains(&issue) {
                        rejection_issues.push(issue);
                    }
                }
            }
        }
        let accepted = accepted_items.len();

        if self.pass_discarded(&slot, pass_index, "after validation") {
            return Ok(PassOutcome::discarded(recording_id, pass_index, raw, &work.recording));
        }

        // Merge survivors into the accepted set
        scratch.state = RecordingState::Merging;
        let outcome = self.merge_policy.merge(&scratch.accepted, accepted_items);

        for displaced in &outcome.displaced {
            record(
                &mut scratch,
                &mut buffer,
                RecordingEvent::new(
                    recording_id,
                    Some(pass_index),
                    RecordingEventType::ItemDisplaced,
                    format!("Duplicate lost dedup contest (score {})", displaced.score),
                )
                .with_data(
                    serde_json::to_value(displaced)
                        .context("Failed to encode displacement record")?,
                ),
            );
        }
        for item in &outcome.entered {
            record(
                &mut scratch,
                &mut buffer,
                RecordingEvent::new(
                    recording_id,
                    Some(pass_index),
                    RecordingEventType::ItemAccepted,
                    format!("Accepted candidate (score {})", item.score),
                )
                .with_data(
                    serde_json::to_value(item).context("Failed to encode accepted item")?,
                ),
            );
        }

        let summary = PassSummary {
            index: pass_index,
            state: PassState::Completed,
            raw,
            accepted,
            rejected,
            retries: attempt - 1,
            error: None,
            finished_at: chrono::Utc::now(),
        };
        record(
            &mut scratch,
            &mut buffer,
            RecordingEvent::new(
                recording_id,
                Some(pass_index),
                RecordingEventType::PassCompleted,
                format!(
                    "Pass {} completed: {} raw, {} accepted, {} rejected",
                    pass_index, raw, accepted, rejected
                ),
            )
            .with_data(serde_json::to_value(&summary).context("Failed to encode pass summary")?),
        );

        if self.pass_discarded(&slot, pass_index, "before persisting") {
            return Ok(PassOutcome::discarded(recording_id, pass_index, raw, &work.recording));
        }

        store.append_all(&buffer).await?;
        work.recording = scratch;
        work.next_pass_index = pass_index + 1;

        info!(
            pass_index,
            raw,
            accepted,
            rejected,
            added = outcome.report.added,
            replaced = outcome.report.replaced,
            discarded = outcome.report.discarded,
            "Pass completed"
        );

        Ok(PassOutcome {
            recording_id,
            pass_index,
            raw,
            accepted,
            rejected,
            merge: outcome.report,
            rejection_issues,
            state: work.recording.state.clone(),
            error: None,
            discarded: false,
        })
    }

    /// Finalize a recording: no further passes are expected.
    ///
    /// The recording completes if any item was ever accepted and fails
    /// otherwise. Either way the accepted set is written out and sealed,
    /// and ownership passes to whatever consumes the store.
    #[instrument(skip(self), fields(recording_id = %recording_id))]
    pub async fn finalize(&self, recording_id: Uuid) -> Result<Recording> {
        let slot = self.slot(recording_id).await?;
        let mut work = slot.work.lock().await;

        if slot.cancelled.load(Ordering::SeqCst) {
            anyhow::bail!("Recording {} has been cancelled", recording_id);
        }
        if work.recording.is_terminal() {
            return Ok(work.recording.clone());
        }

        let store = RecordingStore::open_in(&self.base_dir, recording_id).await?;
        let mut scratch = work.recording.clone();

        let event = if scratch.accepted.is_empty() {
            RecordingEvent::new(
                recording_id,
                None,
                RecordingEventType::RecordingFailed,
                "Recording failed: nothing usable was found",
            )
            .with_error("No candidates were accepted in any pass")
        } else {
            RecordingEvent::new(
                recording_id,
                None,
                RecordingEventType::RecordingCompleted,
                format!(
                    "Recording completed with {} accepted items",
                    scratch.accepted.len()
                ),
            )
        };

        scratch.apply_event(&event);
        store.append(&event).await?;
        store.write_accepted(&scratch.accepted).await?;
        work.recording = scratch;

        info!(
            accepted = work.recording.accepted.len(),
            state = ?work.recording.state,
            "Recording finalized"
        );
        Ok(work.recording.clone())
    }

    /// Request cancellation of a recording.
    ///
    /// Takes effect at the next step boundary of any in-flight pass;
    /// that pass's results are discarded rather than persisted.
    pub async fn cancel(&self, recording_id: Uuid) -> Result<()> {
        let slot = self.slot(recording_id).await?;
        slot.cancelled.store(true, Ordering::SeqCst);
        info!(%recording_id, "Cancellation requested; in-flight work will be discarded");
        Ok(())
    }

    /// Current state of a recording, rebuilt from its log
    pub async fn recording_status(&self, recording_id: Uuid) -> Result<Recording> {
        let store = RecordingStore::open_in(&self.base_dir, recording_id).await?;
        let events = store.replay().await?;

        if events.is_empty() {
            anyhow::bail!("Recording {} not found", recording_id);
        }

        Recording::from_events(&events).context("Failed to reconstruct recording state")
    }

    /// List recent recordings, most recent first
    pub async fn list_recordings(&self, limit: usize) -> Result<Vec<Recording>> {
        let ids = RecordingStore::list_recordings_in(&self.base_dir).await?;
        let mut recordings = Vec::new();

        for id in ids {
            if let Ok(recording) = self.recording_status(id).await {
                recordings.push(recording);
            }
        }

        recordings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recordings.truncate(limit);

        Ok(recordings)
    }

    /// Check that the extractor is reachable
    pub async fn health_check(&self) -> Result<()> {
        self.extractor.health_check().await
    }

    /// Get or rebuild the slot for a recording
    async fn slot(&self, recording_id: Uuid) -> Result<Arc<RecordingSlot>> {
        if let Some(slot) = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("Recording slot table poisoned"))?
            .get(&recording_id)
        {
            return Ok(Arc::clone(slot));
        }

        // Not seen this process lifetime; rebuild from the log
        let store = RecordingStore::open_in(&self.base_dir, recording_id).await?;
        let events = store.replay().await?;
        let recording = Recording::from_events(&events)
            .ok_or_else(|| anyhow::anyhow!("Recording {} not found", recording_id))?;
        let next_pass_index = recording
            .passes
            .last()
            .map(|p| p.index + 1)
            .unwrap_or(0);

        let slot = Arc::new(RecordingSlot {
            work: tokio::sync::Mutex::new(RecordingWork {
                recording,
                next_pass_index,
            }),
            cancelled: AtomicBool::new(false),
        });

        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("Recording slot table poisoned"))?;
        let slot = slots.entry(recording_id).or_insert(slot);
        Ok(Arc::clone(slot))
    }

    /// Check the cancel flag at a step boundary
    fn pass_discarded(&self, slot: &RecordingSlot, pass_index: u32, boundary: &str) -> bool {
        if slot.cancelled.load(Ordering::SeqCst) {
            info!(pass_index, boundary, "Recording cancelled, discarding pass");
            return true;
        }
        false
    }

    /// Flush a failed pass: the pass and the recording both end failed,
    /// but accepted items from earlier passes are preserved.
    async fn fail_pass(
        &self,
        work: &mut RecordingWork,
        mut scratch: Recording,
        mut buffer: Vec<RecordingEvent>,
        pass_index: u32,
        attempts: u32,
        error: anyhow::Error,
    ) -> Result<PassOutcome> {
        let recording_id = scratch.id;
        let message = error.to_string();
        let store = RecordingStore::open_in(&self.base_dir, recording_id).await?;

        let summary = PassSummary {
            index: pass_index,
            state: PassState::Failed,
            raw: 0,
            accepted: 0,
            rejected: 0,
            retries: attempts - 1,
            error: Some(message.clone()),
            finished_at: chrono::Utc::now(),
        };

        let failed_event = RecordingEvent::new(
            recording_id,
            Some(pass_index),
            RecordingEventType::PassFailed,
            format!("Pass {} failed after {} attempts: {}", pass_index, attempts, message),
        )
        .with_data(serde_json::to_value(&summary).context("Failed to encode pass summary")?)
        .with_error(message.clone());
        scratch.apply_event(&failed_event);
        buffer.push(failed_event);

        let recording_failed = RecordingEvent::new(
            recording_id,
            None,
            RecordingEventType::RecordingFailed,
            format!("Recording failed: extraction pass {} exhausted retries", pass_index),
        )
        .with_error(message.clone());
        scratch.apply_event(&recording_failed);
        buffer.push(recording_failed);

        store.append_all(&buffer).await?;
        store.write_accepted(&scratch.accepted).await?;
        work.recording = scratch;
        work.next_pass_index = pass_index + 1;

        Ok(PassOutcome {
            recording_id,
            pass_index,
            raw: 0,
            accepted: 0,
            rejected: 0,
            merge: MergeReport::default(),
            rejection_issues: Vec::new(),
            state: work.recording.state.clone(),
            error: Some(message),
            discarded: false,
        })
    }
}

/// What one extraction pass did
#[derive(Debug, Clone)]
pub struct PassOutcome {
    /// Recording the pass belongs to
    pub recording_id: Uuid,

    /// Zero-based pass number
    pub pass_index: u32,

    /// Raw candidates the extractor returned
    pub raw: usize,

    /// Candidates that passed the gate this pass
    pub accepted: usize,

    /// Candidates that failed the gate this pass
    pub rejected: usize,

    /// What the merge did with the gate survivors
    pub merge: MergeReport,

    /// Distinct issues across this pass's rejected candidates
    pub rejection_issues: Vec<String>,

    /// Recording state after the pass
    pub state: RecordingState,

    /// Extraction error for failed passes
    pub error: Option<String>,

    /// Whether cancellation discarded the pass's results
    pub discarded: bool,
}

impl PassOutcome {
    /// Feedback line for re-prompting the extractor after rejections
    pub fn retry_feedback(&self) -> Option<String> {
        if self.rejection_issues.is_empty() {
            None
        } else {
            Some(self.rejection_issues.join("; "))
        }
    }

    fn discarded(recording_id: Uuid, pass_index: u32, raw: usize, recording: &Recording) -> Self {
        Self {
            recording_id,
            pass_index,
            raw,
            accepted: 0,
            rejected: 0,
            merge: MergeReport::default(),
            rejection_issues: Vec::new(),
            state: recording.state.clone(),
            error: None,
            discarded: true,
        }
    }
}

fn rejection_event(
    recording_id: Uuid,
    pass_index: u32,
    scored: &ScoredCandidate,
) -> RecordingEvent {
    RecordingEvent::new(
        recording_id,
        Some(pass_index),
        RecordingEventType::ItemRejected,
        format!("Rejected candidate (score {})", scored.score),
    )
    .with_data(serde_json::json!({
        "id": scored.id,
        "text": scored.candidate.text,
        "score": scored.score,
        "issues": scored.issues,
    }))
}

/// Retry policy for failed extractor calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Calculate delay for a specific attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms);
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FixedExtractor;
    use crate::domain::candidate::CandidateAction;
    use tempfile::TempDir;

    fn orchestrator_in(temp: &TempDir, extractor: FixedExtractor) -> Orchestrator {
        Orchestrator::new(Arc::new(extractor))
            .unwrap()
            .with_base_dir(temp.path())
            .with_retry_policy(RetryPolicy {
                max_attempts: 1,
                initial_delay_ms: 1,
                ..Default::default()
            })
    }

    #[test]
    fn test_retry_delay_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 20,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(5000));
    }

    #[test]
    fn test_retry_feedback_joins_distinct_issues() {
        let outcome = PassOutcome {
            recording_id: Uuid::new_v4(),
            pass_index: 0,
            raw: 2,
            accepted: 0,
            rejected: 2,
            merge: MergeReport::default(),
            rejection_issues: vec![
                "Text is too short to be a usable action".to_string(),
                "Text does not start with an action verb".to_string(),
            ],
            state: RecordingState::Extracting,
            error: None,
            discarded: false,
        };

        let feedback = outcome.retry_feedback().unwrap();
        assert!(feedback.contains("too short"));
        assert!(feedback.contains("; "));
    }

    #[tokio::test]
    async fn test_create_then_status_roundtrip() {
        let temp = TempDir::new().unwrap();
        let orchestrator = orchestrator_in(&temp, FixedExtractor::new(vec![]));

        let recording = orchestrator.create_recording().await.unwrap();
        assert_eq!(recording.state, RecordingState::Created);

        let status = orchestrator.recording_status(recording.id).await.unwrap();
        assert_eq!(status.id, recording.id);
        assert_eq!(status.state, RecordingState::Created);
    }

    #[tokio::test]
    async fn test_status_of_unknown_recording_fails() {
        let temp = TempDir::new().unwrap();
        let orchestrator = orchestrator_in(&temp, FixedExtractor::new(vec![]));
        assert!(orchestrator
            .recording_status(Uuid::new_v4())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_single_pass_accepts_and_rejects() {
        let temp = TempDir::new().unwrap();
        let orchestrator = orchestrator_in(
            &temp,
            FixedExtractor::single(vec![
                CandidateAction::new("Call the pharmacy to confirm refill"),
                CandidateAction::new("ab"),
            ]),
        );

        let recording = orchestrator.create_recording().await.unwrap();
        let outcome = orchestrator
            .run_pass(recording.id, "transcript")
            .await
            .unwrap();

        assert_eq!(outcome.raw, 2);
        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.merge.added, 1);
        assert!(!outcome.discarded);
        assert!(outcome.retry_feedback().is_some());
        assert_eq!(outcome.state, RecordingState::Extracting);
    }
}
