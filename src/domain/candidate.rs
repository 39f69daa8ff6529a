//! Candidate actions and their scored, immutable form.
//!
//! A `CandidateAction` is exactly what the upstream extractor hands us:
//! unvalidated, possibly garbled, self-describing. A `ScoredCandidate` is
//! the frozen result of running one candidate through the rule scorer and
//! the validation gate. Re-scoring never mutates an existing
//! `ScoredCandidate`; it produces a new one with a new identity, so the
//! record of why an item was or was not accepted stays intact.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A raw candidate action as produced by the extraction pipeline.
///
/// Field names follow the extractor's JSON wire format (camelCase).
/// Everything except `text` is optional on the wire; unknown fields are
/// ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateAction {
    /// The proposed action phrase, free text
    pub text: String,

    /// What kind of item the extractor believes this is
    #[serde(default)]
    pub action_type: ActionType,

    /// Free-text actor reference ("Sarah", "the vendor")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,

    /// Free-text temporal hint ("next week", "before the launch")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_context: Option<String>,

    /// Structured date, if the extractor resolved one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<NaiveDate>,

    /// Time of day as text; the scorer validates the HH:MM shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,

    /// The extractor's self-reported certainty in [0,1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_confidence: Option<f64>,
}

impl CandidateAction {
    /// Create a minimal candidate with just text (defaults elsewhere)
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action_type: ActionType::default(),
            assigned_to: None,
            due_context: None,
            scheduled_date: None,
            scheduled_time: None,
            extraction_confidence: None,
        }
    }

    /// Set the action type
    pub fn with_action_type(mut self, action_type: ActionType) -> Self {
        self.action_type = action_type;
        self
    }

    /// Set the structured date
    pub fn with_scheduled_date(mut self, date: NaiveDate) -> Self {
        self.scheduled_date = Some(date);
        self
    }

    /// Set the structured time (kept as text until validated)
    pub fn with_scheduled_time(mut self, time: impl Into<String>) -> Self {
        self.scheduled_time = Some(time.into());
        self
    }

    /// Set the free-text due context
    pub fn with_due_context(mut self, context: impl Into<String>) -> Self {
        self.due_context = Some(context.into());
        self
    }

    /// Set the extractor's self-reported confidence
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.extraction_confidence = Some(confidence);
        self
    }

    /// Lowercased text with everything but alphanumerics collapsed to
    /// single spaces. Shared by the merge similarity check and the
    /// fingerprint so both agree on what "the same text" means.
    pub fn normalized_text(&self) -> String {
        let mapped: String = self
            .text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        mapped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Stable short identity for audit trails: first 12 hex chars of
    /// sha256(normalized text + scheduled date).
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.normalized_text().as_bytes());
        if let Some(date) = self.scheduled_date {
            hasher.update(date.to_string().as_bytes());
        }
        let result = hasher.finalize();
        result
            .iter()
            .take(6)
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

/// What kind of item a candidate claims to be.
///
/// The tag affects which validation rules apply (only commitments are
/// penalized for missing due information).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Something the speaker committed to doing
    Commitment,

    /// A prompt to be surfaced at a time
    Reminder,

    /// Free-standing note, no obligation
    Note,

    /// Background fact, not directly actionable
    Informational,
}

impl Default for ActionType {
    fn default() -> Self {
        // An untagged candidate carries no obligation
        Self::Note
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Commitment => write!(f, "commitment"),
            ActionType::Reminder => write!(f, "reminder"),
            ActionType::Note => write!(f, "note"),
            ActionType::Informational => write!(f, "informational"),
        }
    }
}

/// Accept/reject outcome of comparing a score to the gate threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Score met the acceptance threshold
    Accepted,

    /// Score fell below the acceptance threshold
    Rejected,
}

impl Verdict {
    /// Check whether this verdict is an acceptance
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// A candidate after scoring and gating. Frozen: there is no mutation
/// API, and re-scoring produces a fresh value with a fresh `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    /// Identity of this scoring, not of the underlying text
    pub id: Uuid,

    /// The candidate as it was scored
    pub candidate: CandidateAction,

    /// Validation score in [0,100]
    pub score: u8,

    /// Human-readable defect descriptions, in rule-table order
    pub issues: Vec<String>,

    /// Accept/reject outcome
    pub verdict: Verdict,

    /// When the scoring happened
    pub scored_at: DateTime<Utc>,
}

impl ScoredCandidate {
    /// Freeze a scoring result with a fresh identity
    pub fn new(
        candidate: CandidateAction,
        score: u8,
        issues: Vec<String>,
        verdict: Verdict,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            candidate,
            score,
            issues,
            verdict,
            scored_at: Utc::now(),
        }
    }

    /// Fingerprint of the underlying candidate
    pub fn fingerprint(&self) -> String {
        self.candidate.fingerprint()
    }

    /// Check whether the verdict is an acceptance
    pub fn is_accepted(&self) -> bool {
        self.verdict.is_accepted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_deserialization_camel_case() {
        let json = r#"{
            "text": "Call the pharmacy to confirm refill",
            "actionType": "commitment",
            "scheduledDate": "2025-01-10",
            "extractionConfidence": 0.95
        }"#;

        let candidate: CandidateAction = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.text, "Call the pharmacy to confirm refill");
        assert_eq!(candidate.action_type, ActionType::Commitment);
        assert_eq!(
            candidate.scheduled_date,
            Some(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap())
        );
        assert_eq!(candidate.extraction_confidence, Some(0.95));
        assert!(candidate.assigned_to.is_none());
    }

    #[test]
    fn test_missing_action_type_defaults_to_note() {
        let json = r#"{"text": "Remember to water the plants"}"#;
        let candidate: CandidateAction = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.action_type, ActionType::Note);
    }

    #[test]
    fn test_missing_text_is_a_parse_error() {
        let json = r#"{"actionType": "reminder"}"#;
        let result = serde_json::from_str::<CandidateAction>(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{"text": "Review the budget draft", "speakerId": 3}"#;
        let candidate: CandidateAction = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.text, "Review the budget draft");
    }

    #[test]
    fn test_normalized_text_collapses_noise() {
        let candidate = CandidateAction::new("  Call   the Pharmacy!!  ");
        assert_eq!(candidate.normalized_text(), "call the pharmacy");
    }

    #[test]
    fn test_fingerprint_stable_across_formatting() {
        let a = CandidateAction::new("Call the pharmacy");
        let b = CandidateAction::new("call  THE pharmacy?");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 12);
    }

    #[test]
    fn test_fingerprint_differs_by_date() {
        let a = CandidateAction::new("Call the pharmacy")
            .with_scheduled_date(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
        let b = CandidateAction::new("Call the pharmacy")
            .with_scheduled_date(NaiveDate::from_ymd_opt(2025, 1, 11).unwrap());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_rescoring_produces_new_identity() {
        let candidate = CandidateAction::new("Call the pharmacy");
        let first = ScoredCandidate::new(candidate.clone(), 100, vec![], Verdict::Accepted);
        let second = ScoredCandidate::new(candidate, 100, vec![], Verdict::Accepted);
        assert_ne!(first.id, second.id);
        assert_eq!(first.fingerprint(), second.fingerprint());
    }
}
