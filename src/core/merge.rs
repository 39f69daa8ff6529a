//! Deduplicating merge of accepted items into a recording's set.
//!
//! Two items are duplicates when their normalized texts overlap heavily
//! AND they target the same day (or both carry no date). The higher
//! score wins a contest; the loser survives only as an audit record.
//! Merging never mutates the current set: every merge produces a new
//! versioned value, which keeps the single-writer rule checkable by
//! comparing versions.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::candidate::CandidateAction;
use crate::domain::recording::{AcceptedItem, AcceptedSet, DisplacedRecord};

/// Token overlap two texts need before they count as the same item
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;

/// Controls when two accepted items are considered duplicates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergePolicy {
    /// Jaccard similarity over normalized tokens, in [0,1]
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl MergePolicy {
    /// Policy with a custom similarity threshold
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
        }
    }

    /// Check whether two candidates describe the same item.
    ///
    /// Requires both high lexical overlap and the same time window: the
    /// same day when both carry a date, or no date on either side. A
    /// dated and an undated copy are kept as distinct items.
    pub fn are_duplicates(&self, a: &CandidateAction, b: &CandidateAction) -> bool {
        if !same_window(a, b) {
            return false;
        }
        token_similarity(&a.normalized_text(), &b.normalized_text())
            >= self.similarity_threshold
    }

    /// Merge incoming items into the current set, producing a new set
    /// value one version ahead.
    ///
    /// Each incoming item either enters the set, replaces a
    /// lower-scoring duplicate, or is discarded against a duplicate
    /// that scores at least as high (ties keep the incumbent).
    pub fn merge(
        &self,
        current: &AcceptedSet,
        incoming: Vec<AcceptedItem>,
    ) -> MergeOutcome {
        let mut next = current.clone();
        next.version += 1;

        let mut entered = Vec::new();
        let mut displaced = Vec::new();
        let mut report = MergeReport::default();

        for item in incoming {
            let contest = next
                .items
                .iter()
                .find(|existing| self.are_duplicates(&existing.candidate, &item.candidate))
                .map(|existing| (existing.id, existing.score, existing.fingerprint.clone()));

            match contest {
                None => {
                    entered.push(item.clone());
                    next.apply_accept(item);
                    report.added += 1;
                }
                Some((incumbent_id, incumbent_score, incumbent_fingerprint)) => {
                    if item.score > incumbent_score {
                        let record = DisplacedRecord {
                            item_id: incumbent_id,
                            fingerprint: incumbent_fingerprint,
                            score: incumbent_score,
                            replaced_by: item.id,
                            displaced_at: Utc::now(),
                        };
                        displaced.push(record.clone());
                        next.apply_displacement(record);
                        entered.push(item.clone());
                        next.apply_accept(item);
                        report.replaced += 1;
                    } else {
                        let record = DisplacedRecord {
                            item_id: item.id,
                            fingerprint: item.fingerprint.clone(),
                            score: item.score,
                            replaced_by: incumbent_id,
                            displaced_at: Utc::now(),
                        };
                        displaced.push(record.clone());
                        next.apply_displacement(record);
                        report.discarded += 1;
                    }
                }
            }
        }

        MergeOutcome {
            set: next,
            entered,
            displaced,
            report,
        }
    }
}

/// What one merge did
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The new set value (version = previous + 1)
    pub set: AcceptedSet,

    /// Items that entered the set, in merge order
    pub entered: Vec<AcceptedItem>,

    /// Dedup losers recorded during this merge
    pub displaced: Vec<DisplacedRecord>,

    /// Counts for status output
    pub report: MergeReport,
}

/// Counts summarizing one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Incoming items with no duplicate in the set
    pub added: usize,

    /// Incoming items that beat a lower-scoring incumbent
    pub replaced: usize,

    /// Incoming items that lost against the set
    pub discarded: usize,
}

/// Jaccard similarity over whitespace-separated tokens.
///
/// Both inputs are expected pre-normalized; two empty texts count as
/// identical.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();
    intersection as f64 / union as f64
}

fn same_window(a: &CandidateAction, b: &CandidateAction) -> bool {
    match (a.scheduled_date, b.scheduled_date) {
        (Some(left), Some(right)) => left == right,
        (None, None) => true,
        _ => false,
    }
}
