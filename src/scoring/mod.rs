//! Candidate validation: rule-based scoring plus the acceptance gate.
//!
//! Scoring is a pure function over a candidate:
//! - Start at 100 and subtract each matching rule's penalty
//! - Collect every matching rule's message into the issues list
//! - Clamp the result to [0, 100]
//!
//! The gate then compares the score to a configurable threshold.
//! Data-quality problems lower the score; malformed input that breaks
//! the scoring contract (empty text, confidence outside [0,1]) is a
//! [`ContractViolation`] and never produces a verdict at all.

pub mod gate;
pub mod rules;

use thiserror::Error;

pub use gate::{GatePolicy, DEFAULT_ACCEPT_THRESHOLD};
pub use rules::{default_rules, Rule, RuleKind, ACTION_VERBS};

use crate::domain::candidate::{CandidateAction, ScoredCandidate};

/// Highest score the scorer can produce
pub const MAX_SCORE: u8 = 100;

/// The input or the scorer itself broke the scoring contract.
///
/// Distinct from a rejection: a rejected candidate was scored fine and
/// fell below the bar, while a contract violation means somebody
/// upstream handed us garbage that scoring cannot honestly evaluate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractViolation {
    #[error("Candidate text is empty")]
    EmptyText,

    #[error("Extraction confidence {value} is outside [0,1]")]
    ConfidenceOutOfRange { value: f64 },

    #[error("Validation score {score} is outside [0,100]")]
    ScoreOutOfRange { score: u8 },
}

/// Score and issues for one candidate, before the gate
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    /// Validation score in [0,100]
    pub score: u8,

    /// Messages of every rule that fired, in rule order
    pub issues: Vec<String>,
}

/// Applies the deduction rules to candidates
#[derive(Debug, Clone)]
pub struct Scorer {
    rules: Vec<Rule>,
}

impl Scorer {
    /// Scorer with the standard rule set
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    /// Scorer with a custom rule set
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The rules this scorer applies, in order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Score a candidate.
    ///
    /// Pure and deterministic; every applicable rule fires and its
    /// message is collected even when the score already hit zero.
    pub fn score(&self, candidate: &CandidateAction) -> Result<RuleOutcome, ContractViolation> {
        if candidate.text.trim().is_empty() {
            return Err(ContractViolation::EmptyText);
        }
        if let Some(value) = candidate.extraction_confidence {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ContractViolation::ConfidenceOutOfRange { value });
            }
        }

        let mut total = MAX_SCORE as i32;
        let mut issues = Vec::new();
        for rule in &self.rules {
            if rule.applies(candidate) {
                total -= rule.penalty as i32;
                issues.push(rule.message.to_string());
            }
        }

        Ok(RuleOutcome {
            score: total.clamp(0, MAX_SCORE as i32) as u8,
            issues,
        })
    }

    /// Score a candidate and gate the result into a scored record.
    ///
    /// Consumes the candidate: a scored record is immutable, and
    /// re-scoring later builds a fresh record with a fresh identity.
    pub fn evaluate(
        &self,
        candidate: CandidateAction,
        policy: &GatePolicy,
    ) -> Result<ScoredCandidate, ContractViolation> {
        let outcome = self.score(&candidate)?;
        let verdict = policy.decide(outcome.score, candidate.action_type)?;
        Ok(ScoredCandidate::new(
            candidate,
            outcome.score,
            outcome.issues,
            verdict,
        ))
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new()
    }
}
