//! Accept/reject policy over validation scores.
//!
//! The gate is kept separate from the scorer so the acceptance bar can
//! be tuned or varied per action type without touching the rules. A
//! score outside the scoring contract is a programming error and is
//! surfaced as such, never coerced into a rejection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{ContractViolation, MAX_SCORE};
use crate::domain::candidate::{ActionType, Verdict};

/// Score required for acceptance unless overridden
pub const DEFAULT_ACCEPT_THRESHOLD: u8 = 70;

/// Acceptance policy applied after scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Minimum score a candidate must reach
    #[serde(default = "default_threshold")]
    pub threshold: u8,

    /// Per-action-type overrides of the base threshold
    #[serde(default)]
    pub per_type: HashMap<ActionType, u8>,
}

fn default_threshold() -> u8 {
    DEFAULT_ACCEPT_THRESHOLD
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_ACCEPT_THRESHOLD,
            per_type: HashMap::new(),
        }
    }
}

impl GatePolicy {
    /// Policy with a uniform threshold
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold,
            per_type: HashMap::new(),
        }
    }

    /// Override the threshold for one action type
    pub fn with_override(mut self, action_type: ActionType, threshold: u8) -> Self {
        self.per_type.insert(action_type, threshold);
        self
    }

    /// The threshold that applies to the given action type
    pub fn effective_threshold(&self, action_type: ActionType) -> u8 {
        self.per_type
            .get(&action_type)
            .copied()
            .unwrap_or(self.threshold)
    }

    /// Turn a score into a verdict.
    ///
    /// Fails if the score is outside [0,100]; that means the scorer is
    /// broken, which must not masquerade as an ordinary rejection.
    pub fn decide(&self, score: u8, action_type: ActionType) -> Result<Verdict, ContractViolation> {
        if score > MAX_SCORE {
            return Err(ContractViolation::ScoreOutOfRange { score });
        }
        if score >= self.effective_threshold(action_type) {
            Ok(Verdict::Accepted)
        } else {
            Ok(Verdict::Rejected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold_boundary() {
        let policy = GatePolicy::default();
        assert_eq!(
            policy.decide(70, ActionType::Note).unwrap(),
            Verdict::Accepted
        );
        assert_eq!(
            policy.decide(69, ActionType::Note).unwrap(),
            Verdict::Rejected
        );
        assert_eq!(
            policy.decide(100, ActionType::Note).unwrap(),
            Verdict::Accepted
        );
        assert_eq!(
            policy.decide(0, ActionType::Note).unwrap(),
            Verdict::Rejected
        );
    }

    #[test]
    fn test_per_type_override() {
        let policy = GatePolicy::default().with_override(ActionType::Commitment, 85);

        assert_eq!(policy.effective_threshold(ActionType::Commitment), 85);
        assert_eq!(policy.effective_threshold(ActionType::Note), 70);

        assert_eq!(
            policy.decide(80, ActionType::Commitment).unwrap(),
            Verdict::Rejected
        );
        assert_eq!(
            policy.decide(80, ActionType::Note).unwrap(),
            Verdict::Accepted
        );
    }

    #[test]
    fn test_out_of_range_score_is_a_contract_violation() {
        let policy = GatePolicy::default();
        let result = policy.decide(101, ActionType::Note);
        assert!(matches!(
            result,
            Err(ContractViolation::ScoreOutOfRange { score: 101 })
        ));
    }
}
