//! Deduction rules for candidate validation.
//!
//! Each rule is an independent, named check: a predicate over the
//! candidate, a penalty, and a human-readable message. Rules do not
//! short-circuit; every matching rule fires and its message lands in
//! the issues list, because downstream retry prompts are built from
//! those messages.

use serde::{Deserialize, Serialize};

use crate::domain::candidate::{ActionType, CandidateAction};

/// Verbs a usable action phrase may start with
pub const ACTION_VERBS: &[&str] = &[
    "call", "email", "schedule", "send", "review", "check", "update", "create", "follow",
    "confirm", "prepare", "finalize", "reach", "contact", "share", "discuss", "meet", "book",
    "reserve", "pay", "submit", "complete", "order", "watch", "mind", "aware", "notice",
    "remember", "note", "keep", "track",
];

/// Identifies one deduction rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Double-space run or trimmed text under 10 characters
    Fragment,

    /// First word is not a known action verb
    MissingActionVerb,

    /// Scheduled time present but not valid HH:MM
    InvalidTimeFormat,

    /// Text under 10 characters
    TooShort,

    /// Text over 200 characters
    TooLong,

    /// Extractor reported confidence below 0.85
    LowConfidence,

    /// Over 30% of characters outside the plain-text alphabet
    ExcessSpecialChars,

    /// Commitment with neither a due context nor a scheduled date
    MissingDueInfo,
}

/// One independent deduction applied during scoring
#[derive(Clone)]
pub struct Rule {
    /// Which check this is
    pub kind: RuleKind,

    /// Points subtracted when the rule fires
    pub penalty: u8,

    /// Diagnostic added to the issues list when the rule fires
    pub message: &'static str,

    predicate: fn(&CandidateAction) -> bool,
}

impl Rule {
    /// Check whether this rule fires for the candidate
    pub fn applies(&self, candidate: &CandidateAction) -> bool {
        (self.predicate)(candidate)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("kind", &self.kind)
            .field("penalty", &self.penalty)
            .finish()
    }
}

/// The standard rule set, in evaluation order
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            kind: RuleKind::Fragment,
            penalty: 30,
            message: "Text looks like a sentence fragment",
            predicate: is_fragment,
        },
        Rule {
            kind: RuleKind::MissingActionVerb,
            penalty: 25,
            message: "Text does not start with an action verb",
            predicate: missing_action_verb,
        },
        Rule {
            kind: RuleKind::InvalidTimeFormat,
            penalty: 20,
            message: "Scheduled time is not a valid HH:MM value",
            predicate: invalid_time_format,
        },
        Rule {
            kind: RuleKind::TooShort,
            penalty: 25,
            message: "Text is too short to be a usable action",
            predicate: too_short,
        },
        Rule {
            kind: RuleKind::TooLong,
            penalty: 10,
            message: "Text is too long, likely several unsegmented actions",
            predicate: too_long,
        },
        Rule {
            kind: RuleKind::LowConfidence,
            penalty: 15,
            message: "Extractor reported low confidence",
            predicate: low_confidence,
        },
        Rule {
            kind: RuleKind::ExcessSpecialChars,
            penalty: 20,
            message: "Text contains too many special characters",
            predicate: excess_special_chars,
        },
        Rule {
            kind: RuleKind::MissingDueInfo,
            penalty: 10,
            message: "Commitment has no due context or scheduled date",
            predicate: missing_due_info,
        },
    ]
}

/// Double-space runs and sub-10-character trimmed text both indicate the
/// extractor emitted a fragment rather than a full instruction.
fn is_fragment(candidate: &CandidateAction) -> bool {
    candidate.text.contains("  ") || candidate.text.trim().chars().count() < 10
}

fn missing_action_verb(candidate: &CandidateAction) -> bool {
    match candidate.text.split_whitespace().next() {
        Some(first) => {
            let lowered = first.to_lowercase();
            !ACTION_VERBS.contains(&lowered.as_str())
        }
        None => true,
    }
}

fn invalid_time_format(candidate: &CandidateAction) -> bool {
    match candidate.scheduled_time.as_deref() {
        Some(value) => !is_valid_time(value),
        None => false,
    }
}

// Untrimmed on purpose; the fragment rule owns the trimmed check
fn too_short(candidate: &CandidateAction) -> bool {
    candidate.text.chars().count() < 10
}

fn too_long(candidate: &CandidateAction) -> bool {
    candidate.text.chars().count() > 200
}

fn low_confidence(candidate: &CandidateAction) -> bool {
    matches!(candidate.extraction_confidence, Some(c) if c < 0.85)
}

fn excess_special_chars(candidate: &CandidateAction) -> bool {
    let total = candidate.text.chars().count();
    if total == 0 {
        return false;
    }
    let special = candidate
        .text
        .chars()
        .filter(|c| !is_plain_char(*c))
        .count();
    special as f64 / total as f64 > 0.3
}

fn missing_due_info(candidate: &CandidateAction) -> bool {
    candidate.action_type == ActionType::Commitment
        && candidate.due_context.is_none()
        && candidate.scheduled_date.is_none()
}

fn is_plain_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, '.' | ',' | '!' | '?' | '-')
}

/// Strict `HH:MM` check: two digits, colon, two digits, in range
pub fn is_valid_time(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return false;
    }
    let digits = |a: u8, b: u8| -> Option<u32> {
        if a.is_ascii_digit() && b.is_ascii_digit() {
            Some(((a - b'0') as u32) * 10 + (b - b'0') as u32)
        } else {
            None
        }
    };
    match (digits(bytes[0], bytes[1]), digits(bytes[3], bytes[4])) {
        (Some(hour), Some(minute)) => hour <= 23 && minute <= 59,
        _ => false,
    }
}
