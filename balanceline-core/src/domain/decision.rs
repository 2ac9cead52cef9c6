//! Duplicate classification model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a statement row relates to the account's existing history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Exact fingerprint already in history; skipped
    Duplicate,
    /// Same amount, nearby date, different description; left for the user
    ManualReview,
    /// Not seen before; committed
    New,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::ManualReview => "manual_review",
            Self::New => "new",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "duplicate" => Some(Self::Duplicate),
            "manual_review" => Some(Self::ManualReview),
            "new" => Some(Self::New),
            _ => None,
        }
    }
}

/// Outcome of duplicate detection for one raw transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateDecision {
    pub classification: Classification,
    /// Fingerprint computed for the row (ordinal included)
    pub fingerprint: String,
    /// Position among identical rows earlier in the same statement
    pub ordinal: u32,
    /// Existing transaction this row was matched against
    pub matched_transaction_id: Option<Uuid>,
}

/// Per-classification tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionCounts {
    pub new: usize,
    pub duplicate: usize,
    pub manual_review: usize,
}

impl DecisionCounts {
    pub fn tally(decisions: &[DuplicateDecision]) -> Self {
        decisions.iter().fold(Self::default(), |mut acc, d| {
            match d.classification {
                Classification::New => acc.new += 1,
                Classification::Duplicate => acc.duplicate += 1,
                Classification::ManualReview => acc.manual_review += 1,
            }
            acc
        })
    }

    pub fn total(&self) -> usize {
        self.new + self.duplicate + self.manual_review
    }
}
