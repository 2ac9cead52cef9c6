//! Import pipeline state model

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// States of the import state machine
///
/// Success moves strictly forward through the pipeline; any non-terminal
/// state may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    Idle,
    Decrypting,
    Extracting,
    Parsing,
    Verifying,
    Deduplicating,
    Assembling,
    Committed,
    Failed,
}

impl ImportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Decrypting => "decrypting",
            Self::Extracting => "extracting",
            Self::Parsing => "parsing",
            Self::Verifying => "verifying",
            Self::Deduplicating => "deduplicating",
            Self::Assembling => "assembling",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }

    /// The state that follows on success, if any
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Decrypting),
            Self::Decrypting => Some(Self::Extracting),
            Self::Extracting => Some(Self::Parsing),
            Self::Parsing => Some(Self::Verifying),
            Self::Verifying => Some(Self::Deduplicating),
            Self::Deduplicating => Some(Self::Assembling),
            Self::Assembling => Some(Self::Committed),
            Self::Committed | Self::Failed => None,
        }
    }

    /// Whether moving from `self` to `to` is a legal transition
    pub fn can_transition_to(&self, to: ImportState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How row-level parse failures are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportMode {
    /// Any parse error aborts the import
    #[default]
    Strict,
    /// Unparseable rows are skipped and reported; balance mismatches still abort
    BestEffort,
}

impl ImportMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "best-effort" | "best_effort" | "besteffort" => Some(Self::BestEffort),
            _ => None,
        }
    }
}

/// Cooperative cancellation signal
///
/// The orchestrator only looks at it between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_only() {
        assert!(ImportState::Idle.can_transition_to(ImportState::Decrypting));
        assert!(ImportState::Parsing.can_transition_to(ImportState::Verifying));
        assert!(!ImportState::Parsing.can_transition_to(ImportState::Extracting));
        assert!(!ImportState::Parsing.can_transition_to(ImportState::Assembling));
    }

    #[test]
    fn test_failed_reachable_from_non_terminal_only() {
        assert!(ImportState::Idle.can_transition_to(ImportState::Failed));
        assert!(ImportState::Assembling.can_transition_to(ImportState::Failed));
        assert!(!ImportState::Committed.can_transition_to(ImportState::Failed));
        assert!(!ImportState::Failed.can_transition_to(ImportState::Failed));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(ImportMode::parse("Strict"), Some(ImportMode::Strict));
        assert_eq!(ImportMode::parse("best-effort"), Some(ImportMode::BestEffort));
        assert_eq!(ImportMode::parse("lenient"), None);
    }

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
