//! Import batch model: the unit of atomic commit

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::balance::BalanceSnapshot;
use super::decision::{Classification, DecisionCounts};
use super::result::{Error, Result};
use super::statement::{RawTransaction, StatementSummary};
use super::transaction::Transaction;

/// Lifecycle of a batch
///
/// `Pending` moves to `Committed` or `Failed` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Committed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "committed" => Some(Self::Committed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One imported statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: Uuid,
    pub account_id: Uuid,
    pub bank_id: String,
    /// SHA-256 of the archive bytes
    pub source_hash: String,
    /// File name the archive was read from, if known
    pub source_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub summary: StatementSummary,
    pub status: BatchStatus,
    /// closing - opening as declared by the statement
    pub statement_delta: Decimal,
    /// Portion of the statement delta applied to the account balance
    pub applied_delta: Decimal,
    pub counts: DecisionCounts,
}

impl ImportBatch {
    pub fn new(
        account_id: Uuid,
        bank_id: impl Into<String>,
        source_hash: impl Into<String>,
        summary: StatementSummary,
    ) -> Self {
        let statement_delta = summary.declared_change();
        Self {
            id: Uuid::new_v4(),
            account_id,
            bank_id: bank_id.into(),
            source_hash: source_hash.into(),
            source_name: None,
            created_at: Utc::now(),
            summary,
            status: BatchStatus::Pending,
            statement_delta,
            applied_delta: Decimal::ZERO,
            counts: DecisionCounts::default(),
        }
    }

    pub fn mark_committed(&mut self) -> Result<()> {
        self.transition(BatchStatus::Committed)
    }

    pub fn mark_failed(&mut self) -> Result<()> {
        self.transition(BatchStatus::Failed)
    }

    fn transition(&mut self, to: BatchStatus) -> Result<()> {
        if self.status != BatchStatus::Pending {
            return Err(Error::validation(format!(
                "batch {} is {} and cannot become {}",
                self.id,
                self.status.as_str(),
                to.as_str()
            )));
        }
        self.status = to;
        Ok(())
    }
}

/// Append-only pairing of a statement row with what the import did with it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub batch_id: Uuid,
    /// Position of the row among the statement's transactions
    pub sequence: usize,
    pub raw: RawTransaction,
    pub classification: Classification,
    pub fingerprint: String,
    /// Canonical transaction created for the row (New rows only)
    pub transaction_id: Option<Uuid>,
    /// Existing transaction the row was matched against
    pub matched_transaction_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A row held back for the user to decide on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    pub batch_id: Uuid,
    pub account_id: Uuid,
    pub fingerprint: String,
    pub raw: RawTransaction,
    pub matched_transaction_id: Option<Uuid>,
    pub status: ReviewStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Transaction inserted when the item was accepted
    pub transaction_id: Option<Uuid>,
}

/// Everything one commit writes, assembled in memory beforehand
#[derive(Debug, Clone)]
pub struct StagedBatch {
    pub batch: ImportBatch,
    pub transactions: Vec<Transaction>,
    pub audit: Vec<AuditRecord>,
    pub review_items: Vec<ReviewItem>,
    /// Balance the account will hold once the batch lands
    pub balance: BalanceSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn summary() -> StatementSummary {
        StatementSummary {
            account_identifier: None,
            period_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            opening_balance: Decimal::new(100000, 2),
            closing_balance: Decimal::new(87550, 2),
        }
    }

    #[test]
    fn test_new_batch_is_pending_with_statement_delta() {
        let batch = ImportBatch::new(Uuid::new_v4(), "first-meridian", "abc", summary());
        assert_eq!(batch.status, BatchStatus::Pending);
        assert_eq!(batch.statement_delta, Decimal::new(-12450, 2));
    }

    #[test]
    fn test_batch_transitions_once() {
        let mut batch = ImportBatch::new(Uuid::new_v4(), "first-meridian", "abc", summary());
        batch.mark_committed().unwrap();
        assert_eq!(batch.status, BatchStatus::Committed);
        assert!(batch.mark_failed().is_err());
        assert!(batch.mark_committed().is_err());
        assert_eq!(batch.status, BatchStatus::Committed);
    }

    #[test]
    fn test_failed_batch_cannot_commit() {
        let mut batch = ImportBatch::new(Uuid::new_v4(), "nordbank", "abc", summary());
        batch.mark_failed().unwrap();
        assert!(batch.mark_committed().is_err());
    }
}
