//! Ledger repository port - account history and atomic batch commit

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Result, StorageError};
use crate::domain::{
    Account, AuditRecord, BalanceSnapshot, ImportBatch, ReviewItem, StagedBatch, Transaction,
};

/// What the duplicate detector needs to know about an account
#[derive(Debug, Clone, Default)]
pub struct AccountHistory {
    /// Latest balance, `None` if the account has never had one
    pub balance: Option<Decimal>,
    /// Committed transactions within the requested date range
    pub transactions: Vec<Transaction>,
    /// Pending or rejected review items within the range; their amounts
    /// have already reached the balance
    pub held: Vec<ReviewItem>,
}

/// Ledger storage abstraction
///
/// This is the account history provider of the import pipeline: it scopes
/// history for duplicate detection and takes a staged batch as one atomic
/// write. Implementations must guarantee that `commit_batch` either lands
/// everything in the batch or nothing.
pub trait LedgerRepository: Send + Sync {
    // === Accounts ===

    /// Add a new account
    fn add_account(&self, account: &Account) -> Result<()>;

    /// Get account by ID, with its latest balance
    fn get_account(&self, id: Uuid) -> Result<Option<Account>>;

    /// Get all accounts
    fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Append a balance snapshot outside of any import (manual balance)
    fn add_balance_snapshot(&self, snapshot: &BalanceSnapshot) -> Result<()>;

    // === History ===

    /// Current balance plus committed transactions dated within `[from, to]`
    fn load_history(
        &self,
        account_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> std::result::Result<AccountHistory, StorageError>;

    /// All committed transactions of an account, newest first
    fn get_transactions(&self, account_id: Uuid) -> Result<Vec<Transaction>>;

    // === Batches ===

    /// Write transactions, audit records, review items, the balance snapshot
    /// and the batch row in one database transaction
    fn commit_batch(&self, staged: &StagedBatch) -> std::result::Result<(), StorageError>;

    /// Record a batch whose commit failed (batch row only)
    fn record_failed_batch(&self, batch: &ImportBatch) -> std::result::Result<(), StorageError>;

    /// Batches newest first, optionally for one account
    fn list_batches(&self, account_id: Option<Uuid>) -> Result<Vec<ImportBatch>>;

    fn get_batch(&self, batch_id: Uuid) -> Result<Option<ImportBatch>>;

    /// Audit records of a batch in statement order
    fn get_audit_records(&self, batch_id: Uuid) -> Result<Vec<AuditRecord>>;

    // === Review ===

    /// Review items, optionally only those of one batch
    fn get_review_items(&self, batch_id: Option<Uuid>) -> Result<Vec<ReviewItem>>;

    /// Persist the outcome of a review in one database transaction: an
    /// accepted item brings its transaction along, a rejected one may bring
    /// a correcting balance snapshot
    fn resolve_review(
        &self,
        item: &ReviewItem,
        accepted: Option<&Transaction>,
        correction: Option<&BalanceSnapshot>,
    ) -> Result<()>;
}
