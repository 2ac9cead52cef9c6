//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
mod archive;
pub mod balance;
mod batch;
mod decision;
pub mod grammar;
pub mod import;
pub mod result;
mod statement;
mod transaction;

pub use account::Account;
pub use archive::{content_hash, DocumentBytes, EncryptedArchive};
pub use balance::BalanceSnapshot;
pub use batch::{AuditRecord, BatchStatus, ImportBatch, ReviewItem, ReviewStatus, StagedBatch};
pub use decision::{Classification, DecisionCounts, DuplicateDecision};
pub use grammar::{BankGrammar, NumberFormat, RowKind, RowPattern};
pub use import::{CancelFlag, ImportMode, ImportState};
pub use statement::{
    ExtractedDocument, Page, RawTransaction, Row, StatementSummary, TextCell,
};
pub use transaction::Transaction;
