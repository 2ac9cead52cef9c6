//! Result and error types for the core library
//!
//! Pipeline stages fail with their own typed errors (`ArchiveError`,
//! `ExtractionError`, `ParseError`, `BalanceMismatchError`, `StorageError`).
//! The orchestrator wraps whichever one occurred into an `ImportError`
//! carrying the stage it happened in. Nothing here ever holds a password.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use super::import::ImportState;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Self::Database(format!("{:#}", e))
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Stage errors
// ============================================================================

/// Failures opening the password-protected container
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ArchiveError {
    #[error("the archive password is incorrect")]
    WrongPassword,

    #[error("the archive is corrupt: {0}")]
    CorruptArchive(String),

    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),
}

impl ArchiveError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WrongPassword => "WrongPassword",
            Self::CorruptArchive(_) => "CorruptArchive",
            Self::UnsupportedFormat(_) => "UnsupportedFormat",
        }
    }
}

/// Failures turning document bytes into positioned text
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExtractionError {
    #[error("the document has no extractable text layer (scanned or image-only statements are not supported)")]
    NoTextLayer,

    #[error("unsupported document version: {0}")]
    UnsupportedDocumentVersion(String),

    #[error("the document is itself encrypted")]
    EncryptedDocument,

    #[error("malformed document: {0}")]
    Malformed(String),
}

impl ExtractionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoTextLayer => "NoTextLayer",
            Self::UnsupportedDocumentVersion(_) => "UnsupportedDocumentVersion",
            Self::EncryptedDocument => "EncryptedDocument",
            Self::Malformed(_) => "MalformedDocument",
        }
    }
}

/// Failures applying a bank grammar to extracted rows
///
/// Row-level variants carry 1-based page and row numbers plus the row's
/// raw text for diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ParseError {
    #[error("page {page}, row {row}: no pattern matches {text:?}")]
    UnrecognizedRowFormat { page: usize, row: usize, text: String },

    #[error("page {page}, row {row}: patterns {patterns:?} match {text:?} with equal specificity")]
    AmbiguousRow {
        page: usize,
        row: usize,
        text: String,
        patterns: Vec<String>,
    },

    #[error("page {page}, row {row}: cannot parse amount {value:?}")]
    InvalidAmount { page: usize, row: usize, value: String },

    #[error("page {page}, row {row}: cannot parse date {value:?}")]
    InvalidDate { page: usize, row: usize, value: String },

    #[error("statement summary incomplete: {0}")]
    MissingSummary(String),

    #[error("statement belongs to account {found}, expected {expected}")]
    AccountMismatch { expected: String, found: String },

    #[error("no importer registered for bank '{0}'")]
    UnknownBank(String),
}

impl ParseError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnrecognizedRowFormat { .. } => "UnrecognizedRowFormat",
            Self::AmbiguousRow { .. } => "AmbiguousRow",
            Self::InvalidAmount { .. } => "InvalidAmount",
            Self::InvalidDate { .. } => "InvalidDate",
            Self::MissingSummary(_) => "MissingSummary",
            Self::AccountMismatch { .. } => "AccountMismatch",
            Self::UnknownBank(_) => "UnknownBank",
        }
    }

    /// Whether this error concerns a single row (and may be skipped in best-effort mode)
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            Self::UnrecognizedRowFormat { .. }
                | Self::AmbiguousRow { .. }
                | Self::InvalidAmount { .. }
                | Self::InvalidDate { .. }
        )
    }
}

/// Which declared balance a mismatch was detected against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    /// A balance printed next to a transaction row
    Row,
    /// The statement's closing balance
    Closing,
}

/// The statement's own arithmetic does not hold
///
/// `expected` is the balance the statement declares, `actual` is the
/// running total replayed from the opening balance.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("balance mismatch at transaction {at_index} ({checkpoint:?} checkpoint): statement declares {expected}, transactions sum to {actual}")]
pub struct BalanceMismatchError {
    pub at_index: usize,
    pub checkpoint: Checkpoint,
    pub expected: Decimal,
    pub actual: Decimal,
}

/// Failures reading from or committing to the ledger
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StorageError {
    #[error("commit failed and was rolled back: {0}")]
    CommitFailed(String),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CommitFailed(_) => "CommitFailed",
            Self::Unavailable(_) => "StorageUnavailable",
        }
    }
}

/// Failures obtaining the archive password from the secret collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("password entry was cancelled")]
    Cancelled,

    #[error("password unavailable: {0}")]
    Unavailable(String),
}

/// Any failure a pipeline stage can produce
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Balance(#[from] BalanceMismatchError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("account {0} not found")]
    AccountNotFound(Uuid),

    #[error("could not acquire the account lock: {0}")]
    Lock(String),

    #[error("import cancelled")]
    Cancelled,
}

impl StageError {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Archive(e) => e.kind(),
            Self::Extraction(e) => e.kind(),
            Self::Parse(e) => e.kind(),
            Self::Balance(_) => "BalanceMismatch",
            Self::Storage(e) => e.kind(),
            Self::Secret(SecretError::Cancelled) => "SecretCancelled",
            Self::Secret(SecretError::Unavailable(_)) => "SecretUnavailable",
            Self::AccountNotFound(_) => "AccountNotFound",
            Self::Lock(_) => "LockFailed",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// A failed import: which stage failed and why
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{stage} failed: {error}")]
pub struct ImportError {
    pub stage: ImportState,
    pub error: StageError,
}

impl ImportError {
    pub fn new(stage: ImportState, error: impl Into<StageError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }

    /// Human-readable cause
    pub fn detail(&self) -> String {
        self.error.to_string()
    }

    pub fn is_wrong_password(&self) -> bool {
        matches!(self.error, StageError::Archive(ArchiveError::WrongPassword))
    }
}

impl Serialize for ImportError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ImportError", 3)?;
        s.serialize_field("stage", &self.stage)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("detail", &self.detail())?;
        s.end()
    }
}

// ============================================================================
// Operation envelope
// ============================================================================

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Create a failed result with context
    pub fn fail_with_context(
        error: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: Some(context),
        }
    }
}

impl<T> From<std::result::Result<T, ImportError>> for OperationResult<T> {
    fn from(result: std::result::Result<T, ImportError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                let mut context = HashMap::new();
                context.insert("stage".to_string(), serde_json::json!(e.stage));
                context.insert("kind".to_string(), serde_json::json!(e.kind()));
                Self::fail_with_context(e.detail(), context)
            }
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(e.to_string()),
        }
    }
}
