//! Statement importer port
//!
//! One importer per bank, selected by bank identifier through the
//! importer registry.

use crate::domain::result::ParseError;
use crate::domain::{ExtractedDocument, ImportMode, RawTransaction, StatementSummary};

/// Everything a parser pulls out of a statement
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    /// Transactions in document order across all pages
    pub transactions: Vec<RawTransaction>,
    pub summary: StatementSummary,
    /// Rows skipped in best-effort mode (always empty in strict mode)
    pub row_errors: Vec<ParseError>,
}

pub trait StatementImporter: Send + Sync {
    /// Registry key (e.g. "first-meridian")
    fn bank_id(&self) -> &str;

    /// Human-readable bank name
    fn display_name(&self) -> &str;

    /// Parse an extracted statement
    ///
    /// In strict mode the first row-level error aborts; in best-effort mode
    /// row-level errors are collected and the row is skipped. Statement-level
    /// errors (missing summary) always abort.
    fn parse(
        &self,
        document: &ExtractedDocument,
        mode: ImportMode,
    ) -> Result<ParsedStatement, ParseError>;
}
