//! Statement content model: extracted text layout and parsed rows

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A run of text at a position on the page
///
/// Coordinates are PDF user-space points; `y` grows upwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCell {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

impl TextCell {
    pub fn new(text: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            text: text.into(),
            x,
            y,
        }
    }
}

/// One visual line of a page, cells ordered left to right
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub y: f64,
    pub cells: Vec<TextCell>,
}

impl Row {
    pub fn new(y: f64, cells: Vec<TextCell>) -> Self {
        Self { y, cells }
    }

    /// Cell texts joined by a tab, the form bank grammars match against
    pub fn joined(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.text.trim())
            .collect::<Vec<_>>()
            .join("\t")
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.text.trim().is_empty())
    }
}

/// A page's rows, ordered top to bottom
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub index: usize,
    pub rows: Vec<Row>,
}

/// Positionally reconstructed text of a whole statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub pages: Vec<Page>,
}

impl ExtractedDocument {
    pub fn new(pages: Vec<Page>) -> Self {
        Self { pages }
    }

    /// Build a document from plain cell text, one inner vector per row.
    ///
    /// Positions are synthesized on a regular grid; handy for feeding
    /// grammars without going through a PDF.
    pub fn from_cells(pages: Vec<Vec<Vec<&str>>>) -> Self {
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(index, rows)| Page {
                index,
                rows: rows
                    .into_iter()
                    .enumerate()
                    .map(|(r, cells)| {
                        let y = 800.0 - (r as f64) * 12.0;
                        Row::new(
                            y,
                            cells
                                .into_iter()
                                .enumerate()
                                .map(|(c, text)| TextCell::new(text, 40.0 + c as f64 * 120.0, y))
                                .collect(),
                        )
                    })
                    .collect(),
            })
            .collect();
        Self { pages }
    }

    pub fn row_count(&self) -> usize {
        self.pages.iter().map(|p| p.rows.len()).sum()
    }

    pub fn has_text(&self) -> bool {
        self.pages
            .iter()
            .flat_map(|p| &p.rows)
            .any(|r| !r.is_blank())
    }
}

/// A transaction row as printed on the statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub date: NaiveDate,
    pub description: String,
    /// Signed: negative for money leaving the account
    pub amount: Decimal,
    /// Running balance printed on the row, if the statement shows one
    pub balance_after: Option<Decimal>,
    pub page_index: usize,
    pub row_index: usize,
    /// Original row text (plus continuation rows), kept for audit
    pub source_text: String,
}

/// Statement-level facts declared by the bank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementSummary {
    pub account_identifier: Option<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
}

impl StatementSummary {
    /// Net change the statement declares
    pub fn declared_change(&self) -> Decimal {
        self.closing_balance - self.opening_balance
    }
}
