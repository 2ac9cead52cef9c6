//! Grammar-driven statement importer
//!
//! Applies a `BankGrammar` to an extracted statement in three passes:
//! classify every row, read statement-level facts (account, period), then
//! build transactions and the opening/closing balances in document order.

use chrono::NaiveDate;
use regex::{Captures, Regex};
use rust_decimal::Decimal;

use crate::domain::result::{Error, ParseError, Result};
use crate::domain::{
    BankGrammar, ExtractedDocument, ImportMode, RawTransaction, RowKind, StatementSummary,
};
use crate::ports::{ParsedStatement, StatementImporter};

struct CompiledPattern {
    name: String,
    kind: RowKind,
    specificity: u8,
    regex: Regex,
}

/// A row that matched exactly one winning pattern
struct ClassifiedRow {
    page: usize,
    row: usize,
    text: String,
    pattern: usize,
}

/// Collects row-level errors in best-effort mode, fails fast in strict mode
struct ErrorSink {
    mode: ImportMode,
    errors: Vec<ParseError>,
}

impl ErrorSink {
    fn report(&mut self, error: ParseError) -> std::result::Result<(), ParseError> {
        match self.mode {
            ImportMode::Strict => Err(error),
            ImportMode::BestEffort => {
                self.errors.push(error);
                Ok(())
            }
        }
    }
}

/// `StatementImporter` backed by a bank grammar descriptor
pub struct GrammarImporter {
    grammar: BankGrammar,
    patterns: Vec<CompiledPattern>,
}

impl GrammarImporter {
    pub fn new(grammar: BankGrammar) -> Result<Self> {
        grammar.validate()?;
        let patterns = grammar
            .patterns
            .iter()
            .map(|p| {
                Ok(CompiledPattern {
                    name: p.name.clone(),
                    kind: p.kind,
                    specificity: p.effective_specificity(),
                    regex: Regex::new(&p.anchored()).map_err(|e| {
                        Error::config(format!("pattern '{}': {}", p.name, e))
                    })?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { grammar, patterns })
    }

    pub fn grammar(&self) -> &BankGrammar {
        &self.grammar
    }

    /// Pick the most specific matching pattern for a row
    fn classify(
        &self,
        page: usize,
        row: usize,
        text: &str,
    ) -> std::result::Result<usize, ParseError> {
        let matches: Vec<usize> = self
            .patterns
            .iter()
            .enumerate()
            .filter(|(_, p)| p.regex.is_match(text))
            .map(|(i, _)| i)
            .collect();

        let Some(best) = matches.iter().map(|&i| self.patterns[i].specificity).max() else {
            return Err(ParseError::UnrecognizedRowFormat {
                page: page + 1,
                row: row + 1,
                text: text.to_string(),
            });
        };
        let winners: Vec<usize> = matches
            .into_iter()
            .filter(|&i| self.patterns[i].specificity == best)
            .collect();
        if winners.len() > 1 {
            return Err(ParseError::AmbiguousRow {
                page: page + 1,
                row: row + 1,
                text: text.to_string(),
                patterns: winners
                    .iter()
                    .map(|&i| self.patterns[i].name.clone())
                    .collect(),
            });
        }
        Ok(winners[0])
    }

    fn captures<'t>(&self, row: &'t ClassifiedRow) -> Option<Captures<'t>> {
        self.patterns[row.pattern].regex.captures(&row.text)
    }

    fn amount(
        &self,
        row: &ClassifiedRow,
        raw: &str,
    ) -> std::result::Result<Decimal, ParseError> {
        self.grammar
            .number_format
            .parse_amount(raw)
            .ok_or_else(|| ParseError::InvalidAmount {
                page: row.page + 1,
                row: row.row + 1,
                value: raw.to_string(),
            })
    }

    fn date(
        &self,
        row: &ClassifiedRow,
        raw: &str,
        reference: Option<NaiveDate>,
    ) -> std::result::Result<NaiveDate, ParseError> {
        self.grammar
            .parse_date(raw, reference)
            .ok_or_else(|| ParseError::InvalidDate {
                page: row.page + 1,
                row: row.row + 1,
                value: raw.to_string(),
            })
    }

    /// Signed amount of a transaction row from `amount` or `debit`/`credit`
    fn signed_amount(
        &self,
        row: &ClassifiedRow,
        caps: &Captures<'_>,
    ) -> std::result::Result<Decimal, ParseError> {
        if let Some(raw) = capture(caps, "amount") {
            return self.amount(row, raw);
        }
        let debit = capture(caps, "debit")
            .map(|raw| self.amount(row, raw))
            .transpose()?;
        let credit = capture(caps, "credit")
            .map(|raw| self.amount(row, raw))
            .transpose()?;
        match (debit, credit) {
            (None, None) => Err(ParseError::InvalidAmount {
                page: row.page + 1,
                row: row.row + 1,
                value: String::new(),
            }),
            (debit, credit) => {
                Ok(credit.map(|c| c.abs()).unwrap_or_default()
                    - debit.map(|d| d.abs()).unwrap_or_default())
            }
        }
    }

    fn parse_transaction(
        &self,
        row: &ClassifiedRow,
        reference: Option<NaiveDate>,
    ) -> std::result::Result<RawTransaction, ParseError> {
        let caps = self
            .captures(row)
            .ok_or_else(|| ParseError::UnrecognizedRowFormat {
                page: row.page + 1,
                row: row.row + 1,
                text: row.text.clone(),
            })?;
        let date_raw = capture(&caps, "date").unwrap_or_default();
        let date = self.date(row, date_raw, reference)?;
        let amount = self.signed_amount(row, &caps)?;
        let balance_after = capture(&caps, "balance")
            .map(|raw| self.amount(row, raw))
            .transpose()?;
        let description = capture(&caps, "description")
            .map(clean_description)
            .unwrap_or_default();

        Ok(RawTransaction {
            date,
            description,
            amount,
            balance_after,
            page_index: row.page,
            row_index: row.row,
            source_text: row.text.clone(),
        })
    }
}

/// A named capture, trimmed; empty captures count as absent
fn capture<'t>(caps: &Captures<'t>, name: &str) -> Option<&'t str> {
    caps.name(name)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

fn clean_description(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl StatementImporter for GrammarImporter {
    fn bank_id(&self) -> &str {
        &self.grammar.bank_id
    }

    fn display_name(&self) -> &str {
        &self.grammar.display_name
    }

    fn parse(
        &self,
        document: &ExtractedDocument,
        mode: ImportMode,
    ) -> std::result::Result<ParsedStatement, ParseError> {
        let mut sink = ErrorSink {
            mode,
            errors: Vec::new(),
        };

        // Pass 1: classify
        let mut rows: Vec<ClassifiedRow> = Vec::new();
        for page in &document.pages {
            for (row_index, row) in page.rows.iter().enumerate() {
                if row.is_blank() {
                    continue;
                }
                let text = row.joined();
                match self.classify(page.index, row_index, &text) {
                    Ok(pattern) => rows.push(ClassifiedRow {
                        page: page.index,
                        row: row_index,
                        text,
                        pattern,
                    }),
                    Err(e) => sink.report(e)?,
                }
            }
        }
        let kind_of = |row: &ClassifiedRow| self.patterns[row.pattern].kind;

        // Pass 2: statement-level facts
        let mut account_identifier = None;
        let mut period: Option<(NaiveDate, NaiveDate)> = None;
        for row in &rows {
            match kind_of(row) {
                RowKind::AccountInfo if account_identifier.is_none() => {
                    account_identifier = self
                        .captures(row)
                        .and_then(|caps| capture(&caps, "account").map(str::to_string));
                }
                RowKind::Period if period.is_none() => {
                    let Some(caps) = self.captures(row) else {
                        continue;
                    };
                    let start = self.date(row, capture(&caps, "start").unwrap_or_default(), None);
                    let end = self.date(row, capture(&caps, "end").unwrap_or_default(), None);
                    match (start, end) {
                        (Ok(start), Ok(end)) => period = Some((start, end)),
                        (Err(e), _) | (_, Err(e)) => sink.report(e)?,
                    }
                }
                _ => {}
            }
        }
        let reference = period.map(|(_, end)| end);

        // Pass 3: transactions and declared balances
        let mut transactions: Vec<RawTransaction> = Vec::new();
        let mut opening: Option<Decimal> = None;
        let mut closing: Option<Decimal> = None;
        let mut continuing = false;
        for row in &rows {
            let kind = kind_of(row);
            match kind {
                RowKind::Transaction => match self.parse_transaction(row, reference) {
                    Ok(tx) => {
                        transactions.push(tx);
                        continuing = true;
                        continue;
                    }
                    Err(e) => sink.report(e)?,
                },
                RowKind::Continuation if continuing => {
                    if let Some(last) = transactions.last_mut() {
                        let extra = clean_description(&row.text);
                        if !extra.is_empty() {
                            if !last.description.is_empty() {
                                last.description.push(' ');
                            }
                            last.description.push_str(&extra);
                        }
                        last.source_text.push('\n');
                        last.source_text.push_str(&row.text);
                    }
                    continue;
                }
                RowKind::OpeningBalance | RowKind::ClosingBalance => {
                    let balance = self
                        .captures(row)
                        .and_then(|caps| capture(&caps, "balance").map(str::to_string))
                        .unwrap_or_default();
                    match self.amount(row, &balance) {
                        Ok(value) if kind == RowKind::OpeningBalance => {
                            opening.get_or_insert(value);
                        }
                        Ok(value) => closing = Some(value),
                        Err(e) => sink.report(e)?,
                    }
                }
                _ => {}
            }
            continuing = false;
        }

        let opening_balance = match opening {
            Some(value) => value,
            None => transactions
                .first()
                .and_then(|tx| tx.balance_after.map(|b| b - tx.amount))
                .ok_or_else(|| ParseError::MissingSummary("opening balance".to_string()))?,
        };
        let closing_balance = match closing {
            Some(value) => value,
            None => transactions
                .last()
                .and_then(|tx| tx.balance_after)
                .ok_or_else(|| ParseError::MissingSummary("closing balance".to_string()))?,
        };
        let (period_start, period_end) = match period {
            Some(p) => p,
            None => {
                let start = transactions.iter().map(|t| t.date).min();
                let end = transactions.iter().map(|t| t.date).max();
                start
                    .zip(end)
                    .ok_or_else(|| ParseError::MissingSummary("statement period".to_string()))?
            }
        };

        Ok(ParsedStatement {
            transactions,
            summary: StatementSummary {
                account_identifier,
                period_start,
                period_end,
                opening_balance,
                closing_balance,
            },
            row_errors: sink.errors,
        })
    }
}
