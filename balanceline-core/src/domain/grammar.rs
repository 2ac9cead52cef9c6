//! Bank grammar descriptors
//!
//! A grammar tells the statement parser how one bank lays out its
//! statements: which row shapes exist, how dates are written and how
//! amounts are formatted. Grammars are plain data so users can supply
//! their own in `settings.json`.

use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// What a statement row represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RowKind {
    Header,
    Footer,
    PageSubtotal,
    OpeningBalance,
    ClosingBalance,
    AccountInfo,
    Period,
    Transaction,
    /// Wrapped description text belonging to the previous transaction
    Continuation,
}

impl RowKind {
    /// Precedence used when several patterns match the same row
    pub fn default_specificity(&self) -> u8 {
        match self {
            Self::PageSubtotal => 40,
            Self::Header | Self::Footer | Self::AccountInfo | Self::Period => 30,
            Self::OpeningBalance | Self::ClosingBalance => 20,
            Self::Transaction => 10,
            Self::Continuation => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Footer => "footer",
            Self::PageSubtotal => "pageSubtotal",
            Self::OpeningBalance => "openingBalance",
            Self::ClosingBalance => "closingBalance",
            Self::AccountInfo => "accountInfo",
            Self::Period => "period",
            Self::Transaction => "transaction",
            Self::Continuation => "continuation",
        }
    }

    /// Captures a pattern of this kind must define
    fn required_captures(&self) -> &'static [&'static str] {
        match self {
            Self::OpeningBalance | Self::ClosingBalance => &["balance"],
            Self::AccountInfo => &["account"],
            Self::Period => &["start", "end"],
            Self::Transaction => &["date"],
            _ => &[],
        }
    }
}

/// One recognizable row shape
///
/// `regex` is matched against the row's cells joined by tabs and must
/// cover the whole text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowPattern {
    pub name: String,
    pub kind: RowKind,
    pub regex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specificity: Option<u8>,
}

impl RowPattern {
    pub fn new(name: impl Into<String>, kind: RowKind, regex: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            regex: regex.into(),
            specificity: None,
        }
    }

    pub fn with_specificity(mut self, specificity: u8) -> Self {
        self.specificity = Some(specificity);
        self
    }

    pub fn effective_specificity(&self) -> u8 {
        self.specificity
            .unwrap_or_else(|| self.kind.default_specificity())
    }

    /// The regex anchored to the full row text
    pub fn anchored(&self) -> String {
        format!("^(?:{})$", self.regex)
    }
}

fn default_negative_suffixes() -> Vec<String> {
    vec!["DR".to_string()]
}

fn default_positive_suffixes() -> Vec<String> {
    vec!["CR".to_string()]
}

/// Locale conventions for amounts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberFormat {
    pub decimal_separator: char,
    #[serde(default)]
    pub thousands_separator: Option<char>,
    #[serde(default)]
    pub currency_symbols: Vec<String>,
    #[serde(default = "default_negative_suffixes")]
    pub negative_suffixes: Vec<String>,
    #[serde(default = "default_positive_suffixes")]
    pub positive_suffixes: Vec<String>,
}

impl NumberFormat {
    /// `1,234.56`
    pub fn us() -> Self {
        Self {
            decimal_separator: '.',
            thousands_separator: Some(','),
            currency_symbols: vec!["$".to_string(), "USD".to_string()],
            negative_suffixes: default_negative_suffixes(),
            positive_suffixes: default_positive_suffixes(),
        }
    }

    /// `1.234,56`
    pub fn european() -> Self {
        Self {
            decimal_separator: ',',
            thousands_separator: Some('.'),
            currency_symbols: vec!["€".to_string(), "EUR".to_string()],
            negative_suffixes: default_negative_suffixes(),
            positive_suffixes: default_positive_suffixes(),
        }
    }

    /// Parse a printed amount into a signed decimal
    ///
    /// Accepts a leading or trailing minus, parentheses, and the configured
    /// debit/credit suffixes. Thousands groups must be exactly three digits.
    pub fn parse_amount(&self, raw: &str) -> Option<Decimal> {
        let mut s = raw.trim();
        let mut negative = false;

        if let Some(rest) = self
            .negative_suffixes
            .iter()
            .find_map(|suffix| strip_marker(s, suffix))
        {
            negative = true;
            s = rest;
        } else if let Some(rest) = self
            .positive_suffixes
            .iter()
            .find_map(|suffix| strip_marker(s, suffix))
        {
            s = rest;
        }

        if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
            if negative {
                return None;
            }
            negative = true;
            s = inner.trim();
        }

        for _ in 0..2 {
            if let Some(rest) = s.strip_suffix('-') {
                if negative {
                    return None;
                }
                negative = true;
                s = rest.trim_end();
            } else if let Some(rest) = s.strip_prefix('-') {
                if negative {
                    return None;
                }
                negative = true;
                s = rest.trim_start();
            } else if let Some(rest) = s.strip_prefix('+') {
                s = rest.trim_start();
            }

            // Symbols may sit on either side of the sign
            if let Some(rest) = self.currency_symbols.iter().find_map(|sym| {
                s.strip_prefix(sym.as_str())
                    .map(str::trim_start)
                    .or_else(|| s.strip_suffix(sym.as_str()).map(str::trim_end))
            }) {
                s = rest;
            } else {
                break;
            }
        }

        let (int_part, frac_part) = match s.split_once(self.decimal_separator) {
            Some((i, f)) => (i, Some(f)),
            None => (s, None),
        };
        if let Some(frac) = frac_part {
            if frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
        }

        let digits = match self.thousands_separator {
            Some(sep) if int_part.contains(sep) => {
                let groups: Vec<&str> = int_part.split(sep).collect();
                if groups[0].is_empty() || groups[0].len() > 3 {
                    return None;
                }
                if groups[1..].iter().any(|g| g.len() != 3) {
                    return None;
                }
                groups.concat()
            }
            _ => int_part.to_string(),
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let text = match frac_part {
            Some(frac) => format!("{}.{}", digits, frac),
            None => digits,
        };
        let value = Decimal::from_str(&text).ok()?;
        Some(if negative { -value } else { value })
    }
}

/// Strip a case-insensitive marker such as `DR` that follows the digits
fn strip_marker<'a>(s: &'a str, marker: &str) -> Option<&'a str> {
    if marker.is_empty() || s.len() <= marker.len() {
        return None;
    }
    let split = s.len() - marker.len();
    if !s.is_char_boundary(split) {
        return None;
    }
    let (head, tail) = s.split_at(split);
    if !tail.eq_ignore_ascii_case(marker) {
        return None;
    }
    let head = head.trim_end();
    head.ends_with(|c: char| c.is_ascii_digit() || c == ')')
        .then_some(head)
}

/// Everything needed to parse one bank's statements
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankGrammar {
    pub bank_id: String,
    pub display_name: String,
    /// chrono format strings tried in order; formats without a year are
    /// completed from the statement period
    pub date_formats: Vec<String>,
    pub number_format: NumberFormat,
    pub patterns: Vec<RowPattern>,
}

impl BankGrammar {
    /// Parse a printed date
    ///
    /// `reference` (the statement's period end) supplies the year for
    /// year-less formats; dates in a later month than the reference fall in
    /// the previous year, as do dates that only exist in the previous year.
    pub fn parse_date(&self, raw: &str, reference: Option<NaiveDate>) -> Option<NaiveDate> {
        let raw = raw.trim();
        for format in &self.date_formats {
            if format.contains("%Y") || format.contains("%y") {
                if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
                    return Some(date);
                }
                continue;
            }

            let Some(reference) = reference else {
                continue;
            };
            let with_year = format!("{} %Y", format);
            let year = reference.year();
            let parse = |y: i32| NaiveDate::parse_from_str(&format!("{} {}", raw, y), &with_year);
            match parse(year) {
                Ok(date) if date.month() > reference.month() => {
                    if let Ok(previous) = parse(year - 1) {
                        return Some(previous);
                    }
                    return Some(date);
                }
                Ok(date) => return Some(date),
                // 29 February of a period ending in a non-leap year
                Err(_) => {
                    if let Ok(previous) = parse(year - 1) {
                        return Some(previous);
                    }
                }
            }
        }
        None
    }

    /// Whether any date format needs a year from the statement period
    pub fn has_yearless_formats(&self) -> bool {
        self.date_formats
            .iter()
            .any(|f| !f.contains("%Y") && !f.contains("%y"))
    }

    /// Check the descriptor is usable: regexes compile and every pattern
    /// captures what its kind needs
    pub fn validate(&self) -> Result<()> {
        if self.bank_id.trim().is_empty() {
            return Err(Error::config("bank grammar needs a bankId"));
        }
        if self.date_formats.is_empty() {
            return Err(Error::config(format!(
                "bank grammar '{}' has no date formats",
                self.bank_id
            )));
        }
        if Some(self.number_format.decimal_separator) == self.number_format.thousands_separator {
            return Err(Error::config(format!(
                "bank grammar '{}' uses the same decimal and thousands separator",
                self.bank_id
            )));
        }
        if !self
            .patterns
            .iter()
            .any(|p| p.kind == RowKind::Transaction)
        {
            return Err(Error::config(format!(
                "bank grammar '{}' has no transaction pattern",
                self.bank_id
            )));
        }

        for pattern in &self.patterns {
            let regex = Regex::new(&pattern.anchored()).map_err(|e| {
                Error::config(format!(
                    "bank grammar '{}', pattern '{}': {}",
                    self.bank_id, pattern.name, e
                ))
            })?;
            let names: Vec<&str> = regex.capture_names().flatten().collect();
            for required in pattern.kind.required_captures() {
                if !names.contains(required) {
                    return Err(Error::config(format!(
                        "bank grammar '{}', pattern '{}': missing capture '{}'",
                        self.bank_id, pattern.name, required
                    )));
                }
            }
            if pattern.kind == RowKind::Transaction
                && !["amount", "debit", "credit"]
                    .iter()
                    .any(|c| names.contains(c))
            {
                return Err(Error::config(format!(
                    "bank grammar '{}', pattern '{}': needs an 'amount', 'debit' or 'credit' capture",
                    self.bank_id, pattern.name
                )));
            }
        }
        Ok(())
    }
}
