//! Account domain model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bank account statements are imported into
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    /// Account number as printed by the bank (may be masked)
    pub account_number: Option<String>,
    /// ISO 4217 currency code, normalized to uppercase
    pub currency: String,
    /// Latest balance snapshot, if any
    pub balance: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with required fields
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            account_number: None,
            currency: "USD".to_string(),
            balance: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Normalize currency code to uppercase
    pub fn normalize_currency(currency: &str) -> String {
        currency.trim().to_uppercase()
    }

    /// Validate account data
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.trim().is_empty() {
            return Err("account name cannot be empty");
        }
        if self.currency.trim().len() != 3 {
            return Err("currency must be a 3-letter ISO code");
        }
        Ok(())
    }

    /// Whether a statement's declared account identifier refers to this account
    ///
    /// Statements usually mask all but the last digits, so only the trailing
    /// four digits are compared. Unknown on either side counts as a match.
    pub fn matches_statement_identifier(&self, declared: Option<&str>) -> bool {
        let (Some(ours), Some(theirs)) = (self.account_number.as_deref(), declared) else {
            return true;
        };
        let tail = |s: &str| -> String {
            let digits: Vec<char> = s.chars().filter(|c| c.is_ascii_digit()).collect();
            digits[digits.len().saturating_sub(4)..].iter().collect()
        };
        let (ours, theirs) = (tail(ours), tail(theirs));
        ours.is_empty() || theirs.is_empty() || ours == theirs
    }
}
