//! Transaction domain model

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A committed ledger transaction belonging to an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Import batch that created this transaction
    pub batch_id: Option<Uuid>,
    pub transaction_date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    /// Dedupe key, unique per account
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction; the fingerprint is derived with the given ordinal
    pub fn new(
        account_id: Uuid,
        transaction_date: NaiveDate,
        amount: Decimal,
        description: impl Into<String>,
        ordinal: u32,
    ) -> Self {
        let description = description.into();
        let fingerprint =
            Self::calculate_fingerprint(account_id, transaction_date, amount, &description, ordinal);
        Self {
            id: Uuid::new_v4(),
            account_id,
            batch_id: None,
            transaction_date,
            amount,
            description,
            fingerprint,
            created_at: Utc::now(),
        }
    }

    /// Calculate fingerprint hash for deduplication
    ///
    /// Uses: account_id, transaction date, amount (with sign), normalized
    /// description, and the ordinal that tells apart identical rows printed
    /// more than once on the same statement.
    pub fn calculate_fingerprint(
        account_id: Uuid,
        date: NaiveDate,
        amount: Decimal,
        description: &str,
        ordinal: u32,
    ) -> String {
        let fingerprint_str = format!(
            "{}|{}|{}|{}|{}",
            account_id,
            date.format("%Y-%m-%d"),
            Self::normalize_amount(amount),
            Self::normalize_description(description),
            ordinal
        );

        // SHA256 hash, truncated to 16 chars
        let mut hasher = Sha256::new();
        hasher.update(fingerprint_str.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..8])
    }

    /// Amount as used in fingerprints: two decimals, -0 treated as 0
    pub fn normalize_amount(amount: Decimal) -> String {
        let amount = if amount.is_zero() { Decimal::ZERO } else { amount };
        format!("{:.2}", amount.round_dp(2))
    }

    /// Normalize description for fingerprint comparison
    ///
    /// - Lowercase
    /// - Removes card number masks (XXXXXXXXXXXX1234)
    /// - Normalizes account/phone numbers to last 4 digits
    /// - Removes whitespace and special characters
    pub fn normalize_description(desc: &str) -> String {
        static CARD_MASK: OnceLock<Regex> = OnceLock::new();
        static ACCOUNT_NO: OnceLock<Regex> = OnceLock::new();
        static NON_ALNUM: OnceLock<Regex> = OnceLock::new();

        let desc = desc.to_lowercase();

        // Card number masks: 10+ X's or *'s followed by 4 digits
        let card_mask = CARD_MASK.get_or_init(|| Regex::new(r"[x*]{10,}\d{4}").expect("valid regex"));
        let normalized = card_mask.replace_all(&desc, "");

        // Phone/account numbers (7-12 chars of X's and digits): keep last 4 digits
        let account_no = ACCOUNT_NO.get_or_init(|| Regex::new(r"[x0-9]{7,12}").expect("valid regex"));
        let normalized = account_no.replace_all(&normalized, |caps: &regex::Captures| {
            let text = &caps[0];
            let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
            if digits.len() >= 4 {
                digits[digits.len() - 4..].to_string()
            } else {
                text.to_string()
            }
        });

        let non_alnum = NON_ALNUM.get_or_init(|| Regex::new(r"[^a-z0-9]").expect("valid regex"));
        non_alnum.replace_all(&normalized, "").to_string()
    }
}
