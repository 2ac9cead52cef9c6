//! Duplicate detection against an account's committed history

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::{Classification, DuplicateDecision, RawTransaction, ReviewItem, Transaction};

pub const DEFAULT_DATE_WINDOW_DAYS: u32 = 2;

/// Classifies statement rows as Duplicate, ManualReview or New
///
/// Each history entry is claimed at most once: exact fingerprint matches
/// claim first, then near matches (same amount, date within the window)
/// claim the closest remaining entry. Rows held for review count as
/// history too, so a re-imported review row is recognised by fingerprint.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateDetector {
    date_window_days: u32,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_WINDOW_DAYS)
    }
}

impl DuplicateDetector {
    pub fn new(date_window_days: u32) -> Self {
        Self { date_window_days }
    }

    pub fn date_window_days(&self) -> u32 {
        self.date_window_days
    }

    /// History range worth loading for a statement period
    pub fn history_range(&self, start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
        let window = chrono::Days::new(self.date_window_days as u64);
        (
            start.checked_sub_days(window).unwrap_or(start),
            end.checked_add_days(window).unwrap_or(end),
        )
    }

    /// Ordinal of each row among identical (date, amount, description)
    /// rows earlier in the same statement
    pub fn ordinals(transactions: &[RawTransaction]) -> Vec<u32> {
        let mut seen: HashMap<(NaiveDate, String, String), u32> = HashMap::new();
        transactions
            .iter()
            .map(|tx| {
                let key = (
                    tx.date,
                    Transaction::normalize_amount(tx.amount),
                    Transaction::normalize_description(&tx.description),
                );
                let counter = seen.entry(key).or_insert(0);
                let ordinal = *counter;
                *counter += 1;
                ordinal
            })
            .collect()
    }

    /// One decision per row, in the same order as `transactions`
    pub fn classify(
        &self,
        account_id: Uuid,
        transactions: &[RawTransaction],
        history: &[Transaction],
    ) -> Vec<DuplicateDecision> {
        self.classify_with_held(account_id, transactions, history, &[])
    }

    /// Like [`classify`](Self::classify), with pending or rejected review
    /// items whose amounts the balance already accounts for
    pub fn classify_with_held(
        &self,
        account_id: Uuid,
        transactions: &[RawTransaction],
        history: &[Transaction],
        held: &[ReviewItem],
    ) -> Vec<DuplicateDecision> {
        let ordinals = Self::ordinals(transactions);
        let by_fingerprint: HashMap<&str, &Transaction> = history
            .iter()
            .map(|h| (h.fingerprint.as_str(), h))
            .collect();
        let held_by_fingerprint: HashMap<&str, &ReviewItem> = held
            .iter()
            .map(|item| (item.fingerprint.as_str(), item))
            .collect();
        let mut claimed: HashSet<Uuid> = HashSet::new();

        // Exact pass
        let mut decisions: Vec<DuplicateDecision> = transactions
            .iter()
            .zip(&ordinals)
            .map(|(tx, &ordinal)| {
                let fingerprint = Transaction::calculate_fingerprint(
                    account_id,
                    tx.date,
                    tx.amount,
                    &tx.description,
                    ordinal,
                );
                let matched = by_fingerprint
                    .get(fingerprint.as_str())
                    .filter(|h| claimed.insert(h.id))
                    .map(|h| h.id);
                DuplicateDecision {
                    classification: if matched.is_some() {
                        Classification::Duplicate
                    } else {
                        Classification::New
                    },
                    fingerprint,
                    ordinal,
                    matched_transaction_id: matched,
                }
            })
            .collect();

        // Held review rows, once every exact match has claimed its entry
        for decision in decisions.iter_mut() {
            if decision.classification != Classification::New {
                continue;
            }
            if let Some(item) = held_by_fingerprint.get(decision.fingerprint.as_str()) {
                // The transaction it was held against stays out of the near pass
                if let Some(id) = item.matched_transaction_id {
                    claimed.insert(id);
                }
                decision.classification = Classification::Duplicate;
                decision.matched_transaction_id = item.matched_transaction_id;
            }
        }

        // Near-match pass over what is still New
        for (tx, decision) in transactions.iter().zip(decisions.iter_mut()) {
            if decision.classification != Classification::New {
                continue;
            }
            let candidate = history
                .iter()
                .filter(|h| !claimed.contains(&h.id) && h.amount == tx.amount)
                .map(|h| (h, (h.transaction_date - tx.date).num_days().unsigned_abs()))
                .filter(|(_, distance)| *distance <= self.date_window_days as u64)
                .min_by_key(|(h, distance)| (*distance, h.transaction_date, h.created_at));
            if let Some((h, _)) = candidate {
                claimed.insert(h.id);
                decision.classification = Classification::ManualReview;
                decision.matched_transaction_id = Some(h.id);
            }
        }

        decisions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn raw(day: u32, amount: i64, desc: &str) -> RawTransaction {
        RawTransaction {
            date: date(day),
            description: desc.to_string(),
            amount: Decimal::new(amount, 2),
            balance_after: None,
            page_index: 0,
            row_index: 0,
            source_text: desc.to_string(),
        }
    }

    fn existing(account: Uuid, day: u32, amount: i64, desc: &str, ordinal: u32) -> Transaction {
        Transaction::new(account, date(day), Decimal::new(amount, 2), desc, ordinal)
    }

    fn kinds(decisions: &[DuplicateDecision]) -> Vec<Classification> {
        decisions.iter().map(|d| d.classification).collect()
    }

    #[test]
    fn test_all_new_without_history() {
        let account = Uuid::new_v4();
        let rows = vec![raw(1, -450, "Coffee"), raw(2, -1200, "Lunch")];
        let decisions = DuplicateDetector::default().classify(account, &rows, &[]);
        assert_eq!(kinds(&decisions), vec![Classification::New, Classification::New]);
    }

    #[test]
    fn test_exact_fingerprint_is_duplicate() {
        let account = Uuid::new_v4();
        let old = existing(account, 1, -450, "Coffee", 0);
        let rows = vec![raw(1, -450, "COFFEE"), raw(2, -1200, "Lunch")];
        let decisions = DuplicateDetector::default().classify(account, &rows, &[old.clone()]);
        assert_eq!(decisions[0].classification, Classification::Duplicate);
        assert_eq!(decisions[0].matched_transaction_id, Some(old.id));
        assert_eq!(decisions[1].classification, Classification::New);
    }

    #[test]
    fn test_repeated_rows_get_ordinals() {
        let account = Uuid::new_v4();
        let rows = vec![raw(3, -450, "Coffee"), raw(3, -450, "Coffee")];
        let decisions = DuplicateDetector::default().classify(account, &rows, &[]);
        assert_eq!(decisions[0].ordinal, 0);
        assert_eq!(decisions[1].ordinal, 1);
        assert_ne!(decisions[0].fingerprint, decisions[1].fingerprint);
        assert_eq!(kinds(&decisions), vec![Classification::New, Classification::New]);
    }

    #[test]
    fn test_second_copy_of_repeated_row_is_new() {
        // History holds one coffee; the statement prints two
        let account = Uuid::new_v4();
        let old = existing(account, 3, -450, "Coffee", 0);
        let rows = vec![raw(3, -450, "Coffee"), raw(3, -450, "Coffee")];
        let decisions = DuplicateDetector::default().classify(account, &rows, &[old]);
        assert_eq!(
            kinds(&decisions),
            vec![Classification::Duplicate, Classification::New]
        );
    }

    #[test]
    fn test_same_amount_nearby_different_description_needs_review() {
        let account = Uuid::new_v4();
        let old = existing(account, 10, -450, "Corner Cafe", 0);
        let rows = vec![raw(11, -450, "Bakery"), raw(11, -450, "Newsstand")];
        let decisions = DuplicateDetector::default().classify(account, &rows, &[old.clone()]);
        assert_eq!(
            kinds(&decisions),
            vec![Classification::ManualReview, Classification::New]
        );
        assert_eq!(decisions[0].matched_transaction_id, Some(old.id));
    }

    #[test]
    fn test_outside_window_is_new() {
        let account = Uuid::new_v4();
        let old = existing(account, 1, -450, "Corner Cafe", 0);
        let rows = vec![raw(9, -450, "Bakery")];
        let decisions = DuplicateDetector::new(2).classify(account, &rows, &[old]);
        assert_eq!(kinds(&decisions), vec![Classification::New]);
    }

    #[test]
    fn test_exact_match_claims_before_near_match() {
        let account = Uuid::new_v4();
        let old = existing(account, 4, -450, "Coffee", 0);
        // The near-match row comes first in the statement but must not steal
        // the history entry the exact match owns
        let rows = vec![raw(4, -450, "Bagel"), raw(4, -450, "Coffee")];
        let decisions = DuplicateDetector::default().classify(account, &rows, &[old]);
        assert_eq!(
            kinds(&decisions),
            vec![Classification::New, Classification::Duplicate]
        );
    }

    fn held(account: Uuid, row: &RawTransaction, matched: &Transaction) -> ReviewItem {
        ReviewItem {
            batch_id: Uuid::new_v4(),
            account_id: account,
            fingerprint: Transaction::calculate_fingerprint(
                account,
                row.date,
                row.amount,
                &row.description,
                0,
            ),
            raw: row.clone(),
            matched_transaction_id: Some(matched.id),
            status: crate::domain::ReviewStatus::Pending,
            resolved_at: None,
            transaction_id: None,
        }
    }

    #[test]
    fn test_held_review_row_is_duplicate_on_reimport() {
        let account = Uuid::new_v4();
        let old = existing(account, 10, -20000, "Transfer to savings", 0);
        let row = raw(11, -20000, "Savings xfer");
        let item = held(account, &row, &old);

        let decisions = DuplicateDetector::default().classify_with_held(
            account,
            &[row, raw(12, -450, "Coffee")],
            &[old.clone()],
            &[item],
        );
        assert_eq!(
            kinds(&decisions),
            vec![Classification::Duplicate, Classification::New]
        );
        assert_eq!(decisions[0].matched_transaction_id, Some(old.id));
    }

    #[test]
    fn test_held_match_keeps_its_transaction_out_of_near_pass() {
        let account = Uuid::new_v4();
        let old = existing(account, 10, -20000, "Transfer to savings", 0);
        let row = raw(11, -20000, "Savings xfer");
        let item = held(account, &row, &old);

        // A second same-amount row nearby must not be paired with the
        // transaction the held row already points at
        let decisions = DuplicateDetector::default().classify_with_held(
            account,
            &[raw(10, -20000, "Atm"), row],
            &[old],
            &[item],
        );
        assert_eq!(
            kinds(&decisions),
            vec![Classification::New, Classification::Duplicate]
        );
    }

    #[test]
    fn test_history_range_pads_window() {
        let (from, to) = DuplicateDetector::new(3).history_range(date(10), date(20));
        assert_eq!(from, date(7));
        assert_eq!(to, date(23));
    }
}
