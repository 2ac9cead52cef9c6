//! Batch assembly - turns classified rows into a staged, committable batch

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    AuditRecord, BalanceSnapshot, Classification, DecisionCounts, DuplicateDecision, ImportBatch,
    RawTransaction, ReviewItem, ReviewStatus, StagedBatch, StatementSummary, Transaction,
};

/// Where a statement came from
#[derive(Debug, Clone)]
pub struct BatchSource {
    pub bank_id: String,
    pub content_hash: String,
    pub name: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BatchAssembler;

impl BatchAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Build everything one commit writes
    ///
    /// The delta applied to the account is the statement's net change minus
    /// the rows already in history (Duplicates), so re-importing a statement
    /// moves the balance by zero. An account with no balance yet takes the
    /// statement's closing balance.
    pub fn assemble(
        &self,
        account_id: Uuid,
        current_balance: Option<Decimal>,
        source: &BatchSource,
        summary: &StatementSummary,
        transactions: &[RawTransaction],
        decisions: &[DuplicateDecision],
    ) -> StagedBatch {
        debug_assert_eq!(transactions.len(), decisions.len());

        let mut batch = ImportBatch::new(
            account_id,
            source.bank_id.clone(),
            source.content_hash.clone(),
            summary.clone(),
        );
        batch.source_name = source.name.clone();
        batch.counts = DecisionCounts::tally(decisions);

        let duplicate_sum: Decimal = transactions
            .iter()
            .zip(decisions)
            .filter(|(_, d)| d.classification == Classification::Duplicate)
            .map(|(tx, _)| tx.amount)
            .sum();
        batch.applied_delta = batch.statement_delta - duplicate_sum;

        let mut canonical = Vec::new();
        let mut audit = Vec::with_capacity(transactions.len());
        let mut review_items = Vec::new();

        for (sequence, (raw, decision)) in transactions.iter().zip(decisions).enumerate() {
            let mut transaction_id = None;
            match decision.classification {
                Classification::New => {
                    let mut tx = Transaction::new(
                        account_id,
                        raw.date,
                        raw.amount,
                        raw.description.clone(),
                        decision.ordinal,
                    );
                    tx.fingerprint = decision.fingerprint.clone();
                    tx.batch_id = Some(batch.id);
                    transaction_id = Some(tx.id);
                    canonical.push(tx);
                }
                Classification::ManualReview => review_items.push(ReviewItem {
                    batch_id: batch.id,
                    account_id,
                    fingerprint: decision.fingerprint.clone(),
                    raw: raw.clone(),
                    matched_transaction_id: decision.matched_transaction_id,
                    status: ReviewStatus::Pending,
                    resolved_at: None,
                    transaction_id: None,
                }),
                Classification::Duplicate => {}
            }

            audit.push(AuditRecord {
                batch_id: batch.id,
                sequence,
                raw: raw.clone(),
                classification: decision.classification,
                fingerprint: decision.fingerprint.clone(),
                transaction_id,
                matched_transaction_id: decision.matched_transaction_id,
            });
        }

        let new_balance = match current_balance {
            Some(balance) => balance + batch.applied_delta,
            None => summary.closing_balance,
        };
        let balance = BalanceSnapshot::from_import(account_id, new_balance, batch.id);

        StagedBatch {
            batch,
            transactions: canonical,
            audit,
            review_items,
            balance,
        }
    }
}
