//! Review service - resolving rows held back as possible duplicates

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{BalanceSnapshot, ReviewItem, ReviewStatus, Transaction};
use crate::ports::LedgerRepository;
use crate::services::{AccountLocks, LogEvent, LoggingService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    /// The row is a real, distinct transaction
    Accept,
    /// The row is the history entry it was matched against
    Reject,
}

pub struct ReviewService {
    repository: Arc<dyn LedgerRepository>,
    locks: AccountLocks,
    logging: Option<Arc<LoggingService>>,
}

impl ReviewService {
    pub fn new(repository: Arc<dyn LedgerRepository>, locks: AccountLocks) -> Self {
        Self {
            repository,
            locks,
            logging: None,
        }
    }

    pub fn with_logging(mut self, logging: Arc<LoggingService>) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Pending items, optionally of one batch
    pub fn pending(&self, batch_id: Option<Uuid>) -> Result<Vec<ReviewItem>> {
        Ok(self
            .repository
            .get_review_items(batch_id)?
            .into_iter()
            .filter(|item| item.status == ReviewStatus::Pending)
            .collect())
    }

    fn find(&self, batch_id: Uuid, fingerprint: &str) -> Result<ReviewItem> {
        self.repository
            .get_review_items(Some(batch_id))?
            .into_iter()
            .find(|item| item.fingerprint == fingerprint)
            .ok_or_else(|| {
                Error::not_found(format!("review item {} in batch {}", fingerprint, batch_id))
            })
    }

    /// Resolve one item, once
    ///
    /// Accepting inserts the row as a transaction; the import already moved
    /// the balance by its amount. Rejecting appends a balance snapshot that
    /// takes the amount back out, since the matched history entry had
    /// already counted it.
    pub fn resolve(
        &self,
        batch_id: Uuid,
        fingerprint: &str,
        decision: ReviewDecision,
    ) -> Result<ReviewItem> {
        let item = self.find(batch_id, fingerprint)?;
        let _guard = self.locks.acquire(item.account_id)?;

        // Re-read under the lock; another resolver may have won
        let mut item = self.find(batch_id, fingerprint)?;
        if item.status != ReviewStatus::Pending {
            return Err(Error::validation(format!(
                "review item {} is already {}",
                fingerprint,
                item.status.as_str()
            )));
        }

        let mut accepted = None;
        let mut correction = None;
        match decision {
            ReviewDecision::Accept => {
                let mut tx = Transaction::new(
                    item.account_id,
                    item.raw.date,
                    item.raw.amount,
                    item.raw.description.clone(),
                    0,
                );
                tx.fingerprint = item.fingerprint.clone();
                tx.batch_id = Some(item.batch_id);
                item.status = ReviewStatus::Accepted;
                item.transaction_id = Some(tx.id);
                accepted = Some(tx);
            }
            ReviewDecision::Reject => {
                let account = self
                    .repository
                    .get_account(item.account_id)?
                    .ok_or_else(|| Error::not_found(format!("account {}", item.account_id)))?;
                if let Some(balance) = account.balance {
                    let mut snapshot = BalanceSnapshot::new(
                        item.account_id,
                        balance - item.raw.amount,
                        Utc::now().naive_utc(),
                    );
                    snapshot.source = Some("review_rejected".to_string());
                    snapshot.batch_id = Some(item.batch_id);
                    correction = Some(snapshot);
                }
                item.status = ReviewStatus::Rejected;
            }
        }
        item.resolved_at = Some(Utc::now());

        self.repository
            .resolve_review(&item, accepted.as_ref(), correction.as_ref())?;

        if let Some(logging) = &self.logging {
            let _ = logging.log(
                LogEvent::new("review_resolved")
                    .with_batch(item.batch_id)
                    .with_stage(item.status.as_str()),
            );
        }
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DuckDbRepository;
    use crate::domain::{Account, RawTransaction, StagedBatch, StatementSummary};
    use crate::services::{BatchAssembler, BatchSource, DuplicateDetector};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        repo: Arc<DuckDbRepository>,
        service: ReviewService,
        staged: StagedBatch,
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    /// One committed history entry, then a batch holding one near match
    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(DuckDbRepository::new(&dir.path().join("ledger.duckdb")).unwrap());
        repo.ensure_schema().unwrap();
        let account = Account::new(Uuid::new_v4(), "Checking");
        repo.add_account(&account).unwrap();
        repo.add_balance_snapshot(&BalanceSnapshot::from_manual(
            account.id,
            Decimal::new(10000, 2),
            date(1).and_hms_opt(0, 0, 0).unwrap(),
        ))
        .unwrap();

        let history = vec![Transaction::new(account.id, date(5), Decimal::new(-450, 2), "Cafe", 0)];
        let mut seed = BatchAssembler::new().assemble(
            account.id,
            None,
            &BatchSource {
                bank_id: "first-meridian".into(),
                content_hash: "seed".into(),
                name: None,
            },
            &StatementSummary {
                account_identifier: None,
                period_start: date(1),
                period_end: date(5),
                opening_balance: Decimal::new(10450, 2),
                closing_balance: Decimal::new(10000, 2),
            },
            &[],
            &[],
        );
        seed.transactions = history.clone();
        repo.commit_batch(&seed).unwrap();

        let rows = vec![RawTransaction {
            date: date(6),
            description: "Bakery".to_string(),
            amount: Decimal::new(-450, 2),
            balance_after: None,
            page_index: 0,
            row_index: 4,
            source_text: "07/06/2024\tBakery\t-4.50".to_string(),
        }];
        let decisions = DuplicateDetector::default().classify(account.id, &rows, &history);
        let staged = BatchAssembler::new().assemble(
            account.id,
            Some(Decimal::new(10000, 2)),
            &BatchSource {
                bank_id: "first-meridian".into(),
                content_hash: "july".into(),
                name: None,
            },
            &StatementSummary {
                account_identifier: None,
                period_start: date(6),
                period_end: date(31),
                opening_balance: Decimal::new(10000, 2),
                closing_balance: Decimal::new(9550, 2),
            },
            &rows,
            &decisions,
        );
        repo.commit_batch(&staged).unwrap();

        let service = ReviewService::new(repo.clone(), AccountLocks::new(dir.path()));
        Fixture {
            _dir: dir,
            repo,
            service,
            staged,
        }
    }

    #[test]
    fn test_pending_lists_review_items() {
        let f = fixture();
        let pending = f.service.pending(Some(f.staged.batch.id)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].raw.description, "Bakery");
    }

    #[test]
    fn test_accept_inserts_transaction_without_moving_balance() {
        let f = fixture();
        let fingerprint = f.staged.review_items[0].fingerprint.clone();
        let account_id = f.staged.batch.account_id;

        let item = f
            .service
            .resolve(f.staged.batch.id, &fingerprint, ReviewDecision::Accept)
            .unwrap();

        assert_eq!(item.status, ReviewStatus::Accepted);
        let txs = f.repo.get_transactions(account_id).unwrap();
        assert!(txs.iter().any(|t| Some(t.id) == item.transaction_id));
        assert_eq!(
            f.repo.get_account(account_id).unwrap().unwrap().balance,
            Some(Decimal::new(9550, 2))
        );
        assert!(f.service.pending(None).unwrap().is_empty());
    }

    #[test]
    fn test_reject_corrects_balance() {
        let f = fixture();
        let fingerprint = f.staged.review_items[0].fingerprint.clone();
        let account_id = f.staged.batch.account_id;

        let item = f
            .service
            .resolve(f.staged.batch.id, &fingerprint, ReviewDecision::Reject)
            .unwrap();

        assert_eq!(item.status, ReviewStatus::Rejected);
        assert_eq!(f.repo.get_transactions(account_id).unwrap().len(), 1);
        assert_eq!(
            f.repo.get_account(account_id).unwrap().unwrap().balance,
            Some(Decimal::new(10000, 2))
        );
    }

    #[test]
    fn test_item_resolves_once() {
        let f = fixture();
        let fingerprint = f.staged.review_items[0].fingerprint.clone();
        f.service
            .resolve(f.staged.batch.id, &fingerprint, ReviewDecision::Reject)
            .unwrap();

        let err = f
            .service
            .resolve(f.staged.batch.id, &fingerprint, ReviewDecision::Accept)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = f
            .service
            .resolve(f.staged.batch.id, "0000000000000000", ReviewDecision::Accept)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
