//! Batch service - listing imports and exporting their audit trail

use std::io::Write;
use std::sync::Arc;

use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{AuditRecord, ImportBatch};
use crate::ports::LedgerRepository;

const AUDIT_CSV_HEADER: [&str; 11] = [
    "sequence",
    "page",
    "row",
    "date",
    "description",
    "amount",
    "balance_after",
    "classification",
    "fingerprint",
    "transaction_id",
    "matched_transaction_id",
];

pub struct BatchService {
    repository: Arc<dyn LedgerRepository>,
}

impl BatchService {
    pub fn new(repository: Arc<dyn LedgerRepository>) -> Self {
        Self { repository }
    }

    /// Batches newest first
    pub fn list(&self, account_id: Option<Uuid>) -> Result<Vec<ImportBatch>> {
        self.repository.list_batches(account_id)
    }

    pub fn get(&self, batch_id: Uuid) -> Result<ImportBatch> {
        self.repository
            .get_batch(batch_id)?
            .ok_or_else(|| Error::not_found(format!("batch {}", batch_id)))
    }

    /// Audit records in statement order
    pub fn audit(&self, batch_id: Uuid) -> Result<Vec<AuditRecord>> {
        self.get(batch_id)?;
        self.repository.get_audit_records(batch_id)
    }

    /// Write a batch's audit records as CSV; returns the number of records
    pub fn export_audit_csv<W: Write>(&self, batch_id: Uuid, out: W) -> Result<usize> {
        let records = self.audit(batch_id)?;
        let mut writer = csv::Writer::from_writer(out);
        let csv_err = |e: csv::Error| Error::Other(format!("CSV export failed: {}", e));

        writer.write_record(AUDIT_CSV_HEADER).map_err(csv_err)?;
        for record in &records {
            writer
                .write_record([
                    record.sequence.to_string(),
                    (record.raw.page_index + 1).to_string(),
                    (record.raw.row_index + 1).to_string(),
                    record.raw.date.to_string(),
                    record.raw.description.clone(),
                    record.raw.amount.to_string(),
                    record
                        .raw
                        .balance_after
                        .map(|b| b.to_string())
                        .unwrap_or_default(),
                    record.classification.as_str().to_string(),
                    record.fingerprint.clone(),
                    record
                        .transaction_id
                        .map(|id| id.to_string())
                        .unwrap_or_default(),
                    record
                        .matched_transaction_id
                        .map(|id| id.to_string())
                        .unwrap_or_default(),
                ])
                .map_err(csv_err)?;
        }
        writer.flush()?;
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DuckDbRepository;
    use crate::domain::{Account, BatchStatus, RawTransaction, StatementSummary};
    use crate::services::{BatchAssembler, BatchSource, DuplicateDetector};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    #[test]
    fn test_list_audit_and_export() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(DuckDbRepository::new(&dir.path().join("ledger.duckdb")).unwrap());
        repo.ensure_schema().unwrap();
        let account = Account::new(Uuid::new_v4(), "Checking");
        repo.add_account(&account).unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 2, 9).unwrap();
        let rows = vec![RawTransaction {
            date: day,
            description: "Hardware, Inc.".to_string(),
            amount: Decimal::new(-1999, 2),
            balance_after: Some(Decimal::new(8001, 2)),
            page_index: 0,
            row_index: 6,
            source_text: "02/09/2024\tHardware, Inc.\t-19.99\t80.01".to_string(),
        }];
        let decisions = DuplicateDetector::default().classify(account.id, &rows, &[]);
        let staged = BatchAssembler::new().assemble(
            account.id,
            None,
            &BatchSource {
                bank_id: "first-meridian".into(),
                content_hash: "feb".into(),
                name: Some("feb.zip".into()),
            },
            &StatementSummary {
                account_identifier: None,
                period_start: day,
                period_end: day,
                opening_balance: Decimal::new(10000, 2),
                closing_balance: Decimal::new(8001, 2),
            },
            &rows,
            &decisions,
        );
        repo.commit_batch(&staged).unwrap();

        let service = BatchService::new(repo);
        let batches = service.list(Some(account.id)).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].status, BatchStatus::Committed);

        let mut out = Vec::new();
        let written = service.export_audit_csv(staged.batch.id, &mut out).unwrap();
        assert_eq!(written, 1);
        let csv = String::from_utf8(out).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("sequence,page,row,date"));
        let line = lines.next().unwrap();
        assert!(line.contains("\"Hardware, Inc.\""));
        assert!(line.contains(",new,"));

        assert!(matches!(service.audit(Uuid::new_v4()), Err(Error::NotFound(_))));
    }
}
