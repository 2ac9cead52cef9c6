//! DuckDB ledger repository
//!
//! One file-backed database per data directory. Money is stored as
//! DECIMAL(18,4) and read back through `::VARCHAR` so no value ever passes
//! through a float.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{self, Error, StorageError};
use crate::domain::{
    Account, AuditRecord, BalanceSnapshot, BatchStatus, Classification, DecisionCounts,
    ImportBatch, RawTransaction, ReviewItem, ReviewStatus, StagedBatch, StatementSummary,
    Transaction,
};
use crate::ports::{AccountHistory, LedgerRepository};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

const ACCOUNT_COLUMNS: &str = "a.account_id, a.name, a.account_number, a.currency, a.created_at, a.updated_at,
     (SELECT bs.balance::VARCHAR FROM sys_balance_snapshots bs
      WHERE bs.account_id = a.account_id
      ORDER BY bs.snapshot_time DESC, bs.seq DESC LIMIT 1) AS latest_balance";

const TRANSACTION_COLUMNS: &str = "transaction_id, account_id, batch_id, transaction_date::VARCHAR,
     amount::VARCHAR, description, fingerprint, created_at";

const BATCH_COLUMNS: &str = "batch_id, account_id, bank_id, source_hash, source_name, status,
     account_identifier, period_start::VARCHAR, period_end::VARCHAR,
     opening_balance::VARCHAR, closing_balance::VARCHAR,
     statement_delta::VARCHAR, applied_delta::VARCHAR,
     new_count, duplicate_count, manual_review_count, created_at";

const AUDIT_COLUMNS: &str = "batch_id, row_seq, page_index, row_index, transaction_date::VARCHAR,
     description, amount::VARCHAR, balance_after::VARCHAR, source_text,
     classification, fingerprint, transaction_id, matched_transaction_id";

const REVIEW_COLUMNS: &str = "batch_id, account_id, fingerprint, page_index, row_index,
     transaction_date::VARCHAR, description, amount::VARCHAR, balance_after::VARCHAR,
     source_text, matched_transaction_id, status, resolved_at, transaction_id";

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl DuckDbRepository {
    /// Open (or create) the ledger database
    ///
    /// Retries with exponential backoff while another process holds the
    /// file, which happens when two CLI invocations start at once.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: db_path.to_path_buf(),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[balanceline] Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off: cached extensions in ~/.duckdb may
        // fail code signing checks on macOS
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_with_flags(db_path, config)
            .with_context(|| format!("cannot open ledger at {}", db_path.display()))?;
        Ok(conn)
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow!("Lock poisoned: {}", e))
    }

    // === Accounts ===

    fn fetch_accounts(&self, id: Option<Uuid>) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let accounts = match id {
            Some(id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM sys_accounts a WHERE a.account_id = ?"
                ))?;
                let rows = stmt.query_map([id.to_string()], row_to_account)?;
                rows.collect::<duckdb::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM sys_accounts a ORDER BY a.name, a.created_at"
                ))?;
                let rows = stmt.query_map([], row_to_account)?;
                rows.collect::<duckdb::Result<Vec<_>>>()?
            }
        };
        Ok(accounts)
    }

    fn insert_account(&self, account: &Account) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_accounts (account_id, name, account_number, currency, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                account.id.to_string(),
                account.name,
                account.account_number,
                account.currency,
                format_timestamp(&account.created_at),
                format_timestamp(&account.updated_at),
            ],
        )?;
        Ok(())
    }

    fn insert_snapshot(conn: &Connection, snapshot: &BalanceSnapshot) -> Result<()> {
        conn.execute(
            "INSERT INTO sys_balance_snapshots
                (snapshot_id, account_id, balance, snapshot_time, source, batch_id, created_at)
             VALUES (?, ?, CAST(? AS DECIMAL(18,4)), CAST(? AS TIMESTAMP), ?, ?, ?)",
            params![
                snapshot.id.to_string(),
                snapshot.account_id.to_string(),
                snapshot.balance.to_string(),
                snapshot
                    .snapshot_time
                    .format("%Y-%m-%d %H:%M:%S%.6f")
                    .to_string(),
                snapshot.source,
                snapshot.batch_id.map(|id| id.to_string()),
                format_timestamp(&snapshot.created_at),
            ],
        )?;
        Ok(())
    }

    // === Transactions ===

    fn insert_transaction(conn: &Connection, tx: &Transaction) -> Result<()> {
        conn.execute(
            "INSERT INTO sys_transactions
                (transaction_id, account_id, batch_id, transaction_date, amount, description, fingerprint, created_at)
             VALUES (?, ?, ?, CAST(? AS DATE), CAST(? AS DECIMAL(18,4)), ?, ?, ?)",
            params![
                tx.id.to_string(),
                tx.account_id.to_string(),
                tx.batch_id.map(|id| id.to_string()),
                format_date(tx.transaction_date),
                tx.amount.to_string(),
                tx.description,
                tx.fingerprint,
                format_timestamp(&tx.created_at),
            ],
        )
        .with_context(|| format!("inserting transaction {}", tx.fingerprint))?;
        Ok(())
    }

    fn fetch_history(&self, account_id: Uuid, from: NaiveDate, to: NaiveDate) -> Result<AccountHistory> {
        let conn = self.conn()?;
        let balance: Option<String> = conn
            .query_row(
                "SELECT balance::VARCHAR FROM sys_balance_snapshots
                 WHERE account_id = ?
                 ORDER BY snapshot_time DESC, seq DESC LIMIT 1",
                [account_id.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                duckdb::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM sys_transactions
             WHERE account_id = ?
               AND transaction_date >= CAST(? AS DATE)
               AND transaction_date <= CAST(? AS DATE)
             ORDER BY transaction_date, created_at"
        ))?;
        let transactions = stmt
            .query_map(
                params![account_id.to_string(), format_date(from), format_date(to)],
                row_to_transaction,
            )?
            .collect::<duckdb::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {REVIEW_COLUMNS} FROM sys_review_items
             WHERE account_id = ?
               AND status IN ('pending', 'rejected')
               AND transaction_date >= CAST(? AS DATE)
               AND transaction_date <= CAST(? AS DATE)
             ORDER BY transaction_date, fingerprint"
        ))?;
        let held = stmt
            .query_map(
                params![account_id.to_string(), format_date(from), format_date(to)],
                row_to_review_item,
            )?
            .collect::<duckdb::Result<Vec<_>>>()?;

        Ok(AccountHistory {
            balance: balance.as_deref().map(parse_decimal).transpose()?,
            transactions,
            held,
        })
    }

    fn fetch_transactions(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM sys_transactions
             WHERE account_id = ?
             ORDER BY transaction_date DESC, created_at DESC"
        ))?;
        let rows = stmt
            .query_map([account_id.to_string()], row_to_transaction)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // === Batches ===

    fn insert_batch(conn: &Connection, batch: &ImportBatch, status: BatchStatus) -> Result<()> {
        conn.execute(
            "INSERT INTO sys_import_batches
                (batch_id, account_id, bank_id, source_hash, source_name, status,
                 account_identifier, period_start, period_end,
                 opening_balance, closing_balance, statement_delta, applied_delta,
                 new_count, duplicate_count, manual_review_count, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, CAST(? AS DATE), CAST(? AS DATE),
                     CAST(? AS DECIMAL(18,4)), CAST(? AS DECIMAL(18,4)),
                     CAST(? AS DECIMAL(18,4)), CAST(? AS DECIMAL(18,4)),
                     ?, ?, ?, ?)",
            params![
                batch.id.to_string(),
                batch.account_id.to_string(),
                batch.bank_id,
                batch.source_hash,
                batch.source_name,
                status.as_str(),
                batch.summary.account_identifier,
                format_date(batch.summary.period_start),
                format_date(batch.summary.period_end),
                batch.summary.opening_balance.to_string(),
                batch.summary.closing_balance.to_string(),
                batch.statement_delta.to_string(),
                batch.applied_delta.to_string(),
                batch.counts.new as i64,
                batch.counts.duplicate as i64,
                batch.counts.manual_review as i64,
                format_timestamp(&batch.created_at),
            ],
        )
        .context("inserting batch record")?;
        Ok(())
    }

    fn insert_audit(conn: &Connection, record: &AuditRecord) -> Result<()> {
        let raw = &record.raw;
        conn.execute(
            "INSERT INTO sys_import_audit
                (batch_id, row_seq, page_index, row_index, transaction_date, description,
                 amount, balance_after, source_text, classification, fingerprint,
                 transaction_id, matched_transaction_id)
             VALUES (?, ?, ?, ?, CAST(? AS DATE), ?, CAST(? AS DECIMAL(18,4)),
                     CAST(? AS DECIMAL(18,4)), ?, ?, ?, ?, ?)",
            params![
                record.batch_id.to_string(),
                record.sequence as i64,
                raw.page_index as i64,
                raw.row_index as i64,
                format_date(raw.date),
                raw.description,
                raw.amount.to_string(),
                raw.balance_after.map(|b| b.to_string()),
                raw.source_text,
                record.classification.as_str(),
                record.fingerprint,
                record.transaction_id.map(|id| id.to_string()),
                record.matched_transaction_id.map(|id| id.to_string()),
            ],
        )
        .context("inserting audit record")?;
        Ok(())
    }

    fn insert_review_item(conn: &Connection, item: &ReviewItem) -> Result<()> {
        let raw = &item.raw;
        conn.execute(
            "INSERT INTO sys_review_items
                (batch_id, account_id, fingerprint, page_index, row_index, transaction_date,
                 description, amount, balance_after, source_text, matched_transaction_id,
                 status, resolved_at, transaction_id)
             VALUES (?, ?, ?, ?, ?, CAST(? AS DATE), ?, CAST(? AS DECIMAL(18,4)),
                     CAST(? AS DECIMAL(18,4)), ?, ?, ?, ?, ?)",
            params![
                item.batch_id.to_string(),
                item.account_id.to_string(),
                item.fingerprint,
                raw.page_index as i64,
                raw.row_index as i64,
                format_date(raw.date),
                raw.description,
                raw.amount.to_string(),
                raw.balance_after.map(|b| b.to_string()),
                raw.source_text,
                item.matched_transaction_id.map(|id| id.to_string()),
                item.status.as_str(),
                item.resolved_at.as_ref().map(format_timestamp),
                item.transaction_id.map(|id| id.to_string()),
            ],
        )
        .context("inserting review item")?;
        Ok(())
    }

    fn write_staged(&self, staged: &StagedBatch) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for transaction in &staged.transactions {
            Self::insert_transaction(&tx, transaction)?;
        }
        for record in &staged.audit {
            Self::insert_audit(&tx, record)?;
        }
        for item in &staged.review_items {
            Self::insert_review_item(&tx, item)?;
        }
        Self::insert_snapshot(&tx, &staged.balance)?;
        Self::insert_batch(&tx, &staged.batch, BatchStatus::Committed)?;

        // Dropping `tx` on any early return above rolls everything back
        tx.commit().context("committing batch")?;
        Ok(())
    }

    fn fetch_batches(&self, account_id: Option<Uuid>, batch_id: Option<Uuid>) -> Result<Vec<ImportBatch>> {
        let conn = self.conn()?;
        let (filter, arg) = match (account_id, batch_id) {
            (_, Some(batch)) => ("WHERE batch_id = ?", Some(batch)),
            (Some(account), None) => ("WHERE account_id = ?", Some(account)),
            (None, None) => ("", None),
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {BATCH_COLUMNS} FROM sys_import_batches {filter} ORDER BY created_at DESC"
        ))?;
        let rows = match arg {
            Some(id) => stmt.query_map([id.to_string()], row_to_batch)?,
            None => stmt.query_map([], row_to_batch)?,
        };
        let batches = rows.collect::<duckdb::Result<Vec<_>>>()?;
        Ok(batches)
    }

    fn fetch_audit(&self, batch_id: Uuid) -> Result<Vec<AuditRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {AUDIT_COLUMNS} FROM sys_import_audit WHERE batch_id = ? ORDER BY row_seq"
        ))?;
        let rows = stmt
            .query_map([batch_id.to_string()], row_to_audit)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn fetch_review_items(&self, batch_id: Option<Uuid>) -> Result<Vec<ReviewItem>> {
        let conn = self.conn()?;
        let items = match batch_id {
            Some(id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {REVIEW_COLUMNS} FROM sys_review_items
                     WHERE batch_id = ? ORDER BY transaction_date, fingerprint"
                ))?;
                let rows = stmt.query_map([id.to_string()], row_to_review_item)?;
                rows.collect::<duckdb::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {REVIEW_COLUMNS} FROM sys_review_items
                     ORDER BY transaction_date, fingerprint"
                ))?;
                let rows = stmt.query_map([], row_to_review_item)?;
                rows.collect::<duckdb::Result<Vec<_>>>()?
            }
        };
        Ok(items)
    }

    fn write_review(
        &self,
        item: &ReviewItem,
        accepted: Option<&Transaction>,
        correction: Option<&BalanceSnapshot>,
    ) -> result::Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(|e| Error::database(e.to_string()))?;

        if let Some(transaction) = accepted {
            Self::insert_transaction(&tx, transaction)?;
        }
        if let Some(snapshot) = correction {
            Self::insert_snapshot(&tx, snapshot)?;
        }
        let updated = tx
            .execute(
                "UPDATE sys_review_items
                 SET status = ?, resolved_at = ?, transaction_id = ?
                 WHERE batch_id = ? AND fingerprint = ? AND status = 'pending'",
                params![
                    item.status.as_str(),
                    item.resolved_at.as_ref().map(format_timestamp),
                    item.transaction_id.map(|id| id.to_string()),
                    item.batch_id.to_string(),
                    item.fingerprint,
                ],
            )
            .map_err(|e| Error::database(e.to_string()))?;
        if updated != 1 {
            return Err(Error::validation(format!(
                "review item {} in batch {} is not pending",
                item.fingerprint, item.batch_id
            )));
        }

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
        Ok(())
    }
}

impl LedgerRepository for DuckDbRepository {
    fn add_account(&self, account: &Account) -> result::Result<()> {
        self.insert_account(account)?;
        Ok(())
    }

    fn get_account(&self, id: Uuid) -> result::Result<Option<Account>> {
        Ok(self.fetch_accounts(Some(id))?.into_iter().next())
    }

    fn list_accounts(&self) -> result::Result<Vec<Account>> {
        Ok(self.fetch_accounts(None)?)
    }

    fn add_balance_snapshot(&self, snapshot: &BalanceSnapshot) -> result::Result<()> {
        let conn = self.conn()?;
        Self::insert_snapshot(&conn, snapshot)?;
        Ok(())
    }

    fn load_history(
        &self,
        account_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> std::result::Result<AccountHistory, StorageError> {
        self.fetch_history(account_id, from, to)
            .map_err(|e| StorageError::Unavailable(format!("{:#}", e)))
    }

    fn get_transactions(&self, account_id: Uuid) -> result::Result<Vec<Transaction>> {
        Ok(self.fetch_transactions(account_id)?)
    }

    fn commit_batch(&self, staged: &StagedBatch) -> std::result::Result<(), StorageError> {
        self.write_staged(staged)
            .map_err(|e| StorageError::CommitFailed(format!("{:#}", e)))
    }

    fn record_failed_batch(&self, batch: &ImportBatch) -> std::result::Result<(), StorageError> {
        let conn = self
            .conn()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Self::insert_batch(&conn, batch, BatchStatus::Failed)
            .map_err(|e| StorageError::Unavailable(format!("{:#}", e)))
    }

    fn list_batches(&self, account_id: Option<Uuid>) -> result::Result<Vec<ImportBatch>> {
        Ok(self.fetch_batches(account_id, None)?)
    }

    fn get_batch(&self, batch_id: Uuid) -> result::Result<Option<ImportBatch>> {
        Ok(self.fetch_batches(None, Some(batch_id))?.into_iter().next())
    }

    fn get_audit_records(&self, batch_id: Uuid) -> result::Result<Vec<AuditRecord>> {
        Ok(self.fetch_audit(batch_id)?)
    }

    fn get_review_items(&self, batch_id: Option<Uuid>) -> result::Result<Vec<ReviewItem>> {
        Ok(self.fetch_review_items(batch_id)?)
    }

    fn resolve_review(
        &self,
        item: &ReviewItem,
        accepted: Option<&Transaction>,
        correction: Option<&BalanceSnapshot>,
    ) -> result::Result<()> {
        self.write_review(item, accepted, correction)
    }
}

// Row mappers. Column order follows the *_COLUMNS constants above.

fn row_to_account(row: &duckdb::Row) -> duckdb::Result<Account> {
    let id: String = row.get(0)?;
    let created: String = row.get(4)?;
    let updated: String = row.get(5)?;
    let balance: Option<String> = row.get(6)?;
    Ok(Account {
        id: parse_uuid(&id),
        name: row.get(1)?,
        account_number: row.get(2)?,
        currency: row.get(3)?,
        balance: balance.as_deref().and_then(|b| parse_decimal(b).ok()),
        created_at: parse_timestamp(&created),
        updated_at: parse_timestamp(&updated),
    })
}

fn row_to_transaction(row: &duckdb::Row) -> duckdb::Result<Transaction> {
    let id: String = row.get(0)?;
    let account_id: String = row.get(1)?;
    let batch_id: Option<String> = row.get(2)?;
    let date: String = row.get(3)?;
    let amount: String = row.get(4)?;
    let created: String = row.get(7)?;
    Ok(Transaction {
        id: parse_uuid(&id),
        account_id: parse_uuid(&account_id),
        batch_id: batch_id.as_deref().map(parse_uuid),
        transaction_date: parse_date(&date),
        amount: parse_decimal(&amount).unwrap_or_default(),
        description: row.get(5)?,
        fingerprint: row.get(6)?,
        created_at: parse_timestamp(&created),
    })
}

fn row_to_batch(row: &duckdb::Row) -> duckdb::Result<ImportBatch> {
    let id: String = row.get(0)?;
    let account_id: String = row.get(1)?;
    let status: String = row.get(5)?;
    let period_start: String = row.get(7)?;
    let period_end: String = row.get(8)?;
    let decimal_at = |idx: usize| -> duckdb::Result<Decimal> {
        let s: String = row.get(idx)?;
        Ok(parse_decimal(&s).unwrap_or_default())
    };
    let count_at = |idx: usize| -> duckdb::Result<usize> {
        let n: i64 = row.get(idx)?;
        Ok(n.max(0) as usize)
    };
    let created: String = row.get(16)?;

    Ok(ImportBatch {
        id: parse_uuid(&id),
        account_id: parse_uuid(&account_id),
        bank_id: row.get(2)?,
        source_hash: row.get(3)?,
        source_name: row.get(4)?,
        created_at: parse_timestamp(&created),
        summary: StatementSummary {
            account_identifier: row.get(6)?,
            period_start: parse_date(&period_start),
            period_end: parse_date(&period_end),
            opening_balance: decimal_at(9)?,
            closing_balance: decimal_at(10)?,
        },
        status: BatchStatus::parse(&status).unwrap_or(BatchStatus::Failed),
        statement_delta: decimal_at(11)?,
        applied_delta: decimal_at(12)?,
        counts: DecisionCounts {
            new: count_at(13)?,
            duplicate: count_at(14)?,
            manual_review: count_at(15)?,
        },
    })
}

/// Raw statement row stored alongside audit records and review items,
/// starting at column `base` (page_index, row_index, date, description,
/// amount, balance_after, source_text)
fn raw_at(row: &duckdb::Row, base: usize) -> duckdb::Result<RawTransaction> {
    let page: i64 = row.get(base)?;
    let row_index: i64 = row.get(base + 1)?;
    let date: String = row.get(base + 2)?;
    let amount: String = row.get(base + 4)?;
    let balance: Option<String> = row.get(base + 5)?;
    Ok(RawTransaction {
        date: parse_date(&date),
        description: row.get(base + 3)?,
        amount: parse_decimal(&amount).unwrap_or_default(),
        balance_after: balance.as_deref().and_then(|b| parse_decimal(b).ok()),
        page_index: page.max(0) as usize,
        row_index: row_index.max(0) as usize,
        source_text: row.get(base + 6)?,
    })
}

fn row_to_audit(row: &duckdb::Row) -> duckdb::Result<AuditRecord> {
    let batch_id: String = row.get(0)?;
    let sequence: i64 = row.get(1)?;
    let classification: String = row.get(9)?;
    let transaction_id: Option<String> = row.get(11)?;
    let matched: Option<String> = row.get(12)?;
    Ok(AuditRecord {
        batch_id: parse_uuid(&batch_id),
        sequence: sequence.max(0) as usize,
        raw: raw_at(row, 2)?,
        classification: Classification::parse(&classification).unwrap_or(Classification::New),
        fingerprint: row.get(10)?,
        transaction_id: transaction_id.as_deref().map(parse_uuid),
        matched_transaction_id: matched.as_deref().map(parse_uuid),
    })
}

fn row_to_review_item(row: &duckdb::Row) -> duckdb::Result<ReviewItem> {
    let batch_id: String = row.get(0)?;
    let account_id: String = row.get(1)?;
    let matched: Option<String> = row.get(10)?;
    let status: String = row.get(11)?;
    let resolved: Option<String> = row.get(12)?;
    let transaction_id: Option<String> = row.get(13)?;
    Ok(ReviewItem {
        batch_id: parse_uuid(&batch_id),
        account_id: parse_uuid(&account_id),
        fingerprint: row.get(2)?,
        raw: raw_at(row, 3)?,
        matched_transaction_id: matched.as_deref().map(parse_uuid),
        status: ReviewStatus::parse(&status).unwrap_or(ReviewStatus::Pending),
        resolved_at: resolved.as_deref().map(parse_timestamp),
        transaction_id: transaction_id.as_deref().map(parse_uuid),
    })
}

// Helper functions

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    // Fixed width so lexical order is chronological order
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_else(|_| Utc::now().date_naive())
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

/// DECIMAL(18,4) text back to a Decimal, trimmed to at least two places
fn parse_decimal(s: &str) -> Result<Decimal> {
    let mut value = Decimal::from_str(s.trim())
        .with_context(|| format!("invalid decimal in ledger: {}", s))?
        .normalize();
    if value.scale() < 2 {
        value.rescale(2);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DuplicateDecision, StatementSummary};
    use tempfile::TempDir;

    fn repo() -> (TempDir, DuckDbRepository) {
        let dir = TempDir::new().unwrap();
        let repo = DuckDbRepository::new(&dir.path().join("ledger.duckdb")).unwrap();
        repo.ensure_schema().unwrap();
        (dir, repo)
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn staged(account_id: Uuid, amounts: &[(u32, i64, &str)]) -> StagedBatch {
        let total: Decimal = amounts.iter().map(|(_, a, _)| Decimal::new(*a, 2)).sum();
        let summary = StatementSummary {
            account_identifier: None,
            period_start: date(1),
            period_end: date(31),
            opening_balance: Decimal::ZERO,
            closing_balance: total,
        };
        let mut batch = ImportBatch::new(account_id, "first-meridian", "abc123", summary);
        batch.applied_delta = total;
        let mut transactions = Vec::new();
        let mut audit = Vec::new();
        for (i, (day, amount, desc)) in amounts.iter().enumerate() {
            let mut tx =
                Transaction::new(account_id, date(*day), Decimal::new(*amount, 2), *desc, 0);
            tx.batch_id = Some(batch.id);
            audit.push(AuditRecord {
                batch_id: batch.id,
                sequence: i,
                raw: RawTransaction {
                    date: date(*day),
                    description: desc.to_string(),
                    amount: Decimal::new(*amount, 2),
                    balance_after: None,
                    page_index: 0,
                    row_index: i,
                    source_text: desc.to_string(),
                },
                classification: Classification::New,
                fingerprint: tx.fingerprint.clone(),
                transaction_id: Some(tx.id),
                matched_transaction_id: None,
            });
            transactions.push(tx);
        }
        batch.counts = DecisionCounts::tally(
            &audit
                .iter()
                .map(|a| DuplicateDecision {
                    classification: a.classification,
                    fingerprint: a.fingerprint.clone(),
                    ordinal: 0,
                    matched_transaction_id: None,
                })
                .collect::<Vec<_>>(),
        );
        let balance = BalanceSnapshot::from_import(account_id, total, batch.id);
        StagedBatch {
            batch,
            transactions,
            audit,
            review_items: Vec::new(),
            balance,
        }
    }

    #[test]
    fn test_account_round_trip_with_balance() {
        let (_dir, repo) = repo();
        let mut account = Account::new(Uuid::new_v4(), "Checking");
        account.account_number = Some("****1234".to_string());
        repo.add_account(&account).unwrap();

        let loaded = repo.get_account(account.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Checking");
        assert_eq!(loaded.balance, None);

        repo.add_balance_snapshot(&BalanceSnapshot::from_manual(
            account.id,
            Decimal::new(12345, 2),
            Utc::now().naive_utc(),
        ))
        .unwrap();
        let loaded = repo.get_account(account.id).unwrap().unwrap();
        assert_eq!(loaded.balance, Some(Decimal::new(12345, 2)));
        assert_eq!(repo.list_accounts().unwrap().len(), 1);
    }

    #[test]
    fn test_commit_batch_lands_everything() {
        let (_dir, repo) = repo();
        let account = Account::new(Uuid::new_v4(), "Checking");
        repo.add_account(&account).unwrap();

        let staged = staged(account.id, &[(2, -450, "Coffee"), (5, 10000, "Refund")]);
        repo.commit_batch(&staged).unwrap();

        let history = repo.load_history(account.id, date(1), date(31)).unwrap();
        assert_eq!(history.transactions.len(), 2);
        assert_eq!(history.balance, Some(Decimal::new(9550, 2)));
        assert_eq!(history.transactions[0].amount, Decimal::new(-450, 2));

        let batch = repo.get_batch(staged.batch.id).unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Committed);
        assert_eq!(batch.counts.new, 2);
        assert_eq!(repo.get_audit_records(batch.id).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let (_dir, repo) = repo();
        let account = Account::new(Uuid::new_v4(), "Checking");
        repo.add_account(&account).unwrap();
        repo.commit_batch(&staged(account.id, &[(2, -450, "Coffee")]))
            .unwrap();

        // Same fingerprint again, after a fresh row: the unique index fails mid-batch
        let second = staged(account.id, &[(9, -1000, "Books"), (2, -450, "Coffee")]);
        let err = repo.commit_batch(&second).unwrap_err();
        assert!(matches!(err, StorageError::CommitFailed(_)));

        let txs = repo.get_transactions(account.id).unwrap();
        assert_eq!(txs.len(), 1);
        assert!(repo.get_batch(second.batch.id).unwrap().is_none());
        assert_eq!(
            repo.get_account(account.id).unwrap().unwrap().balance,
            Some(Decimal::new(-450, 2))
        );

        repo.record_failed_batch(&second.batch).unwrap();
        let failed = repo.get_batch(second.batch.id).unwrap().unwrap();
        assert_eq!(failed.status, BatchStatus::Failed);
        assert!(repo.get_audit_records(second.batch.id).unwrap().is_empty());
    }

    #[test]
    fn test_history_is_scoped_to_dates() {
        let (_dir, repo) = repo();
        let account = Account::new(Uuid::new_v4(), "Checking");
        repo.add_account(&account).unwrap();
        repo.commit_batch(&staged(account.id, &[(2, -450, "Coffee"), (20, -100, "Bus")]))
            .unwrap();

        let history = repo.load_history(account.id, date(1), date(10)).unwrap();
        assert_eq!(history.transactions.len(), 1);
        assert_eq!(history.transactions[0].description, "Coffee");
    }

    #[test]
    fn test_parse_decimal_keeps_two_places() {
        assert_eq!(parse_decimal("-4.5000").unwrap().to_string(), "-4.50");
        assert_eq!(parse_decimal("10.1250").unwrap().to_string(), "10.125");
        assert!(parse_decimal("abc").is_err());
    }
}
