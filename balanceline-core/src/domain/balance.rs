//! Balance snapshot domain model

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents an account balance captured at a point in time
///
/// Snapshots are append-only; an account's balance is its latest snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub id: Uuid,
    pub account_id: Uuid,
    pub balance: Decimal,
    /// When the balance was captured (naive datetime, UTC)
    pub snapshot_time: NaiveDateTime,
    pub created_at: DateTime<Utc>,
    /// How this snapshot was created ("manual", "statement_import")
    pub source: Option<String>,
    /// Import batch that produced this snapshot
    pub batch_id: Option<Uuid>,
}

impl BalanceSnapshot {
    /// Create a new balance snapshot
    pub fn new(account_id: Uuid, balance: Decimal, snapshot_time: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            balance,
            snapshot_time,
            created_at: Utc::now(),
            source: None,
            batch_id: None,
        }
    }

    /// Create a snapshot from manual entry
    pub fn from_manual(account_id: Uuid, balance: Decimal, snapshot_time: NaiveDateTime) -> Self {
        let mut snapshot = Self::new(account_id, balance, snapshot_time);
        snapshot.source = Some("manual".to_string());
        snapshot
    }

    /// Create a snapshot from a committed statement import
    pub fn from_import(account_id: Uuid, balance: Decimal, batch_id: Uuid) -> Self {
        let mut snapshot = Self::new(account_id, balance, Utc::now().naive_utc());
        snapshot.source = Some("statement_import".to_string());
        snapshot.batch_id = Some(batch_id);
        snapshot
    }
}
