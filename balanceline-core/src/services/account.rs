//! Account service - creating and reading the accounts statements land in

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, BalanceSnapshot};
use crate::ports::LedgerRepository;

/// Fields for a new account
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub name: String,
    pub account_number: Option<String>,
    /// Defaults to USD
    pub currency: Option<String>,
    /// Recorded as a manual balance snapshot
    pub opening_balance: Option<Decimal>,
}

pub struct AccountService {
    repository: Arc<dyn LedgerRepository>,
}

impl AccountService {
    pub fn new(repository: Arc<dyn LedgerRepository>) -> Self {
        Self { repository }
    }

    pub fn create(&self, new: NewAccount) -> Result<Account> {
        let mut account = Account::new(Uuid::new_v4(), new.name.trim());
        account.account_number = new
            .account_number
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if let Some(currency) = new.currency {
            account.currency = Account::normalize_currency(&currency);
        }
        account.validate().map_err(Error::validation)?;

        self.repository.add_account(&account)?;
        if let Some(balance) = new.opening_balance {
            self.set_balance(account.id, balance)?;
            account.balance = Some(balance);
        }
        Ok(account)
    }

    pub fn list(&self) -> Result<Vec<Account>> {
        self.repository.list_accounts()
    }

    pub fn get(&self, id: Uuid) -> Result<Account> {
        self.repository
            .get_account(id)?
            .ok_or_else(|| Error::not_found(format!("account {}", id)))
    }

    /// Record a manually entered balance; it becomes the account's balance
    pub fn set_balance(&self, id: Uuid, balance: Decimal) -> Result<BalanceSnapshot> {
        self.get(id)?;
        let snapshot = BalanceSnapshot::from_manual(id, balance, Utc::now().naive_utc());
        self.repository.add_balance_snapshot(&snapshot)?;
        Ok(snapshot)
    }
}
