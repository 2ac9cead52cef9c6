//! Balanceline Core - password-protected bank statement import and reconciliation
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (Account, Transaction, statements, batches, errors)
//! - **ports**: Trait definitions for external dependencies (ledger, secrets, importers)
//! - **services**: Business logic orchestration (the import pipeline and friends)
//! - **adapters**: Concrete implementations (DuckDB, zip, PDF, bank grammars)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use adapters::DuckDbRepository;
use config::Config;
use ports::{LedgerRepository, SecretProvider};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, ImportError, OperationResult, Result};
pub use domain::{Account, BalanceSnapshot, ImportBatch, ImportMode, ImportState, Transaction};

/// Main context for Balanceline operations
///
/// Holds the ledger, configuration and services for one data directory.
/// Nothing here is process-global: two contexts on two directories are
/// fully independent.
pub struct BalancelineContext {
    pub data_dir: PathBuf,
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub logging: Option<Arc<LoggingService>>,
    pub account_service: AccountService,
    pub import_service: ImportService,
    pub review_service: ReviewService,
    pub batch_service: BatchService,
    pub registry: Arc<ImporterRegistry>,
}

impl BalancelineContext {
    /// Open (or create) the ledger in `data_dir`
    ///
    /// Event logging is best-effort: if logs.duckdb cannot be opened the
    /// context still works, just without an event log.
    pub fn new(data_dir: &Path, entry_point: EntryPoint) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let config = Config::load(data_dir)?;

        let repository = Arc::new(DuckDbRepository::new(&data_dir.join("balanceline.duckdb"))?);
        repository.ensure_schema()?;
        let ledger: Arc<dyn LedgerRepository> = repository.clone();

        let logging = LoggingService::new(data_dir, entry_point, env!("CARGO_PKG_VERSION"))
            .ok()
            .map(Arc::new);

        let registry = Arc::new(ImporterRegistry::with_grammars(&config.bank_grammars)?);
        let locks = AccountLocks::new(data_dir);

        let mut import_service =
            ImportService::new(ledger.clone(), registry.clone(), locks.clone())
                .with_settings(&config.import);
        let mut review_service = ReviewService::new(ledger.clone(), locks);
        if let Some(logging) = &logging {
            import_service = import_service.with_logging(logging.clone());
            review_service = review_service.with_logging(logging.clone());
        }

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            account_service: AccountService::new(ledger.clone()),
            batch_service: BatchService::new(ledger),
            repository,
            logging,
            import_service,
            review_service,
            registry,
        })
    }

    /// Use `secrets` whenever an import request carries no password
    pub fn with_secret_provider(mut self, secrets: Arc<dyn SecretProvider>) -> Self {
        self.import_service = self.import_service.with_secret_provider(secrets);
        self
    }

    /// Log an event, ignoring failures
    pub fn log(&self, event: LogEvent) {
        if let Some(logging) = &self.logging {
            let _ = logging.log(event);
        }
    }
}
