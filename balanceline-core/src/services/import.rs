//! Import service - the statement import state machine
//!
//! One call walks a statement archive through
//! `Idle → Decrypting → Extracting → Parsing → Verifying → Deduplicating →
//! Assembling → Committed`. Every stage before the commit works on
//! in-memory values only, so a failure anywhere earlier leaves nothing to
//! undo. The commit itself is one database transaction.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::adapters::{PdfTextExtractor, ZipArchiveDecryptor};
use crate::config::ImportSettings;
use crate::domain::result::{ImportError, ParseError, SecretError, StageError, StorageError};
use crate::domain::{
    content_hash, BatchStatus, CancelFlag, DuplicateDecision, EncryptedArchive, ImportMode,
    ImportState, RawTransaction, ReviewItem, StatementSummary,
};
use crate::ports::{
    ArchiveDecryptor, LedgerRepository, NoopProgress, ProgressObserver, SecretProvider,
    SecretRequest, TextExtractor,
};
use crate::services::{
    AccountLocks, BalanceVerifier, BatchAssembler, BatchSource, DuplicateDetector,
    ImporterRegistry, LogEvent, LoggingService,
};

/// Per-call import options
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Overrides the configured mode
    pub mode: Option<ImportMode>,
    /// Run through Assembling and report, without writing anything
    pub preview: bool,
}

/// Everything one import needs from the caller
pub struct ImportRequest {
    pub archive: Vec<u8>,
    /// Archive password; when absent the secret provider is asked
    pub password: Option<Zeroizing<String>>,
    pub account_id: Uuid,
    pub bank_id: String,
    /// File name the archive came from, kept on the batch
    pub source_name: Option<String>,
    pub options: ImportOptions,
    pub cancel: CancelFlag,
}

impl ImportRequest {
    pub fn new(archive: Vec<u8>, account_id: Uuid, bank_id: impl Into<String>) -> Self {
        Self {
            archive,
            password: None,
            account_id,
            bank_id: bank_id.into(),
            source_name: None,
            options: ImportOptions::default(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    pub fn with_mode(mut self, mode: ImportMode) -> Self {
        self.options.mode = Some(mode);
        self
    }

    pub fn preview(mut self) -> Self {
        self.options.preview = true;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }
}

impl fmt::Debug for ImportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportRequest")
            .field("archive_len", &self.archive.len())
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("account_id", &self.account_id)
            .field("bank_id", &self.bank_id)
            .field("source_name", &self.source_name)
            .field("options", &self.options)
            .finish()
    }
}

/// Report of a finished (or previewed) import
#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub batch_id: Uuid,
    pub account_id: Uuid,
    pub bank_id: String,
    pub status: BatchStatus,
    /// Rows committed as new transactions
    pub committed_count: usize,
    pub duplicate_count: usize,
    pub manual_review_count: usize,
    /// Balance after the commit (projected, in preview)
    pub new_account_balance: Decimal,
    pub statement_delta: Decimal,
    pub applied_delta: Decimal,
    pub summary: StatementSummary,
    pub transactions: Vec<RawTransaction>,
    /// One per entry of `transactions`
    pub decisions: Vec<DuplicateDecision>,
    pub review_items: Vec<ReviewItem>,
    /// Rows skipped in best-effort mode
    pub row_errors: Vec<ParseError>,
    pub preview: bool,
}

/// Tracks the current state of one import run and reports transitions
struct Run<'a> {
    state: ImportState,
    observer: &'a dyn ProgressObserver,
    cancel: &'a CancelFlag,
    logging: Option<&'a LoggingService>,
    bank_id: &'a str,
}

impl<'a> Run<'a> {
    fn log(&self, event: LogEvent) {
        if let Some(logging) = self.logging {
            let _ = logging.log(event.with_bank(self.bank_id));
        }
    }

    /// Move forward one stage; a pending cancellation is honored here, except
    /// on the way into Committed since the commit has already happened
    fn advance(&mut self, to: ImportState) -> Result<(), ImportError> {
        if to != ImportState::Committed && self.cancel.is_cancelled() {
            return Err(self.fail(StageError::Cancelled));
        }
        debug_assert!(self.state.can_transition_to(to));
        let from = self.state;
        self.state = to;
        self.observer.on_transition(from, to);
        self.log(LogEvent::new("stage_entered").with_stage(to.as_str()));
        Ok(())
    }

    /// Fail in the current stage
    fn fail(&mut self, error: impl Into<StageError>) -> ImportError {
        let error = ImportError::new(self.state, error);
        let from = self.state;
        self.state = ImportState::Failed;
        self.observer.on_transition(from, ImportState::Failed);

        let event = if matches!(error.error, StageError::Cancelled) {
            LogEvent::new("import_cancelled")
        } else {
            LogEvent::new("import_failed").with_error_kind(error.kind())
        };
        self.log(event.with_stage(error.stage.as_str()));
        error
    }
}

/// Statement import orchestrator
///
/// Holds no per-import state; concurrent calls for different accounts run
/// in parallel, calls for the same account serialize on the account lock.
#[derive(Clone)]
pub struct ImportService {
    repository: Arc<dyn LedgerRepository>,
    registry: Arc<ImporterRegistry>,
    locks: AccountLocks,
    decryptor: Arc<dyn ArchiveDecryptor>,
    extractor: Arc<dyn TextExtractor>,
    secrets: Option<Arc<dyn SecretProvider>>,
    logging: Option<Arc<LoggingService>>,
    verifier: BalanceVerifier,
    detector: DuplicateDetector,
    assembler: BatchAssembler,
    default_mode: ImportMode,
}

impl ImportService {
    pub fn new(
        repository: Arc<dyn LedgerRepository>,
        registry: Arc<ImporterRegistry>,
        locks: AccountLocks,
    ) -> Self {
        Self {
            repository,
            registry,
            locks,
            decryptor: Arc::new(ZipArchiveDecryptor::new()),
            extractor: Arc::new(PdfTextExtractor::default()),
            secrets: None,
            logging: None,
            verifier: BalanceVerifier::default(),
            detector: DuplicateDetector::default(),
            assembler: BatchAssembler::new(),
            default_mode: ImportMode::default(),
        }
    }

    /// Apply tolerances, window, mode and layout settings
    pub fn with_settings(mut self, settings: &ImportSettings) -> Self {
        self.verifier = BalanceVerifier::new(settings.balance_tolerance);
        self.detector = DuplicateDetector::new(settings.date_window_days);
        self.extractor = Arc::new(PdfTextExtractor::new(
            settings.row_tolerance,
            settings.cell_gap,
        ));
        self.default_mode = settings.mode;
        self
    }

    pub fn with_secret_provider(mut self, secrets: Arc<dyn SecretProvider>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn with_logging(mut self, logging: Arc<LoggingService>) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn with_decryptor(mut self, decryptor: Arc<dyn ArchiveDecryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn import(&self, request: ImportRequest) -> Result<ImportResult, ImportError> {
        self.import_with_progress(request, &NoopProgress)
    }

    /// Run the pipeline on a blocking worker thread
    pub async fn import_async(
        &self,
        request: ImportRequest,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<ImportResult, ImportError> {
        let service = self.clone();
        let handle = tokio::task::spawn_blocking(move || {
            service.import_with_progress(request, observer.as_ref())
        });
        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(ImportError::new(ImportState::Idle, StageError::Cancelled)),
        }
    }

    pub fn import_with_progress(
        &self,
        request: ImportRequest,
        observer: &dyn ProgressObserver,
    ) -> Result<ImportResult, ImportError> {
        let ImportRequest {
            archive,
            password,
            account_id,
            bank_id,
            source_name,
            options,
            cancel,
        } = request;

        let mut run = Run {
            state: ImportState::Idle,
            observer,
            cancel: &cancel,
            logging: self.logging.as_deref(),
            bank_id: &bank_id,
        };
        run.log(LogEvent::new("import_started"));

        // Idle: resolve the account and the bank's importer
        let account = match self.repository.get_account(account_id) {
            Ok(Some(account)) => account,
            Ok(None) => return Err(run.fail(StageError::AccountNotFound(account_id))),
            Err(e) => return Err(run.fail(StorageError::Unavailable(e.to_string()))),
        };
        let importer = self.registry.get(&bank_id).map_err(|e| run.fail(e))?;
        let mode = options.mode.unwrap_or(self.default_mode);
        let source = BatchSource {
            bank_id: bank_id.clone(),
            content_hash: content_hash(&archive),
            name: source_name.clone(),
        };

        run.advance(ImportState::Decrypting)?;
        let password = match password {
            Some(password) => password,
            None => self.ask_password(account_id, &bank_id, source_name).map_err(|e| run.fail(e))?,
        };
        let document = self
            .decryptor
            .decrypt(EncryptedArchive::new(archive, password))
            .map_err(|e| run.fail(e))?;

        run.advance(ImportState::Extracting)?;
        let extracted = self.extractor.extract(&document).map_err(|e| run.fail(e))?;
        drop(document);

        run.advance(ImportState::Parsing)?;
        let parsed = importer.parse(&extracted, mode).map_err(|e| run.fail(e))?;
        drop(extracted);
        if !account.matches_statement_identifier(parsed.summary.account_identifier.as_deref()) {
            return Err(run.fail(ParseError::AccountMismatch {
                expected: account.account_number.clone().unwrap_or_default(),
                found: parsed.summary.account_identifier.clone().unwrap_or_default(),
            }));
        }

        run.advance(ImportState::Verifying)?;
        self.verifier
            .verify(&parsed.transactions, &parsed.summary)
            .map_err(|e| run.fail(e))?;

        run.advance(ImportState::Deduplicating)?;
        // Held until this function returns: through Assembling and the commit
        let _guard = self
            .locks
            .acquire(account_id)
            .map_err(|e| run.fail(StageError::Lock(e.to_string())))?;
        let (from, to) = self
            .detector
            .history_range(parsed.summary.period_start, parsed.summary.period_end);
        let history = self
            .repository
            .load_history(account_id, from, to)
            .map_err(|e| run.fail(e))?;
        let decisions = self.detector.classify_with_held(
            account_id,
            &parsed.transactions,
            &history.transactions,
            &history.held,
        );

        run.advance(ImportState::Assembling)?;
        let mut staged = self.assembler.assemble(
            account_id,
            history.balance,
            &source,
            &parsed.summary,
            &parsed.transactions,
            &decisions,
        );

        if options.preview {
            run.log(LogEvent::new("import_previewed").with_batch(staged.batch.id));
            return Ok(ImportResult {
                batch_id: staged.batch.id,
                account_id,
                bank_id,
                status: staged.batch.status,
                committed_count: staged.batch.counts.new,
                duplicate_count: staged.batch.counts.duplicate,
                manual_review_count: staged.batch.counts.manual_review,
                new_account_balance: staged.balance.balance,
                statement_delta: staged.batch.statement_delta,
                applied_delta: staged.batch.applied_delta,
                summary: parsed.summary,
                transactions: parsed.transactions,
                decisions,
                review_items: staged.review_items,
                row_errors: parsed.row_errors,
                preview: true,
            });
        }

        if let Err(e) = self.repository.commit_batch(&staged) {
            // Nothing of the batch landed; keep a failed record for the audit trail
            if staged.batch.mark_failed().is_ok() {
                let _ = self.repository.record_failed_batch(&staged.batch);
            }
            return Err(run.fail(e));
        }
        staged
            .batch
            .mark_committed()
            .map_err(|e| run.fail(StorageError::CommitFailed(e.to_string())))?;

        run.advance(ImportState::Committed)?;
        run.log(LogEvent::new("import_committed").with_batch(staged.batch.id));

        Ok(ImportResult {
            batch_id: staged.batch.id,
            account_id,
            bank_id,
            status: staged.batch.status,
            committed_count: staged.batch.counts.new,
            duplicate_count: staged.batch.counts.duplicate,
            manual_review_count: staged.batch.counts.manual_review,
            new_account_balance: staged.balance.balance,
            statement_delta: staged.batch.statement_delta,
            applied_delta: staged.batch.applied_delta,
            summary: parsed.summary,
            transactions: parsed.transactions,
            decisions,
            review_items: staged.review_items,
            row_errors: parsed.row_errors,
            preview: false,
        })
    }

    fn ask_password(
        &self,
        account_id: Uuid,
        bank_id: &str,
        source_name: Option<String>,
    ) -> Result<Zeroizing<String>, SecretError> {
        let secrets = self.secrets.as_ref().ok_or_else(|| {
            SecretError::Unavailable("no password given and no secret provider configured".into())
        })?;
        secrets.archive_password(&SecretRequest {
            account_id,
            bank_id: bank_id.to_string(),
            source_name,
        })
    }
}
