//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod account;
mod assemble;
mod batch;
mod dedupe;
pub mod import;
mod lock;
pub mod logging;
pub mod migration;
mod registry;
mod review;
mod verify;

pub use account::{AccountService, NewAccount};
pub use assemble::{BatchAssembler, BatchSource};
pub use batch::BatchService;
pub use dedupe::{DuplicateDetector, DEFAULT_DATE_WINDOW_DAYS};
pub use import::{ImportOptions, ImportRequest, ImportResult, ImportService};
pub use lock::{AccountLockGuard, AccountLocks};
pub use logging::{EntryPoint, EventCount, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use registry::ImporterRegistry;
pub use review::{ReviewDecision, ReviewService};
pub use verify::{BalanceVerifier, DEFAULT_TOLERANCE};
