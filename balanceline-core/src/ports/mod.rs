//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod document;
mod importer;
mod progress;
mod repository;
mod secret;

pub use document::{ArchiveDecryptor, TextExtractor};
pub use importer::{ParsedStatement, StatementImporter};
pub use progress::{NoopProgress, ProgressObserver};
pub use repository::{AccountHistory, LedgerRepository};
pub use secret::{SecretProvider, SecretRequest};
