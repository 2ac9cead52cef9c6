//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the LedgerRepository port
//! - zip for ArchiveDecryptor (ZipCrypto and AES entries)
//! - lopdf for TextExtractor
//! - Regex grammars for StatementImporter, with built-in bank grammars
//! - Static and environment-variable SecretProviders

pub mod archive;
pub mod banks;
pub mod duckdb;
pub mod grammar;
pub mod pdf;
pub mod secret;

pub use archive::ZipArchiveDecryptor;
pub use banks::{builtin_grammars, first_meridian, nordbank};
pub use duckdb::DuckDbRepository;
pub use grammar::GrammarImporter;
pub use pdf::{PdfTextExtractor, DEFAULT_CELL_GAP, DEFAULT_ROW_TOLERANCE};
pub use secret::{EnvSecretProvider, StaticSecretProvider};
