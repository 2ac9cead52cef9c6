//! Document ports: opening archives and reading their text

use crate::domain::result::{ArchiveError, ExtractionError};
use crate::domain::{DocumentBytes, EncryptedArchive, ExtractedDocument};

/// Opens a password-protected archive
///
/// Takes the archive by value so the password is dropped (and zeroed)
/// before the call returns, whatever the outcome.
pub trait ArchiveDecryptor: Send + Sync {
    fn decrypt(&self, archive: EncryptedArchive) -> Result<DocumentBytes, ArchiveError>;
}

/// Turns document bytes into positioned rows of text
pub trait TextExtractor: Send + Sync {
    fn extract(&self, document: &DocumentBytes) -> Result<ExtractedDocument, ExtractionError>;
}
