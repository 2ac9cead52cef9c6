//! Archive input model

use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Raw archive bytes plus the one-shot password that opens them
///
/// The password is zeroed when the value (or the half split off by
/// `into_parts`) is dropped. Debug output never shows it.
pub struct EncryptedArchive {
    bytes: Vec<u8>,
    password: Zeroizing<String>,
}

impl EncryptedArchive {
    pub fn new(bytes: Vec<u8>, password: Zeroizing<String>) -> Self {
        Self { bytes, password }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Split into bytes and password; the caller owns the password's lifetime
    pub fn into_parts(self) -> (Vec<u8>, Zeroizing<String>) {
        (self.bytes, self.password)
    }
}

impl fmt::Debug for EncryptedArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedArchive")
            .field("len", &self.bytes.len())
            .field("password", &"<redacted>")
            .finish()
    }
}

/// SHA-256 of the archive bytes, hex encoded
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// The statement document pulled out of an archive
#[derive(Debug, Clone)]
pub struct DocumentBytes {
    /// Entry name inside the archive
    pub name: String,
    pub bytes: Vec<u8>,
}
