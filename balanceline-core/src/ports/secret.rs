//! Secret provider port
//!
//! The archive password is supplied at call time only. The core never
//! stores it; whoever implements this trait owns entry and storage.

use uuid::Uuid;
use zeroize::Zeroizing;

use crate::domain::result::SecretError;

/// Context handed to the provider so it can prompt meaningfully
#[derive(Debug, Clone)]
pub struct SecretRequest {
    pub account_id: Uuid,
    pub bank_id: String,
    /// Archive file name, if known
    pub source_name: Option<String>,
}

pub trait SecretProvider: Send + Sync {
    /// Produce the password for one archive
    fn archive_password(&self, request: &SecretRequest) -> Result<Zeroizing<String>, SecretError>;
}
