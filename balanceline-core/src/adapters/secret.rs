//! Secret provider adapters
//!
//! Neither provider persists anything. Interactive entry lives in the CLI.

use zeroize::Zeroizing;

use crate::domain::result::SecretError;
use crate::ports::{SecretProvider, SecretRequest};

/// Hands out a password supplied up front (tests, scripted imports)
pub struct StaticSecretProvider {
    password: Zeroizing<String>,
}

impl StaticSecretProvider {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: Zeroizing::new(password.into()),
        }
    }
}

impl SecretProvider for StaticSecretProvider {
    fn archive_password(&self, _request: &SecretRequest) -> Result<Zeroizing<String>, SecretError> {
        Ok(self.password.clone())
    }
}

/// Reads the password from an environment variable at call time
pub struct EnvSecretProvider {
    var: String,
}

impl EnvSecretProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl SecretProvider for EnvSecretProvider {
    fn archive_password(&self, _request: &SecretRequest) -> Result<Zeroizing<String>, SecretError> {
        match std::env::var(&self.var) {
            Ok(value) if !value.is_empty() => Ok(Zeroizing::new(value)),
            _ => Err(SecretError::Unavailable(format!(
                "environment variable {} is not set",
                self.var
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request() -> SecretRequest {
        SecretRequest {
            account_id: Uuid::new_v4(),
            bank_id: "first-meridian".to_string(),
            source_name: None,
        }
    }

    #[test]
    fn test_static_provider() {
        let provider = StaticSecretProvider::new("hunter2");
        assert_eq!(provider.archive_password(&request()).unwrap().as_str(), "hunter2");
    }

    #[test]
    fn test_env_provider_missing_var_names_var_only() {
        let provider = EnvSecretProvider::new("BALANCELINE_TEST_UNSET_PASSWORD_VAR");
        let err = provider.archive_password(&request()).unwrap_err();
        assert!(err.to_string().contains("BALANCELINE_TEST_UNSET_PASSWORD_VAR"));
    }
}
