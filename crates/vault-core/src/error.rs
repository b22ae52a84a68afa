//! Error types for vault-core

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Field-level validation failures, keyed by field name.
///
/// Only the first failure per field is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `field` unless the field already failed
    pub fn add(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Record a failure when `ok` is false
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// Convert into `Err(VaultError::Validation)` if anything failed
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(VaultError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.errors {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Record not found")]
    NotFound,

    #[error("Edit conflict - the record was modified concurrently")]
    EditConflict,

    #[error("Missing or invalid authentication token")]
    Unauthenticated,

    #[error("Authentication token has expired")]
    Expired,

    #[error("Authentication token is not valid for this purpose")]
    ScopeMismatch,

    #[error("Permission denied")]
    Unauthorized,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("A user with this email address already exists")]
    DuplicateEmail,

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Failures the caller did not cause. These get logged server-side and
    /// are reported to clients without detail.
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            VaultError::Integrity(_)
                | VaultError::Unavailable(_)
                | VaultError::Config(_)
                | VaultError::Internal(_)
        )
    }

    /// Token failures that reject a request as unauthenticated
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            VaultError::Unauthenticated | VaultError::Expired | VaultError::ScopeMismatch
        )
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        VaultError::Unavailable(e.to_string())
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for VaultError {
    fn from(e: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        VaultError::Unavailable(e.to_string())
    }
}

impl From<std::io::Error> for VaultError {
    fn from(e: std::io::Error) -> Self {
        VaultError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_keeps_first_message() {
        let mut v = ValidationErrors::new();
        v.check(false, "name", "must be provided");
        v.check(false, "name", "must not be more than 255 bytes long");
        v.check(true, "username", "must be provided");

        assert_eq!(v.get("name"), Some("must be provided"));
        assert_eq!(v.get("username"), None);
        assert!(matches!(v.into_result(), Err(VaultError::Validation(_))));
    }

    #[test]
    fn test_server_fault_classification() {
        assert!(VaultError::Integrity("tag".into()).is_server_fault());
        assert!(VaultError::Unavailable("timeout".into()).is_server_fault());
        assert!(!VaultError::NotFound.is_server_fault());
        assert!(!VaultError::Unauthorized.is_server_fault());
        assert!(VaultError::Expired.is_auth_failure());
        assert!(!VaultError::Unauthorized.is_auth_failure());
    }
}
