//! # vault-core
//!
//! Core functionality for passvault, a multi-user password manager:
//! - AES-256-GCM encryption of stored secrets under a single master key
//! - Opaque bearer tokens persisted only as SHA-256 fingerprints
//! - Per-user permission codes checked on every request
//! - Owner-scoped, versioned credential records in SQLite

pub mod credential;
pub mod crypto;
pub mod error;
pub mod gate;
pub mod permission;
pub mod settings;
pub mod storage;
pub mod token;
pub mod user;
mod vault;

#[cfg(test)]
mod test_support;

pub use credential::{Credential, CredentialPatch, CredentialStore, NewCredential};
pub use crypto::{decrypt_string, encrypt_string, MasterKey, PasswordHashParams, SecretString};
pub use error::{Result, ValidationErrors, VaultError};
pub use gate::{parse_bearer, AccessGate, Authenticated, Authorized};
pub use permission::{PermissionCode, PermissionRegistry};
pub use settings::{SettingsManager, VaultSettings};
pub use storage::{CredentialRepository, Database};
pub use token::{IssuedToken, TokenAuthenticator, TokenScope, MAX_TOKEN_TTL};
pub use user::{NewUser, User, UserStore};
pub use vault::Vault;
