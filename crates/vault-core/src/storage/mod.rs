//! Relational persistence for the vault
//!
//! A single SQLite database holds the users, credentials, tokens and
//! permissions tables. Components share one [`Database`] handle.

mod database;
mod traits;

pub use database::{is_foreign_key_violation, is_unique_violation, Database, DEFAULT_QUERY_TIMEOUT};
pub use traits::CredentialRepository;
