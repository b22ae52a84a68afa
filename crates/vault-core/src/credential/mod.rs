//! Credential records: validation, encryption at rest and owner-scoped CRUD

mod store;
mod types;

pub use store::CredentialStore;
pub use types::*;
