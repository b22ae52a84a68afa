//! Storage trait definitions

use async_trait::async_trait;

use crate::credential::{Credential, NewCredential};
use crate::error::Result;

/// Owner-scoped access to credential records.
///
/// Every method takes the authenticated owner id and applies it inside the
/// query itself. Records owned by someone else are indistinguishable from
/// records that do not exist.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Validate, encrypt and persist a new record at version 1
    async fn insert(&self, owner_id: i64, new: NewCredential) -> Result<Credential>;

    /// Fetch one record with its password decrypted
    async fn get(&self, id: i64, owner_id: i64) -> Result<Credential>;

    /// Write the record back, bumping its version (last write wins)
    async fn update(&self, credential: &mut Credential, owner_id: i64) -> Result<()>;

    /// Write the record back only if the stored version still matches
    async fn update_checked(
        &self,
        credential: &mut Credential,
        owner_id: i64,
        expected_version: i32,
    ) -> Result<()>;

    /// Remove a record permanently
    async fn delete(&self, id: i64, owner_id: i64) -> Result<()>;

    /// All of the owner's records, ordered by id
    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Credential>>;
}
