//! Owner-scoped credential storage
//!
//! Passwords are encrypted right before they are bound into a statement and
//! decrypted right after a row is read. Every statement carries the owner id
//! in its WHERE clause, so there is no separate ownership check to forget.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tracing::{debug, error, info};

use super::types::{Credential, NewCredential};
use crate::crypto::{decrypt_string, encrypt_string, MasterKey, SecretString};
use crate::error::{Result, VaultError};
use crate::storage::{is_foreign_key_violation, CredentialRepository, Database};

const SELECT_COLUMNS: &str =
    "SELECT id, owner_id, created_at, name, username, password, website, version FROM credentials";

/// A credentials row as it sits on disk
struct StoredRow {
    id: i64,
    owner_id: i64,
    created_at: DateTime<Utc>,
    name: String,
    username: String,
    ciphertext: String,
    website: Option<String>,
    version: i32,
}

impl StoredRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            created_at: row.get(2)?,
            name: row.get(3)?,
            username: row.get(4)?,
            ciphertext: row.get(5)?,
            website: row.get(6)?,
            version: row.get(7)?,
        })
    }
}

/// Outcome of a guarded UPDATE
enum UpdateOutcome {
    Updated(i32),
    Conflict,
    Missing,
}

/// SQLite-backed credential store
pub struct CredentialStore {
    db: Database,
    master_key: Arc<MasterKey>,
}

impl CredentialStore {
    /// Create a store that encrypts with `master_key`
    pub fn new(db: Database, master_key: Arc<MasterKey>) -> Self {
        Self { db, master_key }
    }

    fn seal(&self, password: &SecretString) -> Result<String> {
        encrypt_string(password.expose(), &self.master_key)
    }

    fn open(&self, row: StoredRow) -> Result<Credential> {
        let password = decrypt_string(&row.ciphertext, &self.master_key).map_err(|e| {
            error!(
                "Failed to decrypt password of credential {} (owner {}): {}",
                row.id, row.owner_id, e
            );
            e
        })?;

        Ok(Credential {
            id: row.id,
            owner_id: row.owner_id,
            created_at: row.created_at,
            name: row.name,
            username: row.username,
            password: SecretString::new(password),
            website: row.website,
            version: row.version,
        })
    }

    async fn write(
        &self,
        credential: &mut Credential,
        owner_id: i64,
        expected_version: Option<i32>,
    ) -> Result<()> {
        if credential.id < 1 {
            return Err(VaultError::NotFound);
        }
        credential.validate()?;

        // Always re-encrypt: the in-memory record may hold a merged patch
        let ciphertext = self.seal(&credential.password)?;

        let id = credential.id;
        let name = credential.name.clone();
        let username = credential.username.clone();
        let website = credential.website.clone();

        let outcome = self
            .db
            .call(move |conn| {
                let version = conn
                    .query_row(
                        "UPDATE credentials \
                         SET name = ?1, username = ?2, password = ?3, website = ?4, \
                             version = version + 1 \
                         WHERE id = ?5 AND owner_id = ?6 \
                           AND (?7 IS NULL OR version = ?7) \
                         RETURNING version",
                        rusqlite::params![
                            name,
                            username,
                            ciphertext,
                            website,
                            id,
                            owner_id,
                            expected_version
                        ],
                        |row| row.get::<_, i32>(0),
                    )
                    .optional()?;

                if let Some(version) = version {
                    return Ok(UpdateOutcome::Updated(version));
                }
                if expected_version.is_none() {
                    return Ok(UpdateOutcome::Missing);
                }

                let exists = conn
                    .query_row(
                        "SELECT 1 FROM credentials WHERE id = ?1 AND owner_id = ?2",
                        rusqlite::params![id, owner_id],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();

                Ok(if exists {
                    UpdateOutcome::Conflict
                } else {
                    UpdateOutcome::Missing
                })
            })
            .await?;

        match outcome {
            UpdateOutcome::Updated(version) => {
                credential.version = version;
                info!("Updated credential {} to version {}", id, version);
                Ok(())
            }
            UpdateOutcome::Conflict => {
                debug!("Version conflict updating credential {}", id);
                Err(VaultError::EditConflict)
            }
            UpdateOutcome::Missing => Err(VaultError::NotFound),
        }
    }
}

#[async_trait]
impl CredentialRepository for CredentialStore {
    async fn insert(&self, owner_id: i64, new: NewCredential) -> Result<Credential> {
        new.validate()?;

        let ciphertext = self.seal(&new.password)?;
        let created_at = Utc::now();

        let name = new.name.clone();
        let username = new.username.clone();
        let website = new.website.clone();

        let inserted = self
            .db
            .call_raw(move |conn| {
                conn.query_row(
                    "INSERT INTO credentials \
                     (owner_id, created_at, name, username, password, website, version) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1) \
                     RETURNING id, version",
                    rusqlite::params![owner_id, created_at, name, username, ciphertext, website],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i32>(1)?)),
                )
            })
            .await?;

        let (id, version) = match inserted {
            Ok(ids) => ids,
            Err(e) if is_foreign_key_violation(&e) => {
                debug!("Rejected credential insert for unknown owner {}", owner_id);
                return Err(VaultError::NotFound);
            }
            Err(e) => return Err(e.into()),
        };

        info!("Inserted credential {} for owner {}", id, owner_id);

        // The caller gets back exactly what it submitted
        Ok(Credential {
            id,
            owner_id,
            created_at,
            name: new.name,
            username: new.username,
            password: new.password,
            website: new.website,
            version,
        })
    }

    async fn get(&self, id: i64, owner_id: i64) -> Result<Credential> {
        if id < 1 {
            return Err(VaultError::NotFound);
        }

        let row = self
            .db
            .call(move |conn| {
                conn.query_row(
                    &format!("{} WHERE id = ?1 AND owner_id = ?2", SELECT_COLUMNS),
                    rusqlite::params![id, owner_id],
                    StoredRow::from_row,
                )
                .optional()
            })
            .await?
            .ok_or(VaultError::NotFound)?;

        debug!("Loaded credential {}", id);
        self.open(row)
    }

    async fn update(&self, credential: &mut Credential, owner_id: i64) -> Result<()> {
        self.write(credential, owner_id, None).await
    }

    async fn update_checked(
        &self,
        credential: &mut Credential,
        owner_id: i64,
        expected_version: i32,
    ) -> Result<()> {
        self.write(credential, owner_id, Some(expected_version)).await
    }

    async fn delete(&self, id: i64, owner_id: i64) -> Result<()> {
        if id < 1 {
            return Err(VaultError::NotFound);
        }

        let affected = self
            .db
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM credentials WHERE id = ?1 AND owner_id = ?2",
                    rusqlite::params![id, owner_id],
                )
            })
            .await?;

        if affected == 0 {
            return Err(VaultError::NotFound);
        }

        info!("Deleted credential {}", id);
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Credential>> {
        let rows = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE owner_id = ?1 ORDER BY id",
                    SELECT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![owner_id], StoredRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        debug!("Listed {} credentials for owner {}", rows.len(), owner_id);
        rows.into_iter().map(|row| self.open(row)).collect()
    }
}
