//! Per-user permission grants

use std::fmt;
use std::str::FromStr;

use rusqlite::OptionalExtension;
use tracing::{debug, info};

use crate::error::{Result, VaultError};
use crate::storage::{is_foreign_key_violation, Database};

/// The closed set of grantable capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PermissionCode {
    /// List and read credentials
    LoginsRead,
    /// Create, modify and delete credentials
    LoginsWrite,
}

impl PermissionCode {
    /// Codes every newly registered user receives
    pub const DEFAULTS: [PermissionCode; 2] =
        [PermissionCode::LoginsRead, PermissionCode::LoginsWrite];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionCode::LoginsRead => "logins:read",
            PermissionCode::LoginsWrite => "logins:write",
        }
    }
}

impl fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionCode {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "logins:read" => Ok(PermissionCode::LoginsRead),
            "logins:write" => Ok(PermissionCode::LoginsWrite),
            other => Err(VaultError::Internal(format!(
                "unknown permission code: {}",
                other
            ))),
        }
    }
}

/// Insert grants on the caller's transaction, skipping ones already held
pub(crate) fn insert_grants(
    conn: &rusqlite::Connection,
    user_id: i64,
    codes: &[PermissionCode],
) -> rusqlite::Result<()> {
    let mut stmt =
        conn.prepare_cached("INSERT OR IGNORE INTO permissions (user_id, code) VALUES (?1, ?2)")?;
    for code in codes {
        stmt.execute(rusqlite::params![user_id, code.as_str()])?;
    }
    Ok(())
}

/// Many-to-many grants of [`PermissionCode`]s to users
#[derive(Clone)]
pub struct PermissionRegistry {
    db: Database,
}

impl PermissionRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Grant `code` to `user_id`. Granting twice is a no-op.
    pub async fn grant(&self, user_id: i64, code: PermissionCode) -> Result<()> {
        self.grant_all(user_id, &[code]).await
    }

    /// Grant several codes in one transaction
    pub async fn grant_all(&self, user_id: i64, codes: &[PermissionCode]) -> Result<()> {
        let codes = codes.to_vec();
        let count = codes.len();

        let outcome = self
            .db
            .call_raw(move |conn| insert_grants(conn, user_id, &codes))
            .await?;

        match outcome {
            Ok(()) => {
                info!("Granted {} permission(s) to user {}", count, user_id);
                Ok(())
            }
            Err(e) if is_foreign_key_violation(&e) => Err(VaultError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove `code` from `user_id`. Revoking a missing grant is a no-op.
    pub async fn revoke(&self, user_id: i64, code: PermissionCode) -> Result<()> {
        let code_str = code.as_str();
        let deleted = self
            .db
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM permissions WHERE user_id = ?1 AND code = ?2",
                    rusqlite::params![user_id, code_str],
                )
            })
            .await?;

        if deleted > 0 {
            info!("Revoked {} from user {}", code, user_id);
        }
        Ok(())
    }

    /// Whether `user_id` holds `code` (primary key lookup)
    pub async fn has(&self, user_id: i64, code: PermissionCode) -> Result<bool> {
        let code_str = code.as_str();
        let found = self
            .db
            .call(move |conn| {
                conn.query_row(
                    "SELECT 1 FROM permissions WHERE user_id = ?1 AND code = ?2",
                    rusqlite::params![user_id, code_str],
                    |_| Ok(()),
                )
                .optional()
            })
            .await?
            .is_some();

        debug!("Permission check {} for user {}: {}", code, user_id, found);
        Ok(found)
    }

    /// Every code held by `user_id`, sorted
    pub async fn codes_for(&self, user_id: i64) -> Result<Vec<PermissionCode>> {
        let raw = self
            .db
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT code FROM permissions WHERE user_id = ?1 ORDER BY code")?;
                let codes = stmt
                    .query_map(rusqlite::params![user_id], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(codes)
            })
            .await?;

        let mut codes = raw
            .iter()
            .map(|code| code.parse())
            .collect::<Result<Vec<PermissionCode>>>()?;
        codes.sort();
        Ok(codes)
    }
}
