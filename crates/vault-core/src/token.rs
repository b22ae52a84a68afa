//! Bearer token issuance and validation
//!
//! The client receives a random token exactly once. The database only ever
//! sees its SHA-256 fingerprint, so reading the tokens table is not enough
//! to authenticate. Expiry is checked on every validation; purging expired
//! rows is housekeeping only.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use rand::RngCore;
use rusqlite::OptionalExtension;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::crypto::SecretString;
use crate::error::{Result, VaultError};
use crate::storage::{is_foreign_key_violation, Database};

/// Random bytes per token
const TOKEN_BYTES: usize = 32;

/// Length of the base64url (unpadded) encoding of [`TOKEN_BYTES`]
pub const TOKEN_LEN: usize = 43;

/// Longest lifetime a token may be issued with
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    /// Bearer tokens for API requests
    Authentication,
    /// One-off tokens for account activation
    Activation,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Authentication => "authentication",
            TokenScope::Activation => "activation",
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenScope {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "authentication" => Ok(TokenScope::Authentication),
            "activation" => Ok(TokenScope::Activation),
            other => Err(VaultError::Internal(format!("unknown token scope: {}", other))),
        }
    }
}

/// A freshly issued token. The plaintext is not recoverable afterwards.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub plaintext: SecretString,
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

/// One-way fingerprint used as the lookup key
pub fn fingerprint(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

fn generate_plaintext() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Delete a user's tokens of one scope on the caller's transaction
pub(crate) fn delete_tokens(
    conn: &rusqlite::Connection,
    user_id: i64,
    scope: TokenScope,
) -> rusqlite::Result<u64> {
    let deleted = conn.execute(
        "DELETE FROM tokens WHERE user_id = ?1 AND scope = ?2",
        rusqlite::params![user_id, scope.as_str()],
    )?;
    Ok(deleted as u64)
}

/// Issues, validates and revokes bearer tokens
#[derive(Clone)]
pub struct TokenAuthenticator {
    db: Database,
}

impl TokenAuthenticator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Issue a token for `user_id`, valid for `ttl` (at most [`MAX_TOKEN_TTL`])
    pub async fn issue(&self, user_id: i64, scope: TokenScope, ttl: Duration) -> Result<IssuedToken> {
        if ttl > MAX_TOKEN_TTL {
            return Err(VaultError::Config(format!(
                "token ttl of {}s exceeds the {}s maximum",
                ttl.as_secs(),
                MAX_TOKEN_TTL.as_secs()
            )));
        }
        let expiry = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| VaultError::Config("token expiry out of range".to_string()))?;

        let plaintext = generate_plaintext();
        let hash = fingerprint(&plaintext);
        let expiry_ms = expiry.timestamp_millis();
        let scope_str = scope.as_str();

        let inserted = self
            .db
            .call_raw(move |conn| {
                conn.execute(
                    "INSERT INTO tokens (hash, user_id, expiry, scope) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![hash, user_id, expiry_ms, scope_str],
                )
            })
            .await?;

        match inserted {
            Ok(_) => {}
            Err(e) if is_foreign_key_violation(&e) => return Err(VaultError::NotFound),
            Err(e) => return Err(e.into()),
        }

        info!("Issued {} token for user {} expiring at {}", scope, user_id, expiry);

        Ok(IssuedToken {
            plaintext: SecretString::new(plaintext),
            expiry,
            scope,
        })
    }

    /// Resolve a presented token to its user id.
    ///
    /// Fails with `Unauthenticated` for unknown tokens, `Expired` once the
    /// expiry instant is reached and `ScopeMismatch` for the wrong purpose.
    pub async fn validate(&self, plaintext: &str, required_scope: TokenScope) -> Result<i64> {
        if plaintext.len() != TOKEN_LEN {
            return Err(VaultError::Unauthenticated);
        }

        let hash = fingerprint(plaintext);
        let row = self
            .db
            .call(move |conn| {
                conn.query_row(
                    "SELECT user_id, expiry, scope FROM tokens WHERE hash = ?1",
                    rusqlite::params![hash],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()
            })
            .await?;

        let (user_id, expiry_ms, scope) = row.ok_or(VaultError::Unauthenticated)?;

        if Utc::now().timestamp_millis() >= expiry_ms {
            debug!(
                "Rejected expired token for user {} (expired {:?})",
                user_id,
                Utc.timestamp_millis_opt(expiry_ms).single()
            );
            return Err(VaultError::Expired);
        }

        if scope.parse::<TokenScope>()? != required_scope {
            debug!(
                "Rejected {} token for user {} where {} was required",
                scope, user_id, required_scope
            );
            return Err(VaultError::ScopeMismatch);
        }

        Ok(user_id)
    }

    /// Delete every `scope` token belonging to `user_id`
    pub async fn revoke(&self, user_id: i64, scope: TokenScope) -> Result<u64> {
        let deleted = self
            .db
            .call(move |conn| delete_tokens(conn, user_id, scope))
            .await?;

        info!("Revoked {} {} token(s) for user {}", deleted, scope, user_id);
        Ok(deleted)
    }

    /// Drop rows whose expiry has passed
    pub async fn purge_expired(&self) -> Result<u64> {
        let now_ms = Utc::now().timestamp_millis();
        let deleted = self
            .db
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM tokens WHERE expiry <= ?1",
                    rusqlite::params![now_ms],
                )
            })
            .await?;

        debug!("Purged {} expired token(s)", deleted);
        Ok(deleted as u64)
    }
}
