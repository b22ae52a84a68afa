//! User accounts: registration and password login

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tracing::{debug, info};

use crate::crypto::{hash_password, verify_password, PasswordHashParams, SecretString};
use crate::error::{Result, ValidationErrors, VaultError};
use crate::permission::{insert_grants, PermissionCode};
use crate::storage::{is_unique_violation, Database};
use crate::token::{delete_tokens, TokenScope};

const MAX_NAME_BYTES: usize = 255;
const MAX_EMAIL_BYTES: usize = 255;
const MIN_PASSWORD_BYTES: usize = 8;
// Argon2 accepts more, but bcrypt-era clients assume 72
const MAX_PASSWORD_BYTES: usize = 72;

/// A registered user. The password hash never leaves [`UserStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub activated: bool,
    pub version: i32,
}

/// Registration input
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: SecretString,
}

impl NewUser {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: SecretString::new(password),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut v = ValidationErrors::new();

        v.check(!self.name.is_empty(), "name", "must be provided");
        v.check(
            self.name.len() <= MAX_NAME_BYTES,
            "name",
            "must not be more than 255 bytes long",
        );

        validate_email(&mut v, &self.email);
        validate_password(&mut v, self.password.expose());

        v.into_result()
    }
}

fn validate_email(v: &mut ValidationErrors, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(
        email.len() <= MAX_EMAIL_BYTES,
        "email",
        "must not be more than 255 bytes long",
    );

    let well_formed = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    v.check(well_formed, "email", "must be a valid email address");
}

fn validate_password(v: &mut ValidationErrors, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= MIN_PASSWORD_BYTES,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= MAX_PASSWORD_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        created_at: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        activated: row.get(4)?,
        version: row.get(5)?,
    })
}

fn mark_activated(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE users SET activated = 1, version = version + 1 WHERE id = ?1",
        rusqlite::params![id],
    )
}

async fn hash_off_thread(password: SecretString, params: PasswordHashParams) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(password.expose(), &params))
        .await
        .map_err(|e| VaultError::Internal(format!("hashing task failed: {}", e)))?
}

/// SQLite-backed user accounts
#[derive(Clone)]
pub struct UserStore {
    db: Database,
    params: PasswordHashParams,
}

impl UserStore {
    pub fn new(db: Database, params: PasswordHashParams) -> Self {
        Self { db, params }
    }

    /// Validate, hash and insert a new (not yet activated) user
    pub async fn register(&self, new: NewUser) -> Result<User> {
        self.insert(new, &[], false).await
    }

    /// Register, grant `codes` and activate the account in one transaction
    pub async fn register_activated(&self, new: NewUser, codes: &[PermissionCode]) -> Result<User> {
        self.insert(new, codes, true).await
    }

    async fn insert(&self, new: NewUser, codes: &[PermissionCode], activate: bool) -> Result<User> {
        new.validate()?;

        let password_hash = hash_off_thread(new.password.clone(), self.params).await?;
        let created_at = Utc::now();
        let name = new.name.clone();
        let email = new.email.clone();
        let codes = codes.to_vec();

        let inserted = self
            .db
            .call_raw(move |conn| {
                let id = conn.query_row(
                    "INSERT INTO users (created_at, name, email, password_hash, activated, version) \
                     VALUES (?1, ?2, ?3, ?4, 0, 1) RETURNING id",
                    rusqlite::params![created_at, name, email, password_hash],
                    |row| row.get::<_, i64>(0),
                )?;
                insert_grants(conn, id, &codes)?;
                if activate {
                    mark_activated(conn, id)?;
                }
                Ok(id)
            })
            .await?;

        let id = match inserted {
            Ok(id) => id,
            Err(e) if is_unique_violation(&e) => return Err(VaultError::DuplicateEmail),
            Err(e) => return Err(e.into()),
        };

        info!("Registered user {}", id);

        Ok(User {
            id,
            created_at,
            name: new.name,
            email: new.email,
            activated: activate,
            version: if activate { 2 } else { 1 },
        })
    }

    /// Look up a user by email and check the password
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let email = email.to_string();
        let found = self
            .db
            .call(move |conn| {
                conn.query_row(
                    "SELECT id, created_at, name, email, activated, version, password_hash \
                     FROM users WHERE email = ?1",
                    rusqlite::params![email],
                    |row| Ok((user_from_row(row)?, row.get::<_, String>(6)?)),
                )
                .optional()
            })
            .await?;

        let Some((user, phc)) = found else {
            debug!("Login attempt for unknown email");
            return Err(VaultError::InvalidCredentials);
        };

        let password = SecretString::new(password);
        let matches = tokio::task::spawn_blocking(move || verify_password(password.expose(), &phc))
            .await
            .map_err(|e| VaultError::Internal(format!("verification task failed: {}", e)))??;

        if !matches {
            debug!("Wrong password for user {}", user.id);
            return Err(VaultError::InvalidCredentials);
        }

        Ok(user)
    }

    pub async fn get(&self, id: i64) -> Result<User> {
        self.db
            .call(move |conn| {
                conn.query_row(
                    "SELECT id, created_at, name, email, activated, version FROM users WHERE id = ?1",
                    rusqlite::params![id],
                    user_from_row,
                )
                .optional()
            })
            .await?
            .ok_or(VaultError::NotFound)
    }

    /// Mark the account as activated
    pub async fn activate(&self, id: i64) -> Result<User> {
        let affected = self
            .db
            .call(move |conn| mark_activated(conn, id))
            .await?;

        if affected == 0 {
            return Err(VaultError::NotFound);
        }

        info!("Activated user {}", id);
        self.get(id).await
    }

    /// Replace the password hash
    pub async fn set_password(&self, id: i64, new_password: &str) -> Result<()> {
        self.replace_password(id, new_password, None).await.map(|_| ())
    }

    /// Replace the password hash and delete the user's `revoke` tokens in
    /// the same transaction. Returns how many tokens went.
    pub(crate) async fn replace_password(
        &self,
        id: i64,
        new_password: &str,
        revoke: Option<TokenScope>,
    ) -> Result<u64> {
        let mut v = ValidationErrors::new();
        validate_password(&mut v, new_password);
        v.into_result()?;

        let password_hash = hash_off_thread(SecretString::new(new_password), self.params).await?;

        let updated = self
            .db
            .call(move |conn| {
                let affected = conn.execute(
                    "UPDATE users SET password_hash = ?1, version = version + 1 WHERE id = ?2",
                    rusqlite::params![password_hash, id],
                )?;
                if affected == 0 {
                    return Ok(None);
                }
                match revoke {
                    Some(scope) => delete_tokens(conn, id, scope).map(Some),
                    None => Ok(Some(0)),
                }
            })
            .await?;

        let revoked = updated.ok_or(VaultError::NotFound)?;
        info!("Changed password for user {}", id);
        Ok(revoked)
    }
}
