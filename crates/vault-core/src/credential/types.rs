//! Credential type definitions

use chrono::{DateTime, Utc};

use crate::crypto::SecretString;
use crate::error::{Result, ValidationErrors};

/// Maximum byte length of any stored text field
pub const MAX_FIELD_BYTES: usize = 255;

/// Minimum byte length of a credential password
pub const MIN_PASSWORD_BYTES: usize = 8;

/// A stored login with its password decrypted.
///
/// Only [`CredentialStore`](super::CredentialStore) produces these; the
/// ciphertext form never leaves the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Assigned at insert, immutable
    pub id: i64,

    /// The user that exclusively owns this record
    pub owner_id: i64,

    /// Server clock at insert
    pub created_at: DateTime<Utc>,

    /// Display name (e.g., "Reddit")
    pub name: String,

    /// Account username at the site
    pub username: String,

    /// Plaintext password
    pub password: SecretString,

    /// Site URL, if any
    pub website: Option<String>,

    /// Bumped by exactly one on every successful update
    pub version: i32,
}

/// Fields supplied when creating a credential
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub name: String,
    pub username: String,
    pub password: SecretString,
    pub website: Option<String>,
}

impl NewCredential {
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        website: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            username: username.into(),
            password: SecretString::new(password),
            website,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_fields(
            &self.name,
            &self.username,
            self.password.expose(),
            self.website.as_deref(),
        )
        .into_result()
    }
}

/// Partial update merged into a loaded record.
///
/// `website: Some(None)` clears the website; `None` leaves it untouched.
#[derive(Debug, Clone, Default)]
pub struct CredentialPatch {
    pub name: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub website: Option<Option<String>>,
}

impl Credential {
    /// Merge a partial update into this in-memory record
    pub fn apply(&mut self, patch: CredentialPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(username) = patch.username {
            self.username = username;
        }
        if let Some(password) = patch.password {
            self.password = password;
        }
        if let Some(website) = patch.website {
            self.website = website;
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_fields(
            &self.name,
            &self.username,
            self.password.expose(),
            self.website.as_deref(),
        )
        .into_result()
    }
}

fn validate_fields(
    name: &str,
    username: &str,
    password: &str,
    website: Option<&str>,
) -> ValidationErrors {
    let mut v = ValidationErrors::new();

    v.check(!name.is_empty(), "name", "must be provided");
    v.check(
        name.len() <= MAX_FIELD_BYTES,
        "name",
        "must not be more than 255 bytes long",
    );

    v.check(!username.is_empty(), "username", "must be provided");
    v.check(
        username.len() <= MAX_FIELD_BYTES,
        "username",
        "must not be more than 255 bytes long",
    );

    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() <= MAX_FIELD_BYTES,
        "password",
        "must not be more than 255 bytes long",
    );
    v.check(
        password.len() >= MIN_PASSWORD_BYTES,
        "password",
        "must be at least 8 bytes long",
    );

    if let Some(website) = website {
        v.check(
            website.len() <= MAX_FIELD_BYTES,
            "website",
            "must not be more than 255 bytes long",
        );
        let parsed = url::Url::parse(website);
        v.check(
            matches!(&parsed, Ok(u) if matches!(u.scheme(), "http" | "https") && u.has_host()),
            "website",
            "must be an absolute http or https URL",
        );
    }

    v
}
