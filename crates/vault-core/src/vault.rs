//! Main vault orchestration

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::credential::CredentialStore;
use crate::crypto::{MasterKey, PasswordHashParams};
use crate::error::Result;
use crate::gate::AccessGate;
use crate::permission::{PermissionCode, PermissionRegistry};
use crate::settings::VaultSettings;
use crate::storage::{Database, DEFAULT_QUERY_TIMEOUT};
use crate::token::{IssuedToken, TokenAuthenticator, TokenScope};
use crate::user::{NewUser, User, UserStore};

/// Wires every vault component to one database and one master key
pub struct Vault {
    /// User accounts
    pub users: UserStore,
    /// Bearer token issuance and validation
    pub tokens: Arc<TokenAuthenticator>,
    /// Permission grants
    pub permissions: Arc<PermissionRegistry>,
    /// Owner-scoped credential records
    pub credentials: CredentialStore,
    db: Database,
    gate: AccessGate,
    auth_token_ttl: Duration,
}

impl Vault {
    /// Open the database named by `settings` and build the vault around it
    pub async fn open(settings: &VaultSettings, master_key: MasterKey) -> Result<Self> {
        settings.validate()?;

        let path = settings.effective_database_path()?;
        let db = Database::open(&path, settings.query_timeout()).await?;

        info!("Vault opened at {:?}", path);
        Ok(Self::with_database(db, master_key, settings.auth_token_ttl()))
    }

    /// A vault backed by a private in-memory database
    pub async fn open_in_memory(master_key: MasterKey) -> Result<Self> {
        let db = Database::open_in_memory(DEFAULT_QUERY_TIMEOUT).await?;
        let ttl = VaultSettings::default().auth_token_ttl();
        Ok(Self::with_database(db, master_key, ttl))
    }

    /// Build the vault on an already-open database
    pub fn with_database(db: Database, master_key: MasterKey, auth_token_ttl: Duration) -> Self {
        let master_key = Arc::new(master_key);
        let tokens = Arc::new(TokenAuthenticator::new(db.clone()));
        let permissions = Arc::new(PermissionRegistry::new(db.clone()));

        Self {
            users: UserStore::new(db.clone(), PasswordHashParams::default()),
            gate: AccessGate::new(tokens.clone(), permissions.clone()),
            credentials: CredentialStore::new(db.clone(), master_key),
            tokens,
            permissions,
            db,
            auth_token_ttl,
        }
    }

    /// Override the Argon2 cost parameters for user passwords
    pub fn with_password_params(mut self, params: PasswordHashParams) -> Self {
        self.users = UserStore::new(self.db.clone(), params);
        self
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn auth_token_ttl(&self) -> Duration {
        self.auth_token_ttl
    }

    /// Register an activated user holding the default credential
    /// permissions. Nothing is stored unless every step succeeds.
    pub async fn register_user(&self, new: NewUser) -> Result<User> {
        let user = self
            .users
            .register_activated(new, &PermissionCode::DEFAULTS)
            .await?;

        info!("User {} registered and activated", user.id);
        Ok(user)
    }

    /// Check email and password, then issue an authentication token
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedToken> {
        let user = self.users.authenticate(email, password).await?;
        self.tokens
            .issue(user.id, TokenScope::Authentication, self.auth_token_ttl)
            .await
    }

    /// Invalidate every authentication token of `user_id`
    pub async fn logout(&self, user_id: i64) -> Result<u64> {
        self.tokens.revoke(user_id, TokenScope::Authentication).await
    }

    /// Change a password after confirming the current one. All existing
    /// sessions are revoked together with the password swap.
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let user = self.users.get(user_id).await?;
        self.users.authenticate(&user.email, current_password).await?;
        let revoked = self
            .users
            .replace_password(user_id, new_password, Some(TokenScope::Authentication))
            .await?;

        info!(
            "Password changed for user {}, revoked {} session(s)",
            user_id, revoked
        );
        Ok(())
    }
}
