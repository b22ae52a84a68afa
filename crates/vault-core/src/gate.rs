//! Per-request access control
//!
//! Identity is established from the bearer token first, then the required
//! permission is checked. [`Authenticated`] only proves identity; an
//! [`Authorized`] value additionally proves a permission check passed. Neither
//! can be constructed outside this module.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, VaultError};
use crate::permission::{PermissionCode, PermissionRegistry};
use crate::token::{TokenAuthenticator, TokenScope};

/// Proof that a request carried a valid authentication token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authenticated {
    user_id: i64,
}

impl Authenticated {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }
}

/// Proof that a request passed authentication and authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorized {
    user_id: i64,
}

impl Authorized {
    /// The authenticated owner id
    pub fn user_id(&self) -> i64 {
        self.user_id
    }
}

/// Strip the `Bearer ` prefix from an `Authorization` header value
pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Authenticate-then-authorize gate in front of the credential store
#[derive(Clone)]
pub struct AccessGate {
    tokens: Arc<TokenAuthenticator>,
    permissions: Arc<PermissionRegistry>,
}

impl AccessGate {
    pub fn new(tokens: Arc<TokenAuthenticator>, permissions: Arc<PermissionRegistry>) -> Self {
        Self {
            tokens,
            permissions,
        }
    }

    /// Resolve the caller's identity without checking any permission
    pub async fn authenticate(&self, bearer: Option<&str>) -> Result<Authenticated> {
        let token = bearer.ok_or(VaultError::Unauthenticated)?;

        match self.tokens.validate(token, TokenScope::Authentication).await {
            Ok(user_id) => Ok(Authenticated { user_id }),
            Err(e) if e.is_auth_failure() => {
                debug!("Rejected bearer token: {}", e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Authenticate the bearer token, then require `code`
    pub async fn authorize(&self, bearer: Option<&str>, code: PermissionCode) -> Result<Authorized> {
        let identity = self.authenticate(bearer).await?;

        if !self.permissions.has(identity.user_id, code).await? {
            warn!("User {} lacks permission {}", identity.user_id, code);
            return Err(VaultError::Unauthorized);
        }

        Ok(Authorized {
            user_id: identity.user_id,
        })
    }
}
