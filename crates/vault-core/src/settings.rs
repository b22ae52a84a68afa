//! Deployment settings
//!
//! Stored as a plain JSON file. The master key is deliberately not part of
//! the settings; it is supplied separately at startup.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, VaultError};
use crate::token::MAX_TOKEN_TTL;

const DATABASE_FILE: &str = "passvault.db";

/// Vault and server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VaultSettings {
    /// Settings file version
    pub version: u32,
    /// SQLite database file (defaults to the platform data directory)
    pub database_path: Option<PathBuf>,
    /// Upper bound on any single database call, in milliseconds
    pub query_timeout_ms: u64,
    /// Lifetime of authentication tokens, in seconds
    pub auth_token_ttl_secs: u64,
    /// HTTP listen port
    pub port: u16,
    /// Allowed CORS origins (empty = any)
    pub cors_origins: Vec<String>,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            version: 1,
            database_path: None,
            query_timeout_ms: 3_000,
            auth_token_ttl_secs: 24 * 60 * 60,
            port: 4000,
            cors_origins: Vec::new(),
        }
    }
}

impl VaultSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn auth_token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth_token_ttl_secs)
    }

    /// The configured database path, or the platform default
    pub fn effective_database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => default_database_path(),
        }
    }

    /// Reject values that would make the vault unusable
    pub fn validate(&self) -> Result<()> {
        if self.query_timeout_ms == 0 {
            return Err(VaultError::Config(
                "queryTimeoutMs must be greater than zero".to_string(),
            ));
        }
        if self.auth_token_ttl_secs == 0 {
            return Err(VaultError::Config(
                "authTokenTtlSecs must be greater than zero".to_string(),
            ));
        }
        if self.auth_token_ttl_secs > MAX_TOKEN_TTL.as_secs() {
            return Err(VaultError::Config(format!(
                "authTokenTtlSecs must not exceed {}",
                MAX_TOKEN_TTL.as_secs()
            )));
        }
        Ok(())
    }
}

/// `<data dir>/passvault.db` for the current platform
pub fn default_database_path() -> Result<PathBuf> {
    ProjectDirs::from("io", "passvault", "passvault")
        .map(|dirs| dirs.data_dir().join(DATABASE_FILE))
        .ok_or_else(|| VaultError::Config("could not determine data directory".to_string()))
}

/// Loads and saves [`VaultSettings`]
pub struct SettingsManager {
    settings_file: PathBuf,
    settings: VaultSettings,
}

impl SettingsManager {
    /// Load settings from `path`, falling back to defaults if it is absent
    pub fn load(path: &Path) -> Result<Self> {
        let settings = Self::load_from_file(path)?;
        settings.validate()?;

        Ok(Self {
            settings_file: path.to_path_buf(),
            settings,
        })
    }

    fn load_from_file(path: &Path) -> Result<VaultSettings> {
        if !path.exists() {
            debug!("No settings file at {:?}, using defaults", path);
            return Ok(VaultSettings::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: VaultSettings = serde_json::from_str(&contents)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file. Invalid settings are never written.
    pub async fn save(&self) -> Result<()> {
        self.settings.validate()?;
        let contents = serde_json::to_string_pretty(&self.settings)?;

        // Write atomically using temp file
        let temp_path = self.settings_file.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &self.settings_file).await?;

        debug!("Saved settings to {:?}", self.settings_file);
        Ok(())
    }

    pub fn get(&self) -> &VaultSettings {
        &self.settings
    }

    /// Path the settings are saved to
    pub fn path(&self) -> &Path {
        &self.settings_file
    }

    pub fn get_mut(&mut self) -> &mut VaultSettings {
        &mut self.settings
    }

    pub fn into_settings(self) -> VaultSettings {
        self.settings
    }
}
