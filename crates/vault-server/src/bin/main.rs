//! passvault server - multi-user password manager over HTTP
//!
//! The master key is read from `--master-key` or `PASSVAULT_MASTER_KEY` as 64
//! hex characters. It never touches the settings file.

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use vault_core::{MasterKey, SettingsManager, Vault, VaultSettings};
use vault_server::VaultServer;

/// passvault - encrypted credential storage behind bearer-token auth
#[derive(Parser, Debug)]
#[command(name = "passvault-server")]
#[command(version)]
#[command(about = "passvault - encrypted credential storage behind bearer-token auth")]
struct Args {
    /// Settings file (JSON); defaults apply when absent
    #[arg(long, env = "PASSVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Port for the HTTP server (overrides the settings file)
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database file (overrides the settings file)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Write the overrides above back to the settings file
    #[arg(long, requires = "config")]
    save_config: bool,

    /// 32-byte master key, hex encoded
    #[arg(long, env = "PASSVAULT_MASTER_KEY", hide_env_values = true)]
    master_key: String,
}

fn apply_overrides(settings: &mut VaultSettings, args: &Args) {
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(database) = &args.database {
        settings.database_path = Some(database.clone());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let settings = match &args.config {
        Some(path) => {
            let mut manager = SettingsManager::load(path)
                .map_err(|e| format!("Failed to load settings: {}", e))?;
            apply_overrides(manager.get_mut(), &args);
            if args.save_config {
                manager
                    .save()
                    .await
                    .map_err(|e| format!("Failed to save settings: {}", e))?;
                info!("Saved settings to {:?}", manager.path());
            }
            manager.into_settings()
        }
        None => {
            let mut settings = VaultSettings::default();
            apply_overrides(&mut settings, &args);
            settings.validate()?;
            settings
        }
    };

    let master_key = MasterKey::from_hex(&args.master_key)
        .map_err(|e| format!("Invalid master key: {}", e))?;

    let vault = Vault::open(&settings, master_key)
        .await
        .map_err(|e| format!("Failed to open vault: {}", e))?;

    // Clear tokens that expired while the server was down
    let purged = vault.tokens.purge_expired().await?;
    if purged > 0 {
        info!("Purged {} expired token(s)", purged);
    }

    let server = VaultServer::new(vault).with_cors_origins(settings.cors_origins.clone());
    server.run(settings.port).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0000000000000000000000000000000000000000000000000000000000000000";

    #[test]
    fn test_save_config_requires_config() {
        let parsed = Args::try_parse_from(["passvault-server", "--master-key", KEY, "--save-config"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let args = Args::try_parse_from([
            "passvault-server",
            "--master-key",
            KEY,
            "--config",
            "settings.json",
            "--port",
            "8081",
            "--database",
            "/tmp/vault.db",
            "--save-config",
        ])
        .unwrap();
        assert!(args.save_config);

        let mut settings = VaultSettings::default();
        apply_overrides(&mut settings, &args);
        assert_eq!(settings.port, 8081);
        assert_eq!(settings.database_path, Some(PathBuf::from("/tmp/vault.db")));
        assert!(settings.cors_origins.is_empty());
    }
}
