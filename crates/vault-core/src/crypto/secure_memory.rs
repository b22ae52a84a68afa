//! Key and plaintext holders that wipe themselves on drop

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Deserializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, VaultError};

/// Required master key length in bytes (AES-256)
pub const MASTER_KEY_LEN: usize = 32;

/// Deployment master key - automatically zeroed when dropped
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; MASTER_KEY_LEN],
}

impl MasterKey {
    pub fn new(key: [u8; MASTER_KEY_LEN]) -> Self {
        Self { key }
    }

    /// Generate a random key from the OS CSPRNG
    pub fn generate() -> Self {
        let mut key = [0u8; MASTER_KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.key
    }

    /// `None` unless `slice` is exactly [`MASTER_KEY_LEN`] bytes
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let key: [u8; MASTER_KEY_LEN] = slice.try_into().ok()?;
        Some(Self { key })
    }

    /// Parse a hex-encoded key.
    ///
    /// Anything but exactly 64 hex characters is a fatal configuration error.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let mut bytes = hex::decode(encoded.trim())
            .map_err(|e| VaultError::Config(format!("master key is not valid hex: {}", e)))?;

        let key = Self::from_slice(&bytes);
        bytes.zeroize();

        key.ok_or_else(|| {
            VaultError::Config(format!(
                "master key must be exactly {} bytes ({} hex characters)",
                MASTER_KEY_LEN,
                MASTER_KEY_LEN * 2
            ))
        })
    }
}

impl Clone for MasterKey {
    fn clone(&self) -> Self {
        Self::new(self.key)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// A plaintext password held only as long as a request needs it
#[derive(Clone, Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretString::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_key_slice_length() {
        assert_eq!(MasterKey::from_slice(&[7u8; 32]).unwrap().as_bytes(), &[7u8; 32]);
        assert!(MasterKey::from_slice(&[7u8; 16]).is_none());
        assert!(MasterKey::from_slice(&[7u8; 33]).is_none());
    }

    #[test]
    fn test_master_key_from_hex() {
        let encoded = "2a".repeat(32);
        let key = MasterKey::from_hex(&encoded).unwrap();
        assert_eq!(key.as_bytes(), &[42u8; 32]);
    }

    #[test]
    fn test_master_key_wrong_length_is_config_error() {
        let short = "2a".repeat(16);
        assert!(matches!(
            MasterKey::from_hex(&short),
            Err(VaultError::Config(_))
        ));
        assert!(matches!(
            MasterKey::from_hex("not-hex"),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn test_generated_keys_differ() {
        assert_ne!(
            MasterKey::generate().as_bytes(),
            MasterKey::generate().as_bytes()
        );
    }

    #[test]
    fn test_secret_string_expose() {
        let secret = SecretString::new(String::from("rabbithole"));
        assert_eq!(secret.expose(), "rabbithole");
        assert_eq!(secret.clone(), secret);
    }

    #[test]
    fn test_debug_redacted() {
        let key = MasterKey::new([0xAB; 32]);
        let debug = format!("{:?}", key);
        assert_eq!(debug, "MasterKey([REDACTED])");

        let secret = SecretString::new("asiap1234");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
    }

    #[test]
    fn test_secret_string_from_json() {
        let secret: SecretString = serde_json::from_str(r#""asiap1234""#).unwrap();
        assert_eq!(secret.expose(), "asiap1234");
        assert!(serde_json::from_str::<SecretString>("1234").is_err());
    }
}
