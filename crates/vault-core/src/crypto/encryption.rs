//! AES-256-GCM authenticated encryption of single secret fields
//!
//! Encryption format: `{iv_hex}:{auth_tag_hex}:{ciphertext_hex}`
//! - IV: 12 bytes (96 bits), fresh per call
//! - Auth tag: 16 bytes (128 bits)
//! - Ciphertext: same length as the plaintext
//!
//! Any decryption failure (wrong key, flipped bit, malformed text) is an
//! [`VaultError::Integrity`] error. Partial plaintext is never returned.

use std::fmt;
use std::str::FromStr;

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use rand::RngCore;

use super::MasterKey;
use crate::error::{Result, VaultError};

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// One sealed field, split into its three stored parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    pub iv: [u8; IV_LEN],
    pub auth_tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

impl fmt::Display for EncryptedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let iv = hex::encode(self.iv);
        let tag = hex::encode(self.auth_tag);
        let body = hex::encode(&self.ciphertext);
        write!(f, "{iv}:{tag}:{body}")
    }
}

fn decode_part<const N: usize>(part: &str, what: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(part)
        .map_err(|e| VaultError::Integrity(format!("{} is not hex: {}", what, e)))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| VaultError::Integrity(format!("{} must be {} bytes, got {}", what, N, len)))
}

impl FromStr for EncryptedData {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(':');
        let (Some(iv), Some(tag), Some(body), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(VaultError::Integrity(
                "sealed value must have the form iv:tag:ciphertext".to_string(),
            ));
        };

        Ok(Self {
            iv: decode_part(iv, "IV")?,
            auth_tag: decode_part(tag, "auth tag")?,
            ciphertext: hex::decode(body)
                .map_err(|e| VaultError::Integrity(format!("ciphertext is not hex: {}", e)))?,
        })
    }
}

fn cipher_for(key: &MasterKey) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::Config(format!("invalid master key: {}", e)))
}

/// Seal `plaintext` under a fresh random IV
pub fn encrypt(plaintext: &[u8], key: &MasterKey) -> Result<EncryptedData> {
    let cipher = cipher_for(key)?;

    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let mut ciphertext = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut ciphertext)
        .map_err(|e| VaultError::Internal(format!("encryption failed: {}", e)))?;

    let mut auth_tag = [0u8; TAG_LEN];
    auth_tag.copy_from_slice(tag.as_slice());

    Ok(EncryptedData {
        iv,
        auth_tag,
        ciphertext,
    })
}

/// Open a sealed value, checking its tag first
pub fn decrypt(encrypted: &EncryptedData, key: &MasterKey) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;

    let mut plaintext = encrypted.ciphertext.clone();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&encrypted.iv),
            b"",
            &mut plaintext,
            Tag::from_slice(&encrypted.auth_tag),
        )
        .map_err(|_| {
            VaultError::Integrity("authentication failed, wrong key or tampered data".to_string())
        })?;

    Ok(plaintext)
}

/// Seal a text field into its stored `iv:tag:ciphertext` form
pub fn encrypt_string(plaintext: &str, key: &MasterKey) -> Result<String> {
    Ok(encrypt(plaintext.as_bytes(), key)?.to_string())
}

/// Inverse of [`encrypt_string`]
pub fn decrypt_string(sealed: &str, key: &MasterKey) -> Result<String> {
    let plaintext = decrypt(&sealed.parse()?, key)?;
    String::from_utf8(plaintext)
        .map_err(|e| VaultError::Integrity(format!("plaintext is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> MasterKey {
        MasterKey::generate()
    }

    #[test]
    fn test_sealed_form_layout() {
        let key = test_key();
        let sealed = encrypt_string("asiap1234", &key).unwrap();

        let parts: Vec<&str> = sealed.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), IV_LEN * 2);
        assert_eq!(parts[1].len(), TAG_LEN * 2);
        assert_eq!(parts[2].len(), "asiap1234".len() * 2);
        assert_eq!(sealed.parse::<EncryptedData>().unwrap().to_string(), sealed);
    }

    #[test]
    fn test_roundtrip_across_length_bounds() {
        let key = test_key();

        for len in [8usize, 9, 64, 200, 254, 255] {
            let plaintext: String = "abcdefghijklmnopqrstuvwxyz0123456789"
                .chars()
                .cycle()
                .take(len)
                .collect();

            let encrypted = encrypt_string(&plaintext, &key).unwrap();
            assert_ne!(encrypted, plaintext);
            assert_eq!(decrypt_string(&encrypted, &key).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_multibyte_plaintext_roundtrip() {
        let key = test_key();
        let plaintext = "pässwörd-密码-🔑";

        let encrypted = encrypt_string(plaintext, &key).unwrap();
        assert_eq!(decrypt_string(&encrypted, &key).unwrap(), plaintext);
    }

    #[test]
    fn test_sealing_twice_differs() {
        let key = test_key();

        let first = encrypt(b"rabbithole", &key).unwrap();
        let second = encrypt(b"rabbithole", &key).unwrap();

        assert_ne!(first.iv, second.iv);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn test_wrong_key_is_integrity_failure() {
        let key1 = test_key();
        let key2 = test_key();

        let encrypted = encrypt_string("asiap1234", &key1).unwrap();
        let result = decrypt_string(&encrypted, &key2);

        assert!(matches!(result, Err(VaultError::Integrity(_))));
    }

    #[test]
    fn test_every_bit_flip_is_detected() {
        let key = test_key();
        let encrypted = encrypt(b"asiap1234", &key).unwrap();

        for byte in 0..encrypted.ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = encrypted.clone();
                tampered.ciphertext[byte] ^= 1 << bit;
                assert!(matches!(
                    decrypt(&tampered, &key),
                    Err(VaultError::Integrity(_))
                ));
            }
        }

        for byte in 0..TAG_LEN {
            let mut tampered = encrypted.clone();
            tampered.auth_tag[byte] ^= 0x01;
            assert!(matches!(
                decrypt(&tampered, &key),
                Err(VaultError::Integrity(_))
            ));
        }

        for byte in 0..IV_LEN {
            let mut tampered = encrypted.clone();
            tampered.iv[byte] ^= 0x80;
            assert!(matches!(
                decrypt(&tampered, &key),
                Err(VaultError::Integrity(_))
            ));
        }
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let key = test_key();
        let mut encrypted = encrypt(b"asiap1234", &key).unwrap();
        encrypted.ciphertext.pop();

        assert!(matches!(
            decrypt(&encrypted, &key),
            Err(VaultError::Integrity(_))
        ));
    }

    #[test]
    fn test_malformed_sealed_values() {
        for bad in ["invalid", "a:b", "a:b:c:d", "not_hex:not_hex:not_hex", "00:00:00"] {
            assert!(matches!(
                bad.parse::<EncryptedData>(),
                Err(VaultError::Integrity(_))
            ));
        }
        assert!(matches!(
            decrypt_string("00:00:00", &test_key()),
            Err(VaultError::Integrity(_))
        ));
    }
}
