//! Cryptographic primitives for the vault
//!
//! This module provides:
//! - AES-256-GCM authenticated encryption of secret fields
//! - Argon2id hashing of user passwords
//! - Secure memory handling with zeroize

mod encryption;
mod password;
mod secure_memory;

pub use encryption::{decrypt, decrypt_string, encrypt, encrypt_string, EncryptedData};
pub use password::{hash_password, verify_password, PasswordHashParams};
pub use secure_memory::{MasterKey, SecretString, MASTER_KEY_LEN};
