//! At-rest encryption of the document and one-way hashing of secrets.
//!
//! ## Security Model
//!
//! - The serialized document is sealed with AES-256-GCM as one blob
//! - A fresh random nonce per save, stored in front of the ciphertext
//! - The key is derived from the configured passphrase with HKDF-SHA256
//! - Keys are zeroized on drop
//!
//! API-key secrets and user passwords are never stored in clear; they are
//! replaced by their SHA-256 digest.

mod cipher;

pub use cipher::{DocumentCipher, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Returns the lowercase hex SHA-256 digest of `value`.
#[must_use]
pub fn sha256_hex(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Returns true if `value` already looks like a [`sha256_hex`] digest.
#[must_use]
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
