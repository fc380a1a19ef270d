//! AES-256-GCM sealing of the serialized document.

use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// HKDF salt; the passphrase carries the entropy.
const KDF_SALT: &[u8] = b"fleetstore-document-salt";
/// HKDF info string binding the key to its purpose.
const KDF_INFO: &[u8] = b"fleetstore-document-key-v1";
/// Associated data authenticated with every sealed document.
const DOCUMENT_AAD: &[u8] = b"fleetstore-document-v1";

/// Encryption key for AES-256-GCM.
///
/// The key is automatically zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random encryption key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CoreError::invalid_key_size(bytes.len(), KEY_SIZE));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Derives a key from a passphrase using HKDF-SHA256.
    ///
    /// The same passphrase always yields the same key, which is what lets a
    /// restarted process open the document it sealed earlier.
    ///
    /// # Errors
    ///
    /// Returns an error if the passphrase is empty or expansion fails.
    pub fn from_passphrase(passphrase: &str) -> CoreResult<Self> {
        if passphrase.is_empty() {
            return Err(CoreError::key_derivation_failed("empty passphrase"));
        }

        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), passphrase.as_bytes());
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(KDF_INFO, &mut bytes)
            .map_err(|_| CoreError::key_derivation_failed("HKDF expand failed"))?;

        Ok(Self { bytes })
    }

    /// Returns the key as a byte slice.
    ///
    /// # Security
    ///
    /// Don't log or serialize the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Seals and opens serialized documents.
///
/// Sealed layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
pub struct DocumentCipher {
    cipher: Aes256Gcm,
}

impl DocumentCipher {
    /// Creates a cipher with the given key.
    #[must_use]
    pub fn new(key: &EncryptionKey) -> Self {
        let key_array = GenericArray::from_slice(key.as_bytes());
        Self {
            cipher: Aes256Gcm::new(key_array),
        }
    }

    /// Creates a cipher from a passphrase.
    ///
    /// # Errors
    ///
    /// Returns an error if key derivation fails.
    pub fn from_passphrase(passphrase: &str) -> CoreResult<Self> {
        let key = EncryptionKey::from_passphrase(passphrase)?;
        Ok(Self::new(&key))
    }

    /// Seals a serialized document.
    ///
    /// # Errors
    ///
    /// Returns an error if the AEAD operation fails.
    pub fn seal(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let payload = Payload {
            msg: plaintext,
            aad: DOCUMENT_AAD,
        };
        let ciphertext = self
            .cipher
            .encrypt(nonce, payload)
            .map_err(|_| CoreError::encryption_failed("AES-GCM seal failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);
        Ok(sealed)
    }

    /// Opens a document sealed with [`seal`](Self::seal).
    ///
    /// # Errors
    ///
    /// Returns an error if the data is too short, was sealed with another key
    /// or has been tampered with.
    pub fn open(&self, sealed: &[u8]) -> CoreResult<Vec<u8>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CoreError::decryption_failed("ciphertext too short"));
        }

        let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
        let payload = Payload {
            msg: &sealed[NONCE_SIZE..],
            aad: DOCUMENT_AAD,
        };
        self.cipher
            .decrypt(nonce, payload)
            .map_err(|_| CoreError::decryption_failed("wrong key or corrupted document"))
    }
}

impl std::fmt::Debug for DocumentCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentCipher")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}
