//! Master-key lifecycle and authenticated encryption for stored secrets.
//!
//! Every secret Airlock persists (credential values, profile key secrets) is
//! sealed with AES-256-GCM under a single process-wide master key. The at-rest
//! layout of a sealed value is one opaque blob: `nonce (12B) ‖ ciphertext ‖
//! tag (16B)`. Decryption fails closed on any modification of nonce,
//! ciphertext, or tag.

use std::fmt;
use std::path::Path;

use aes_gcm::{
    aead::{rand_core::RngCore as _, Aead, KeyInit, OsRng},
    Aes256Gcm, Key,
};
use thiserror::Error;

/// Length of the master key in bytes.
pub const MASTER_KEY_BYTES: usize = 32;
/// Length of the random AES-GCM nonce prefixed to every sealed blob.
pub const NONCE_BYTES: usize = 12;
/// Length of the AES-GCM authentication tag appended to every sealed blob.
pub const TAG_BYTES: usize = 16;

const MASTER_KEY_FILE_MODE: u32 = 0o600;

/// Fills `buf` from the OS CSPRNG. All random material in Airlock (master
/// key, nonces, profile key ids and secrets) comes through here.
pub fn fill_random(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
}

/// Typed failures of the crypto layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The blob failed authenticated decryption: tampered, truncated, or
    /// sealed under a different key.
    #[error("ciphertext integrity check failed")]
    BadCiphertext,
    /// The key file exists but does not hold exactly 32 bytes.
    #[error("master key file is corrupt: expected {MASTER_KEY_BYTES} bytes, found {actual_len}")]
    KeyFileCorrupt { actual_len: usize },
    /// The key file does not exist (strict load only).
    #[error("master key file is missing")]
    KeyFileMissing,
    /// Sealing failed inside the AEAD; only reachable on absurd input sizes.
    #[error("payload encryption failed")]
    EncryptFailed,
    #[error("master key file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The process-wide 32-byte encryption key. Read-only after startup.
///
/// `Debug` and `Display` never reveal key material.
#[derive(Clone)]
pub struct MasterKey([u8; MASTER_KEY_BYTES]);

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

impl MasterKey {
    /// Loads the key from `path`, generating and persisting a fresh one when
    /// the file does not exist. The file is written with owner-only
    /// permissions (0600 on unix).
    ///
    /// Loss of this file renders every sealed value unrecoverable; there is
    /// no recovery path by design.
    pub fn load_or_create(path: &Path) -> Result<Self, CryptoError> {
        match Self::load(path) {
            Ok(key) => {
                tracing::debug!(key_file = %path.display(), "loaded existing master key");
                Ok(key)
            }
            Err(CryptoError::KeyFileMissing) => {
                let key = Self::generate();
                key.persist(path)?;
                tracing::info!(key_file = %path.display(), "generated new master key");
                Ok(key)
            }
            Err(error) => Err(error),
        }
    }

    /// Loads the key from `path`, failing with `KeyFileMissing` when absent.
    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(CryptoError::KeyFileMissing);
            }
            Err(error) => return Err(CryptoError::Io(error)),
        };
        let bytes: [u8; MASTER_KEY_BYTES] = raw
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::KeyFileCorrupt {
                actual_len: raw.len(),
            })?;
        Ok(Self(bytes))
    }

    fn generate() -> Self {
        let mut bytes = [0u8; MASTER_KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn persist(&self, path: &Path) -> Result<(), CryptoError> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.0)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(
                path,
                std::fs::Permissions::from_mode(MASTER_KEY_FILE_MODE),
            )?;
        }
        Ok(())
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }

    /// Seals `plaintext` under this key with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher()
            .encrypt((&nonce).into(), plaintext)
            .map_err(|_| CryptoError::EncryptFailed)?;
        let mut blob = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Opens a sealed blob, failing closed on any tampering.
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if blob.len() < NONCE_BYTES + TAG_BYTES {
            return Err(CryptoError::BadCiphertext);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_BYTES);
        self.cipher()
            .decrypt(nonce.into(), ciphertext)
            .map_err(|_| CryptoError::BadCiphertext)
    }

    /// Convenience wrapper for sealing UTF-8 strings.
    pub fn encrypt_str(&self, plaintext: &str) -> Result<Vec<u8>, CryptoError> {
        self.encrypt(plaintext.as_bytes())
    }

    /// Convenience wrapper for opening blobs that must hold UTF-8.
    pub fn decrypt_str(&self, blob: &[u8]) -> Result<String, CryptoError> {
        let plaintext = self.decrypt(blob)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::BadCiphertext)
    }
}
