//! p.file Vault - Key Management
//!
//! Owns the single active encryption key for a session: loads it from
//! storage, generates and persists one on first use, exports and imports it.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use super::aead::CipherMethod;
use crate::error::{VaultError, VaultResult};
use crate::storage::{StorageBackend, KEY_NAMESPACE};

/// Key length for AES-256 / XChaCha20
pub const KEY_LEN: usize = 32;

/// Nonce length for AES-GCM
pub const NONCE_LEN: usize = 12;

/// Nonce length for XChaCha20
pub const XCHACHA_NONCE_LEN: usize = 24;

/// Suggested file name for an exported key bundle
pub const KEY_EXPORT_FILE_NAME: &str = "pfile-encryption-key.json";

/// Warning shipped inside every exported key bundle
pub const KEY_EXPORT_WARNING: &str =
    "Keep this key safe! Without it, you cannot decrypt your photos.";

/// Secret 256-bit key, printable as 64 hex characters
pub struct EncryptionKey {
    inner: Secret<[u8; KEY_LEN]>,
}

impl EncryptionKey {
    /// Create a key from raw bytes
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            inner: Secret::new(bytes),
        }
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.inner.expose_secret()
    }

    /// Generate a fresh key from the OS CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        let key = Self::new(bytes);
        bytes.zeroize();
        key
    }

    /// Printable form of the key
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.expose()))
    }

    /// Parse the printable form produced by [`EncryptionKey::to_hex`]
    pub fn from_hex(text: &str) -> VaultResult<Self> {
        let text = text.trim();
        if text.len() != KEY_LEN * 2 {
            return Err(VaultError::InvalidKey(format!(
                "expected {} hex characters, got {}",
                KEY_LEN * 2,
                text.len()
            )));
        }

        let decoded = Zeroizing::new(
            hex::decode(text).map_err(|e| VaultError::InvalidKey(e.to_string()))?,
        );
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        let key = Self::new(bytes);
        bytes.zeroize();
        Ok(key)
    }

    /// Compare two keys without exposing either
    pub fn same_as(&self, other: &EncryptionKey) -> bool {
        self.expose()
            .iter()
            .zip(other.expose().iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// Where the active key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    /// Loaded from durable storage
    Persisted,
    /// Generated this session and written to storage
    Generated,
    /// Restored from an exported bundle
    Imported,
    /// Generated this session, storage unavailable; lost on exit
    Ephemeral,
}

/// Exported key document: `{key, method, exportDate, warning}`
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyBundle {
    pub key: String,
    pub method: CipherMethod,
    #[serde(rename = "exportDate")]
    pub exported_at: DateTime<Utc>,
    pub warning: String,
}

impl KeyBundle {
    /// Pretty JSON, as written to the export file
    pub fn to_json(&self) -> VaultResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse an exported bundle
    pub fn from_json(text: &str) -> VaultResult<Self> {
        serde_json::from_str(text).map_err(|e| VaultError::InvalidKey(e.to_string()))
    }

    /// Decode the key carried by this bundle
    pub fn encryption_key(&self) -> VaultResult<EncryptionKey> {
        EncryptionKey::from_hex(&self.key)
    }
}

impl fmt::Debug for KeyBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBundle")
            .field("key", &"[REDACTED]")
            .field("method", &self.method)
            .field("exported_at", &self.exported_at)
            .finish()
    }
}

impl Drop for KeyBundle {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Key Manager
///
/// Holds exactly one active key. The key is never rotated automatically;
/// replacing it only happens through [`KeyManager::import`].
pub struct KeyManager {
    storage: Arc<dyn StorageBackend>,
    key: EncryptionKey,
    origin: KeyOrigin,
}

impl KeyManager {
    /// Load the persisted key, or generate and persist a fresh one.
    ///
    /// An unreadable or unwritable store degrades to an ephemeral key. A
    /// persisted key that cannot be parsed is an error: replacing it would
    /// orphan every stored photo.
    pub fn load_or_generate(storage: Arc<dyn StorageBackend>) -> VaultResult<Self> {
        match storage.read(KEY_NAMESPACE) {
            Ok(Some(bytes)) => {
                let text = Zeroizing::new(String::from_utf8(bytes).map_err(|_| {
                    VaultError::InvalidKey("persisted key is not valid UTF-8".into())
                })?);
                let key = EncryptionKey::from_hex(&text)?;
                log::debug!("Loaded persisted encryption key");
                Ok(Self {
                    storage,
                    key,
                    origin: KeyOrigin::Persisted,
                })
            }
            Ok(None) => {
                let key = EncryptionKey::generate();
                let origin = match storage.write(KEY_NAMESPACE, key.to_hex().as_bytes()) {
                    Ok(()) => {
                        log::info!("Generated and persisted a new encryption key");
                        KeyOrigin::Generated
                    }
                    Err(e) => {
                        log::warn!(
                            "Could not persist new encryption key ({}); it will be lost when this session ends",
                            e
                        );
                        KeyOrigin::Ephemeral
                    }
                };
                Ok(Self {
                    storage,
                    key,
                    origin,
                })
            }
            Err(e) => {
                log::warn!(
                    "Key storage unavailable ({}); using an ephemeral key, previously stored photos cannot be decrypted",
                    e
                );
                Ok(Self {
                    storage,
                    key: EncryptionKey::generate(),
                    origin: KeyOrigin::Ephemeral,
                })
            }
        }
    }

    /// The active key
    pub fn active_key(&self) -> &EncryptionKey {
        &self.key
    }

    /// Where the active key came from
    pub fn origin(&self) -> KeyOrigin {
        self.origin
    }

    /// True when the active key only lives in this process
    pub fn is_ephemeral(&self) -> bool {
        self.origin == KeyOrigin::Ephemeral
    }

    /// Produce the export payload. The caller decides where it goes.
    pub fn export_key(&self, method: CipherMethod) -> KeyBundle {
        KeyBundle {
            key: self.key.to_hex().to_string(),
            method,
            exported_at: Utc::now(),
            warning: KEY_EXPORT_WARNING.to_string(),
        }
    }

    /// Persist `key` and make it active. Storage is written first; on failure
    /// the previous key stays active.
    pub fn import(&mut self, key: EncryptionKey) -> VaultResult<()> {
        self.storage.write(KEY_NAMESPACE, key.to_hex().as_bytes())?;
        self.key = key;
        self.origin = KeyOrigin::Imported;
        log::info!("Imported encryption key is now active");
        Ok(())
    }
}

/// Generate a random nonce for AES-GCM
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Generate a random nonce for XChaCha20
pub fn generate_xchacha_nonce() -> [u8; XCHACHA_NONCE_LEN] {
    let mut nonce = [0u8; XCHACHA_NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_key_hex_roundtrip() {
        let key = EncryptionKey::generate();
        let hex = key.to_hex();
        assert_eq!(hex.len(), 64);

        let parsed = EncryptionKey::from_hex(&hex).unwrap();
        assert!(parsed.same_as(&key));
        assert!(!EncryptionKey::generate().same_as(&key));
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(matches!(
            EncryptionKey::from_hex("abcd"),
            Err(VaultError::InvalidKey(_))
        ));
        let not_hex = "z".repeat(64);
        assert!(matches!(
            EncryptionKey::from_hex(&not_hex),
            Err(VaultError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_generates_once_then_loads() {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());

        let first = KeyManager::load_or_generate(Arc::clone(&storage)).unwrap();
        assert_eq!(first.origin(), KeyOrigin::Generated);
        assert!(storage.read(KEY_NAMESPACE).unwrap().is_some());

        let second = KeyManager::load_or_generate(Arc::clone(&storage)).unwrap();
        assert_eq!(second.origin(), KeyOrigin::Persisted);
        assert!(second.active_key().same_as(first.active_key()));
    }

    #[test]
    fn test_unavailable_storage_falls_back_to_ephemeral() {
        let storage = Arc::new(MemoryStorage::unavailable());
        let km = KeyManager::load_or_generate(storage).unwrap();
        assert!(km.is_ephemeral());
    }

    #[test]
    fn test_failed_write_on_generation_is_ephemeral() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_simulate_write_error(true);
        let km = KeyManager::load_or_generate(storage).unwrap();
        assert_eq!(km.origin(), KeyOrigin::Ephemeral);
    }

    #[test]
    fn test_corrupt_persisted_key_is_an_error() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write(KEY_NAMESPACE, b"not-a-key").unwrap();
        assert!(matches!(
            KeyManager::load_or_generate(storage),
            Err(VaultError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_export_bundle_shape() {
        let storage = Arc::new(MemoryStorage::new());
        let km = KeyManager::load_or_generate(storage).unwrap();
        let bundle = km.export_key(CipherMethod::Aes256Gcm);

        let json: serde_json::Value = serde_json::from_str(&bundle.to_json().unwrap()).unwrap();
        assert_eq!(json["key"].as_str().unwrap().len(), 64);
        assert_eq!(json["method"], "aes256");
        assert!(json["exportDate"].is_string());
        assert_eq!(json["warning"], KEY_EXPORT_WARNING);

        let parsed = KeyBundle::from_json(&bundle.to_json().unwrap()).unwrap();
        assert!(parsed.encryption_key().unwrap().same_as(km.active_key()));
    }

    #[test]
    fn test_import_persists_new_key() {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        let mut km = KeyManager::load_or_generate(Arc::clone(&storage)).unwrap();

        let replacement = EncryptionKey::generate();
        let expected = replacement.to_hex();
        km.import(replacement).unwrap();

        assert_eq!(km.origin(), KeyOrigin::Imported);
        let reloaded = KeyManager::load_or_generate(storage).unwrap();
        assert_eq!(*reloaded.active_key().to_hex(), *expected);
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = EncryptionKey::generate();
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains(key.to_hex().as_str()));
    }
}
