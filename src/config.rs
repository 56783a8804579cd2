//! p.file Vault - Configuration and Settings
//!
//! `StoreConfig` is fixed for a process (where the vault lives, thumbnail
//! parameters, quota). `Settings` are user preferences persisted inside the
//! vault next to the catalog.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::CipherMethod;
use crate::error::{VaultError, VaultResult};
use crate::storage::{StorageBackend, SETTINGS_NAMESPACE};
use crate::thumbs::{DEFAULT_MAX_DIMENSION, DEFAULT_QUALITY};

/// Total capacity shown in quota displays (6 GiB)
pub const DEFAULT_CAPACITY_BYTES: u64 = 6 * 1024 * 1024 * 1024;

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Vault root directory
    pub vault_path: PathBuf,
    /// Longer edge of generated thumbnails
    pub thumb_max_dimension: u32,
    /// JPEG quality of generated thumbnails, 1-100
    pub thumb_quality: u8,
    /// Capacity used for quota accounting
    pub capacity_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            vault_path: PathBuf::from("./vault"),
            thumb_max_dimension: DEFAULT_MAX_DIMENSION,
            thumb_quality: DEFAULT_QUALITY,
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
        }
    }
}

impl StoreConfig {
    /// Default configuration rooted at `path`
    pub fn at<P: AsRef<Path>>(path: P) -> Self {
        Self {
            vault_path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Load from a JSON file; absent fields take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> VaultResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            VaultError::DeserializationError(format!("{}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VaultResult<()> {
        if self.thumb_max_dimension == 0 {
            return Err(VaultError::DeserializationError(
                "thumb_max_dimension must be positive".into(),
            ));
        }
        if !(1..=100).contains(&self.thumb_quality) {
            return Err(VaultError::DeserializationError(
                "thumb_quality must be between 1 and 100".into(),
            ));
        }
        Ok(())
    }
}

/// User settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Informational; photos are always encrypted
    pub auto_encrypt: bool,
    /// Remove the source file after a successful upload
    pub delete_after_upload: bool,
    /// Cipher used for new uploads
    pub encryption_method: CipherMethod,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_encrypt: true,
            delete_after_upload: false,
            encryption_method: CipherMethod::default(),
        }
    }
}

impl Settings {
    /// Load persisted settings. Unreadable or malformed settings fall back to
    /// defaults; they never block access to the vault.
    pub fn load(storage: &dyn StorageBackend) -> Self {
        match storage.read(SETTINGS_NAMESPACE) {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed settings: {}", e);
                Self::default()
            }),
            Ok(None) => Self::default(),
            Err(e) => {
                log::warn!("Settings unavailable, using defaults: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, storage: &dyn StorageBackend) -> VaultResult<()> {
        let blob = serde_json::to_vec(self)
            .map_err(|e| VaultError::SerializationError(e.to_string()))?;
        storage.write(SETTINGS_NAMESPACE, &blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use tempfile::tempdir;

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "vault_path": "/tmp/photos", "thumb_quality": 60 }"#).unwrap();

        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config.vault_path, PathBuf::from("/tmp/photos"));
        assert_eq!(config.thumb_quality, 60);
        assert_eq!(config.thumb_max_dimension, 200);
        assert_eq!(config.capacity_bytes, DEFAULT_CAPACITY_BYTES);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "thumb_quality": 0 }"#).unwrap();
        assert!(StoreConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_settings_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(Settings::load(&storage), Settings::default());

        let settings = Settings {
            delete_after_upload: true,
            encryption_method: CipherMethod::XChaCha20Poly1305,
            ..Default::default()
        };
        settings.save(&storage).unwrap();
        assert_eq!(Settings::load(&storage), settings);

        let raw = storage.read(SETTINGS_NAMESPACE).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["deleteAfterUpload"], true);
        assert_eq!(json["encryptionMethod"], "xchacha20");
    }

    #[test]
    fn test_malformed_settings_fall_back() {
        let storage = MemoryStorage::new();
        storage.write(SETTINGS_NAMESPACE, b"[[[").unwrap();
        assert_eq!(Settings::load(&storage), Settings::default());
    }
}
