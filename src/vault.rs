//! p.file Vault - Photo Store
//!
//! The session context tying key management, the codec, thumbnails and the
//! catalog together. Construct one per session and hand it to whatever
//! renders or drives the gallery.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::catalog::{PhotoCatalog, PhotoRecord};
use crate::config::{Settings, StoreConfig};
use crate::crypto::{self, CipherMethod, KeyBundle, KeyManager, KeyOrigin, KEY_EXPORT_FILE_NAME};
use crate::error::{VaultError, VaultResult};
use crate::export::{self, Archive};
use crate::storage::{FsStorage, StorageBackend, STALE_NAMESPACE};
use crate::thumbs::ThumbnailDeriver;

/// Quota snapshot for display
#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub photo_count: usize,
    pub used_bytes: u64,
    pub capacity_bytes: u64,
    pub percent_used: f64,
}

impl fmt::Display for StorageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const GB: f64 = 1024.0 * 1024.0 * 1024.0;
        write!(
            f,
            "{:.1} GB of {:.0} GB used",
            self.used_bytes as f64 / GB,
            self.capacity_bytes as f64 / GB
        )
    }
}

/// Outcome of a batch upload
#[derive(Debug, Default)]
pub struct UploadReport {
    pub uploaded: Vec<PhotoRecord>,
    pub failed: Vec<(PathBuf, VaultError)>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Photo Store - main entry point
pub struct PhotoStore {
    /// Configuration
    config: StoreConfig,
    /// Durable storage shared by catalog, keys and settings
    storage: Arc<dyn StorageBackend>,
    /// Active key
    keys: RwLock<KeyManager>,
    /// Photo catalog
    catalog: RwLock<PhotoCatalog>,
    /// User settings
    settings: RwLock<Settings>,
    /// Thumbnail deriver
    thumbs: ThumbnailDeriver,
    /// Records stored under a key this session does not have
    stale_ids: RwLock<HashSet<String>>,
}

impl PhotoStore {
    // ═══════════════════════════════════════════════════════════════════════
    // INITIALIZATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Open (or create) the vault directory named by `config`
    pub fn open(config: StoreConfig) -> VaultResult<Self> {
        config.validate()?;
        let storage: Arc<dyn StorageBackend> = Arc::new(FsStorage::new(&config.vault_path)?);
        Self::with_storage(config, storage)
    }

    /// Open a store over an explicit backend
    pub fn with_storage(config: StoreConfig, storage: Arc<dyn StorageBackend>) -> VaultResult<Self> {
        let catalog = match PhotoCatalog::load(Arc::clone(&storage)) {
            Ok(catalog) => catalog,
            Err(VaultError::Persistence(e)) => {
                log::warn!(
                    "Catalog storage unavailable ({}); photos uploaded this session will not be saved",
                    e
                );
                PhotoCatalog::in_memory()
            }
            Err(e) => return Err(e),
        };
        let keys = KeyManager::load_or_generate(Arc::clone(&storage))?;
        let settings = Settings::load(storage.as_ref());
        let stale_ids = resolve_stale_ids(storage.as_ref(), &catalog, keys.origin());

        let thumbs = ThumbnailDeriver::new(config.thumb_max_dimension, config.thumb_quality);

        log::info!(
            "Opened photo store with {} photos ({:?} key)",
            catalog.len(),
            keys.origin()
        );

        Ok(Self {
            config,
            storage,
            keys: RwLock::new(keys),
            catalog: RwLock::new(catalog),
            settings: RwLock::new(settings),
            thumbs,
            stale_ids: RwLock::new(stale_ids),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn key_origin(&self) -> KeyOrigin {
        self.keys.read().origin()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // UPLOAD
    // ═══════════════════════════════════════════════════════════════════════

    /// Store one image. `declared_mime` is the media type reported by the
    /// caller; when absent it is sniffed from the content. Nothing is added
    /// unless thumbnail derivation and encryption both succeed.
    pub async fn upload_bytes(
        &self,
        name: &str,
        declared_mime: Option<&str>,
        bytes: Vec<u8>,
    ) -> VaultResult<PhotoRecord> {
        let mime_type = match declared_mime {
            Some(mime) => mime.to_string(),
            None => detect_mime(&bytes),
        };
        if !mime_type.starts_with("image/") {
            return Err(VaultError::UnsupportedImage(format!(
                "{} has media type {}",
                name, mime_type
            )));
        }

        let size = bytes.len() as u64;
        let deriver = self.thumbs;
        let (bytes, thumbnail) = tokio::task::spawn_blocking(move || {
            let thumbnail = deriver.derive_from_bytes(&bytes);
            (bytes, thumbnail)
        })
        .await
        .map_err(|e| VaultError::TaskFailed(e.to_string()))?;
        let thumbnail = thumbnail?;

        // No suspension points below: encrypt and add run back to back
        let method = self.settings.read().encryption_method;
        let ciphertext = crypto::encrypt(self.keys.read().active_key(), &bytes, method)?;

        let mut record = PhotoRecord {
            id: String::new(),
            name: name.to_string(),
            size,
            mime_type,
            ciphertext,
            created_at: Utc::now(),
            thumbnail: thumbnail.to_data_url(),
        };
        record.id = self.catalog.write().add(record.clone())?;

        log::info!("Stored {} as {} ({} bytes, {})", name, record.id, size, method.name());
        Ok(record)
    }

    /// Read a file and store it
    pub async fn upload_file(&self, path: &Path) -> VaultResult<PhotoRecord> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());

        let record = self.upload_bytes(&name, None, bytes).await?;

        let delete_source = self.settings.read().delete_after_upload;
        if delete_source {
            if let Err(e) = tokio::fs::remove_file(path).await {
                log::warn!("Uploaded {} but could not delete the source: {}", path.display(), e);
            }
        }

        Ok(record)
    }

    /// Upload files strictly one at a time. Per-file failures (not an image,
    /// unreadable) are recorded and the batch continues; a storage failure
    /// ends the batch since later files would fail the same way.
    pub async fn upload_batch<P: AsRef<Path>>(&self, paths: &[P]) -> UploadReport {
        let mut report = UploadReport::default();

        for path in paths {
            let path = path.as_ref();
            match self.upload_file(path).await {
                Ok(record) => report.uploaded.push(record),
                Err(e) => {
                    log::warn!("Upload of {} failed: {}", path.display(), e);
                    let fatal = !e.is_per_item();
                    report.failed.push((path.to_path_buf(), e));
                    if fatal {
                        break;
                    }
                }
            }
        }

        report
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PHOTO OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Decrypted original of one photo
    pub fn photo_bytes(&self, id: &str) -> VaultResult<Vec<u8>> {
        let catalog = self.catalog.read();
        let record = catalog
            .find(id)
            .ok_or_else(|| VaultError::PhotoNotFound(id.to_string()))?;

        let keys = self.keys.read();
        crypto::decrypt(keys.active_key(), &record.ciphertext)
            .map_err(|e| self.explain_decrypt_failure(id, e))
    }

    /// Write the decrypted original of one photo to `dest`
    pub fn export_photo(&self, id: &str, dest: &Path) -> VaultResult<()> {
        let data = self.photo_bytes(id)?;
        std::fs::write(dest, data)?;
        Ok(())
    }

    /// Record by id
    pub fn find(&self, id: &str) -> Option<PhotoRecord> {
        self.catalog.read().find(id).cloned()
    }

    /// All records in upload order
    pub fn list(&self) -> Vec<PhotoRecord> {
        self.catalog.read().list().to_vec()
    }

    /// Records whose name contains `term`, ignoring case
    pub fn search(&self, term: &str) -> Vec<PhotoRecord> {
        self.catalog
            .read()
            .filter_by_name(term)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Delete a photo. `Ok(false)` if the id is unknown.
    pub fn delete(&self, id: &str) -> VaultResult<bool> {
        let removed = self.catalog.write().remove(id)?;
        if removed {
            let mut stale = self.stale_ids.write();
            if stale.remove(id) {
                save_stale_ids(self.storage.as_ref(), &stale);
            }
            log::info!("Deleted photo {}", id);
        }
        Ok(removed)
    }

    /// Sum of original sizes
    pub fn total_size(&self) -> u64 {
        self.catalog.read().total_size()
    }

    /// Usage against the configured capacity
    pub fn storage_info(&self) -> StorageInfo {
        let catalog = self.catalog.read();
        let used_bytes = catalog.total_size();
        let capacity_bytes = self.config.capacity_bytes;
        StorageInfo {
            photo_count: catalog.len(),
            used_bytes,
            capacity_bytes,
            percent_used: if capacity_bytes == 0 {
                0.0
            } else {
                used_bytes as f64 / capacity_bytes as f64 * 100.0
            },
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // EXPORT
    // ═══════════════════════════════════════════════════════════════════════

    /// Zip of every decryptable original
    pub fn export_all(&self) -> VaultResult<Archive> {
        let catalog = self.catalog.read();
        let keys = self.keys.read();
        export::export_all(catalog.list(), keys.active_key())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // KEYS
    // ═══════════════════════════════════════════════════════════════════════

    /// Export payload for the active key
    pub fn export_key(&self) -> KeyBundle {
        let method = self.settings.read().encryption_method;
        self.keys.read().export_key(method)
    }

    /// Write the key bundle into `dir`, returning the file path
    pub fn write_key_bundle(&self, dir: &Path) -> VaultResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(KEY_EXPORT_FILE_NAME);
        std::fs::write(&path, self.export_key().to_json()?)?;
        log::info!("Encryption key exported to {}", path.display());
        Ok(path)
    }

    /// Restore a previously exported key. When photos exist, the key must
    /// decrypt at least one of them, so a wrong bundle cannot orphan them.
    /// Photos it cannot decrypt stay marked as needing another key.
    pub fn import_key(&self, bundle: &KeyBundle) -> VaultResult<()> {
        let key = bundle.encryption_key()?;

        let catalog = self.catalog.read();
        let undecryptable: HashSet<String> = catalog
            .list()
            .iter()
            .filter(|r| crypto::decrypt(&key, &r.ciphertext).is_err())
            .map(|r| r.id.clone())
            .collect();
        if !catalog.is_empty() && undecryptable.len() == catalog.len() {
            return Err(VaultError::DecryptionFailed(
                "imported key does not decrypt any stored photo".into(),
            ));
        }

        self.keys.write().import(key)?;

        if undecryptable.is_empty() {
            if let Err(e) = self.storage.remove(STALE_NAMESPACE) {
                log::warn!("Could not clear the list of photos under a lost key: {}", e);
            }
        } else {
            log::warn!(
                "{} photos were stored under a different key and remain unreadable",
                undecryptable.len()
            );
            save_stale_ids(self.storage.as_ref(), &undecryptable);
        }
        *self.stale_ids.write() = undecryptable;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SETTINGS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Persist new settings, then apply them
    pub fn update_settings(&self, settings: Settings) -> VaultResult<()> {
        settings.save(self.storage.as_ref())?;
        *self.settings.write() = settings;
        Ok(())
    }

    /// Cipher for future uploads. Existing photos keep theirs.
    pub fn set_encryption_method(&self, method: CipherMethod) -> VaultResult<()> {
        let settings = Settings {
            encryption_method: method,
            ..self.settings()
        };
        self.update_settings(settings)?;
        log::info!("Encryption method changed to {}", method.name());
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // HELPERS
    // ═══════════════════════════════════════════════════════════════════════

    fn explain_decrypt_failure(&self, id: &str, err: VaultError) -> VaultError {
        match err {
            VaultError::DecryptionFailed(_) if self.stale_ids.read().contains(id) => {
                VaultError::KeyUnavailable(format!(
                    "photo {} was stored under a key this session does not have; import the exported key to restore access",
                    id
                ))
            }
            other => other,
        }
    }
}

/// Ids of photos the active key cannot decrypt. A freshly generated or
/// ephemeral key marks every existing photo; the set is persisted so later
/// sessions keep reporting those photos as locked rather than corrupt.
fn resolve_stale_ids(
    storage: &dyn StorageBackend,
    catalog: &PhotoCatalog,
    origin: KeyOrigin,
) -> HashSet<String> {
    let mut stale = load_stale_ids(storage);
    let fresh_key = matches!(origin, KeyOrigin::Generated | KeyOrigin::Ephemeral);

    if fresh_key && !catalog.is_empty() {
        log::warn!(
            "{} stored photos predate the active key and cannot be decrypted until the original key is imported",
            catalog.len()
        );
        stale.extend(catalog.list().iter().map(|r| r.id.clone()));
    }
    stale.retain(|id| catalog.find(id).is_some());

    if fresh_key && !stale.is_empty() {
        save_stale_ids(storage, &stale);
    } else if !stale.is_empty() {
        log::warn!(
            "{} stored photos need a previously exported key",
            stale.len()
        );
    }

    stale
}

fn load_stale_ids(storage: &dyn StorageBackend) -> HashSet<String> {
    match storage.read(STALE_NAMESPACE) {
        Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            log::warn!("Ignoring malformed list of photos under a lost key: {}", e);
            HashSet::new()
        }),
        Ok(None) => HashSet::new(),
        Err(e) => {
            log::warn!("List of photos under a lost key unavailable: {}", e);
            HashSet::new()
        }
    }
}

fn save_stale_ids(storage: &dyn StorageBackend, ids: &HashSet<String>) {
    let mut sorted: Vec<&String> = ids.iter().collect();
    sorted.sort();

    let result = serde_json::to_vec(&sorted)
        .map_err(|e| VaultError::SerializationError(e.to_string()))
        .and_then(|blob| storage.write(STALE_NAMESPACE, &blob));
    if let Err(e) = result {
        log::warn!("Could not record photos stored under a lost key: {}", e);
    }
}

/// Detect MIME type from file content
pub fn detect_mime(data: &[u8]) -> String {
    if let Ok(format) = image::guess_format(data) {
        return format.to_mime_type().to_string();
    }

    // HEIC/HEIF: recognized so the rejection names the real type
    if data.len() > 12 && &data[4..8] == b"ftyp" {
        if &data[8..12] == b"heic" || &data[8..12] == b"heix" {
            return "image/heic".into();
        }
        if &data[8..12] == b"mif1" {
            return "image/heif".into();
        }
    }

    "application/octet-stream".into()
}
