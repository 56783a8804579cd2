//! p.file Vault - Durable Storage
//!
//! Namespaced blob storage. Every write replaces the whole blob for its
//! namespace; readers never observe a partially written blob.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{VaultError, VaultResult};

/// Namespace holding the serialized photo catalog
pub const CATALOG_NAMESPACE: &str = "photos";

/// Namespace holding the active encryption key
pub const KEY_NAMESPACE: &str = "encryption_key";

/// Namespace holding user settings
pub const SETTINGS_NAMESPACE: &str = "settings";

/// Namespace listing photos stored under a key that is no longer active
pub const STALE_NAMESPACE: &str = "stale_photos";

/// Raw storage I/O. The catalog, key manager and settings decide what
/// goes in each namespace; backends only decide where it lives.
pub trait StorageBackend: Send + Sync {
    /// Read a namespace. `Ok(None)` when nothing has been written yet.
    fn read(&self, namespace: &str) -> VaultResult<Option<Vec<u8>>>;

    /// Replace a namespace's blob. MUST be atomic: on error the previous
    /// blob is still what `read` returns.
    fn write(&self, namespace: &str, data: &[u8]) -> VaultResult<()>;

    /// Delete a namespace. Missing namespaces are not an error.
    fn remove(&self, namespace: &str) -> VaultResult<()>;
}

// ═══════════════════════════════════════════════════════════════════════════
// FILESYSTEM
// ═══════════════════════════════════════════════════════════════════════════

/// One file per namespace under a vault directory
pub struct FsStorage {
    /// Root directory
    root: PathBuf,
}

impl FsStorage {
    /// Create storage rooted at `root`, creating the directory if needed
    pub fn new(root: &Path) -> VaultResult<Self> {
        fs::create_dir_all(root).map_err(|e| {
            VaultError::Persistence(format!("cannot create {}: {}", root.display(), e))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, namespace: &str) -> PathBuf {
        self.root.join(format!("{}.pfv", namespace))
    }
}

impl StorageBackend for FsStorage {
    fn read(&self, namespace: &str) -> VaultResult<Option<Vec<u8>>> {
        let path = self.path_for(namespace);
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::Persistence(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn write(&self, namespace: &str, data: &[u8]) -> VaultResult<()> {
        let path = self.path_for(namespace);
        let temp_path = self
            .root
            .join(format!(".{}-{}.tmp", namespace, Uuid::new_v4().simple()));

        let result = (|| -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
            // Rename is atomic on the filesystems we target
            fs::rename(&temp_path, &path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(VaultError::Persistence(format!(
                "cannot write {}: {}",
                path.display(),
                e
            )));
        }

        log::debug!("Persisted namespace '{}' ({} bytes)", namespace, data.len());
        Ok(())
    }

    fn remove(&self, namespace: &str) -> VaultResult<()> {
        match fs::remove_file(self.path_for(namespace)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::Persistence(e.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MEMORY
// ═══════════════════════════════════════════════════════════════════════════

/// In-process storage for tests and sessions without durable storage
#[derive(Default)]
pub struct MemoryStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    simulate_write_error: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage whose every operation fails, like a sandbox with storage disabled
    pub fn unavailable() -> Self {
        let storage = Self::default();
        storage.unavailable.store(true, Ordering::SeqCst);
        storage
    }

    /// Make subsequent writes fail (quota exceeded, disk full)
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.store(simulate, Ordering::SeqCst);
    }

    fn check_available(&self) -> VaultResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(VaultError::Persistence("storage is unavailable".into()));
        }
        Ok(())
    }
}

impl StorageBackend for MemoryStorage {
    fn read(&self, namespace: &str) -> VaultResult<Option<Vec<u8>>> {
        self.check_available()?;
        Ok(self.blobs.lock().get(namespace).cloned())
    }

    fn write(&self, namespace: &str, data: &[u8]) -> VaultResult<()> {
        self.check_available()?;
        if self.simulate_write_error.load(Ordering::SeqCst) {
            return Err(VaultError::Persistence("simulated write error".into()));
        }
        self.blobs.lock().insert(namespace.to_string(), data.to_vec());
        Ok(())
    }

    fn remove(&self, namespace: &str) -> VaultResult<()> {
        self.check_available()?;
        self.blobs.lock().remove(namespace);
        Ok(())
    }
}
