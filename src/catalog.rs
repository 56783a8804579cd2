//! p.file Vault - Photo Catalog
//!
//! The ordered collection of photo records, persisted as one JSON array.
//! Loaded wholesale at startup, rewritten wholesale after every mutation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{VaultError, VaultResult};
use crate::storage::{MemoryStorage, StorageBackend, CATALOG_NAMESPACE};

/// One stored photo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRecord {
    /// Unique ID (time-based plus randomness)
    pub id: String,
    /// Original filename, not unique
    pub name: String,
    /// Original size in bytes
    pub size: u64,
    /// MIME type
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Codec output for the full-resolution image
    #[serde(rename = "encryptedData")]
    pub ciphertext: String,
    /// Upload timestamp
    #[serde(rename = "uploadDate")]
    pub created_at: DateTime<Utc>,
    /// Inline preview image (data URL), stored in the clear
    pub thumbnail: String,
}

/// Generate a photo id: upload time in milliseconds plus random suffix
pub fn generate_photo_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &random[..8])
}

/// Photo Catalog
pub struct PhotoCatalog {
    /// Records in insertion order
    records: Vec<PhotoRecord>,
    /// Durable mirror
    storage: Arc<dyn StorageBackend>,
}

impl PhotoCatalog {
    /// Load the catalog from storage; an absent blob is an empty catalog
    pub fn load(storage: Arc<dyn StorageBackend>) -> VaultResult<Self> {
        let records = match storage.read(CATALOG_NAMESPACE)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| VaultError::DeserializationError(format!("catalog: {}", e)))?,
            None => Vec::new(),
        };

        Ok(Self { records, storage })
    }

    /// Empty catalog mirrored only in memory, for sessions whose storage
    /// cannot be read. It never writes over the durable blob.
    pub fn in_memory() -> Self {
        Self {
            records: Vec::new(),
            storage: Arc::new(MemoryStorage::new()),
        }
    }

    /// Append a record and persist. A missing id is assigned; a duplicate
    /// id is rejected. Returns the id the record was stored under.
    ///
    /// The in-memory catalog only changes once the new blob is durable.
    pub fn add(&mut self, mut record: PhotoRecord) -> VaultResult<String> {
        if record.id.is_empty() {
            record.id = generate_photo_id();
            while self.find(&record.id).is_some() {
                record.id = generate_photo_id();
            }
        } else if self.find(&record.id).is_some() {
            return Err(VaultError::DuplicatePhotoId(record.id));
        }

        let id = record.id.clone();
        let mut next = self.records.clone();
        next.push(record);
        self.commit(next)?;

        Ok(id)
    }

    /// Remove a record by id and persist. `Ok(false)` for unknown ids.
    pub fn remove(&mut self, id: &str) -> VaultResult<bool> {
        let Some(position) = self.records.iter().position(|r| r.id == id) else {
            return Ok(false);
        };

        let mut next = self.records.clone();
        next.remove(position);
        self.commit(next)?;

        Ok(true)
    }

    /// Lookup by id
    pub fn find(&self, id: &str) -> Option<&PhotoRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// All records in insertion order
    pub fn list(&self) -> &[PhotoRecord] {
        &self.records
    }

    /// Case-insensitive substring match on name. Empty term returns all.
    pub fn filter_by_name(&self, term: &str) -> Vec<&PhotoRecord> {
        let term = term.to_lowercase();
        self.records
            .iter()
            .filter(|r| term.is_empty() || r.name.to_lowercase().contains(&term))
            .collect()
    }

    /// Sum of original sizes across all records
    pub fn total_size(&self) -> u64 {
        self.records.iter().map(|r| r.size).sum()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write `next` durably, then adopt it as the in-memory state
    fn commit(&mut self, next: Vec<PhotoRecord>) -> VaultResult<()> {
        let blob = serde_json::to_vec(&next)
            .map_err(|e| VaultError::SerializationError(e.to_string()))?;
        self.storage.write(CATALOG_NAMESPACE, &blob)?;
        self.records = next;
        Ok(())
    }
}
