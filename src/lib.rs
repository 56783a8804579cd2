//! # p.file Vault
//!
//! Encrypted local photo store with thumbnail previews and archive export.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      PHOTO STORE                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │ KEY MANAGER │  │    CODEC    │  │ THUMBNAIL       │  │
//! │  │ one key     │  │ AES-256-GCM │  │ DERIVER         │  │
//! │  │ export/imp. │  │ XChaCha20   │  │ 200px JPEG      │  │
//! │  └──────┬──────┘  └──────┬──────┘  └────────┬────────┘  │
//! │         │                │                   │           │
//! │  ┌──────┴────────────────┴───────────────────┴────────┐ │
//! │  │        PHOTO CATALOG (ordered, write-then-commit)   │ │
//! │  └──────────────────────────┬──────────────────────────┘ │
//! │                             │                            │
//! │  ┌──────────────────┐  ┌────┴───────────────────────┐   │
//! │  │ ARCHIVE EXPORTER │  │ STORAGE BACKEND (fs / mem) │   │
//! │  └──────────────────┘  └────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - Every original is encrypted with a fresh nonce under the single active key
//! - Ciphertext is authenticated; tampering is detected, never silently decoded
//! - Thumbnails are stored in the clear for gallery display
//! - The key lives next to the catalog; exporting it is the only backup

pub mod catalog;
pub mod config;
pub mod crypto;
pub mod error;
pub mod export;
pub mod storage;
pub mod thumbs;
pub mod vault;

pub use catalog::{PhotoCatalog, PhotoRecord};
pub use config::{Settings, StoreConfig};
pub use crypto::{CipherMethod, EncryptionKey, KeyBundle, KeyManager, KeyOrigin};
pub use error::{VaultError, VaultResult};
pub use export::Archive;
pub use storage::{FsStorage, MemoryStorage, StorageBackend};
pub use thumbs::ThumbnailDeriver;
pub use vault::{PhotoStore, StorageInfo, UploadReport};

/// p.file Vault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
