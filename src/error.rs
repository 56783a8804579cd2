//! p.file Vault - Error Types

use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // CRYPTO ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Encryption key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    // ═══════════════════════════════════════════════════════════════
    // IMAGE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),

    // ═══════════════════════════════════════════════════════════════
    // CATALOG / STORAGE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Photo not found: {0}")]
    PhotoNotFound(String),

    #[error("Photo id already present in catalog: {0}")]
    DuplicatePhotoId(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // ═══════════════════════════════════════════════════════════════
    // EXPORT ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Archive creation failed: {0}")]
    ArchiveFailed(String),

    // ═══════════════════════════════════════════════════════════════
    // SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl VaultError {
    /// Check if this is a security-critical error
    pub fn is_security_critical(&self) -> bool {
        matches!(
            self,
            VaultError::DecryptionFailed(_)
                | VaultError::KeyUnavailable(_)
                | VaultError::InvalidKey(_)
        )
    }

    /// Errors that batch operations record against a single item and move past
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            VaultError::UnsupportedImage(_)
                | VaultError::DecryptionFailed(_)
                | VaultError::KeyUnavailable(_)
                | VaultError::IoError(_)
        )
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            VaultError::DeserializationError(e.to_string())
        } else {
            VaultError::SerializationError(e.to_string())
        }
    }
}

impl From<image::ImageError> for VaultError {
    fn from(e: image::ImageError) -> Self {
        VaultError::UnsupportedImage(e.to_string())
    }
}

impl From<zip::result::ZipError> for VaultError {
    fn from(e: zip::result::ZipError) -> Self {
        VaultError::ArchiveFailed(e.to_string())
    }
}

impl From<base64::DecodeError> for VaultError {
    fn from(e: base64::DecodeError) -> Self {
        VaultError::DecryptionFailed(format!("ciphertext is not valid base64: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(VaultError::DecryptionFailed("x".into()).is_security_critical());
        assert!(!VaultError::PhotoNotFound("x".into()).is_security_critical());

        assert!(VaultError::UnsupportedImage("x".into()).is_per_item());
        assert!(!VaultError::Persistence("disk full".into()).is_per_item());
    }

    #[test]
    fn test_json_error_maps_to_deserialization() {
        let err: VaultError = serde_json::from_str::<Vec<u32>>("[1,").unwrap_err().into();
        assert!(matches!(err, VaultError::DeserializationError(_)));
    }
}
