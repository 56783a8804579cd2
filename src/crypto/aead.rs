//! p.file Vault - AEAD Encryption
//!
//! AES-256-GCM (default) or XChaCha20-Poly1305 for photo payloads.
//!
//! Text format (base64 of):
//! ```text
//! [MAGIC 4B]["PFV1"]
//! [METHOD 1B][0x01 = AES-256-GCM, 0x02 = XChaCha20-Poly1305]
//! [NONCE 12B | 24B][random]
//! [CIPHERTEXT variable][includes 16B auth tag]
//! ```

use std::fmt;
use std::str::FromStr;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use serde::{Deserialize, Serialize};

use super::keys::{
    generate_nonce, generate_xchacha_nonce, EncryptionKey, NONCE_LEN, XCHACHA_NONCE_LEN,
};
use crate::error::{VaultError, VaultResult};

/// Magic bytes identifying a p.file ciphertext
const MAGIC: &[u8; 4] = b"PFV1";

/// AEAD authentication tag size
const TAG_LEN: usize = 16;

/// Header size: MAGIC(4) + METHOD(1)
const HEADER_LEN: usize = MAGIC.len() + 1;

/// Symmetric cipher used for new ciphertexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CipherMethod {
    /// AES-256-GCM (12-byte nonce)
    #[default]
    #[serde(rename = "aes256")]
    Aes256Gcm,
    /// XChaCha20-Poly1305 (24-byte nonce)
    #[serde(rename = "xchacha20")]
    XChaCha20Poly1305,
}

impl CipherMethod {
    pub fn nonce_len(&self) -> usize {
        match self {
            Self::Aes256Gcm => NONCE_LEN,
            Self::XChaCha20Poly1305 => XCHACHA_NONCE_LEN,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "AES-256-GCM",
            Self::XChaCha20Poly1305 => "XChaCha20-Poly1305",
        }
    }

    /// Short identifier used in settings and key bundles
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "aes256",
            Self::XChaCha20Poly1305 => "xchacha20",
        }
    }

    fn id(&self) -> u8 {
        match self {
            Self::Aes256Gcm => 0x01,
            Self::XChaCha20Poly1305 => 0x02,
        }
    }

    fn from_id(id: u8) -> Option<Self> {
        match id {
            0x01 => Some(Self::Aes256Gcm),
            0x02 => Some(Self::XChaCha20Poly1305),
            _ => None,
        }
    }
}

impl fmt::Display for CipherMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CipherMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aes256" | "aes-256-gcm" => Ok(Self::Aes256Gcm),
            "xchacha20" | "xchacha20-poly1305" => Ok(Self::XChaCha20Poly1305),
            other => Err(format!("unknown encryption method: {}", other)),
        }
    }
}

/// Encrypted data with its method and nonce
#[derive(Debug)]
pub struct EncryptedData {
    pub method: CipherMethod,
    /// Nonce (12 or 24 bytes depending on cipher)
    pub nonce: Vec<u8>,
    /// Ciphertext with authentication tag
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Serialize to bytes (magic || method || nonce || ciphertext)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(HEADER_LEN + self.nonce.len() + self.ciphertext.len());
        result.extend_from_slice(MAGIC);
        result.push(self.method.id());
        result.extend_from_slice(&self.nonce);
        result.extend_from_slice(&self.ciphertext);
        result
    }

    /// Deserialize from bytes
    pub fn from_bytes(data: &[u8]) -> VaultResult<Self> {
        if data.len() < HEADER_LEN || &data[..MAGIC.len()] != MAGIC {
            return Err(VaultError::DecryptionFailed("Unrecognized ciphertext format".into()));
        }

        let method = CipherMethod::from_id(data[MAGIC.len()]).ok_or_else(|| {
            VaultError::DecryptionFailed(format!("Unknown cipher id {:#04x}", data[MAGIC.len()]))
        })?;

        let body = &data[HEADER_LEN..];
        let nonce_len = method.nonce_len();
        if body.len() < nonce_len + TAG_LEN {
            return Err(VaultError::DecryptionFailed("Data too short".into()));
        }

        Ok(Self {
            method,
            nonce: body[..nonce_len].to_vec(),
            ciphertext: body[nonce_len..].to_vec(),
        })
    }

    /// Text form stored in the catalog
    pub fn to_text(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Parse the text form stored in the catalog
    pub fn from_text(text: &str) -> VaultResult<Self> {
        let bytes = STANDARD.decode(text.trim())?;
        Self::from_bytes(&bytes)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC CODEC
// ═══════════════════════════════════════════════════════════════════════════

/// Encrypt `plaintext` under `key`, returning the catalog text form.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8], method: CipherMethod) -> VaultResult<String> {
    let encrypted = match method {
        CipherMethod::Aes256Gcm => encrypt_aes_gcm(key, plaintext)?,
        CipherMethod::XChaCha20Poly1305 => encrypt_xchacha(key, plaintext)?,
    };
    Ok(encrypted.to_text())
}

/// Decrypt a catalog ciphertext. Fails on a wrong key, tampering,
/// truncation or an unrecognized format; never returns unauthenticated bytes.
pub fn decrypt(key: &EncryptionKey, ciphertext: &str) -> VaultResult<Vec<u8>> {
    let encrypted = EncryptedData::from_text(ciphertext)?;
    match encrypted.method {
        CipherMethod::Aes256Gcm => decrypt_aes_gcm(key, &encrypted),
        CipherMethod::XChaCha20Poly1305 => decrypt_xchacha(key, &encrypted),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// AES-256-GCM
// ═══════════════════════════════════════════════════════════════════════════

fn encrypt_aes_gcm(key: &EncryptionKey, plaintext: &[u8]) -> VaultResult<EncryptedData> {
    let cipher = Aes256Gcm::new_from_slice(key.expose())
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    Ok(EncryptedData {
        method: CipherMethod::Aes256Gcm,
        nonce: nonce_bytes.to_vec(),
        ciphertext,
    })
}

fn decrypt_aes_gcm(key: &EncryptionKey, encrypted: &EncryptedData) -> VaultResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.expose())
        .map_err(|e| VaultError::DecryptionFailed(e.to_string()))?;

    if encrypted.nonce.len() != NONCE_LEN {
        return Err(VaultError::DecryptionFailed("Invalid nonce length".into()));
    }

    let nonce = Nonce::from_slice(&encrypted.nonce);

    cipher
        .decrypt(nonce, encrypted.ciphertext.as_slice())
        .map_err(|_| VaultError::DecryptionFailed("Authentication failed".into()))
}

// ═══════════════════════════════════════════════════════════════════════════
// XChaCha20-Poly1305
// ═══════════════════════════════════════════════════════════════════════════

fn encrypt_xchacha(key: &EncryptionKey, plaintext: &[u8]) -> VaultResult<EncryptedData> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.expose())
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    let nonce_bytes = generate_xchacha_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    Ok(EncryptedData {
        method: CipherMethod::XChaCha20Poly1305,
        nonce: nonce_bytes.to_vec(),
        ciphertext,
    })
}

fn decrypt_xchacha(key: &EncryptionKey, encrypted: &EncryptedData) -> VaultResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.expose())
        .map_err(|e| VaultError::DecryptionFailed(e.to_string()))?;

    if encrypted.nonce.len() != XCHACHA_NONCE_LEN {
        return Err(VaultError::DecryptionFailed("Invalid nonce length".into()));
    }

    let nonce = XNonce::from_slice(&encrypted.nonce);

    cipher
        .decrypt(nonce, encrypted.ciphertext.as_slice())
        .map_err(|_| VaultError::DecryptionFailed("Authentication failed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_both_methods() {
        let key = EncryptionKey::generate();
        let plaintext = b"\xff\xd8\xff\xe0 not really a jpeg, but binary enough \x00\x01";

        for method in [CipherMethod::Aes256Gcm, CipherMethod::XChaCha20Poly1305] {
            let text = encrypt(&key, plaintext, method).unwrap();
            assert_eq!(decrypt(&key, &text).unwrap(), plaintext.to_vec());
        }
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let key = EncryptionKey::generate();
        let text = encrypt(&key, b"", CipherMethod::Aes256Gcm).unwrap();
        assert!(decrypt(&key, &text).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = EncryptionKey::generate();
        let key2 = EncryptionKey::generate();

        for method in [CipherMethod::Aes256Gcm, CipherMethod::XChaCha20Poly1305] {
            let text = encrypt(&key1, b"Secret data", method).unwrap();
            assert!(matches!(
                decrypt(&key2, &text),
                Err(VaultError::DecryptionFailed(_))
            ));
        }
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let key = EncryptionKey::generate();
        let a = encrypt(&key, b"same", CipherMethod::Aes256Gcm).unwrap();
        let b = encrypt(&key, b"same", CipherMethod::Aes256Gcm).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_and_truncated_fail() {
        let key = EncryptionKey::generate();
        let text = encrypt(&key, b"photo bytes", CipherMethod::Aes256Gcm).unwrap();

        let mut bytes = STANDARD.decode(&text).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = STANDARD.encode(&bytes);
        assert!(matches!(
            decrypt(&key, &tampered),
            Err(VaultError::DecryptionFailed(_))
        ));

        let truncated = STANDARD.encode(&bytes[..HEADER_LEN + 4]);
        assert!(matches!(
            decrypt(&key, &truncated),
            Err(VaultError::DecryptionFailed(_))
        ));

        assert!(matches!(
            decrypt(&key, "definitely not base64!"),
            Err(VaultError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("aes256".parse::<CipherMethod>().unwrap(), CipherMethod::Aes256Gcm);
        assert_eq!(
            "XChaCha20".parse::<CipherMethod>().unwrap(),
            CipherMethod::XChaCha20Poly1305
        );
        assert!("rot13".parse::<CipherMethod>().is_err());
        assert_eq!(CipherMethod::default(), CipherMethod::Aes256Gcm);
    }
}
