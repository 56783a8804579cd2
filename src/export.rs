//! p.file Vault - Archive Export
//!
//! Bundles every decryptable original into a single zip, named by the
//! photos' original file names. Items that fail to decrypt are skipped.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::catalog::PhotoRecord;
use crate::crypto::{self, EncryptionKey};
use crate::error::VaultResult;

/// Finished archive, held in memory
#[derive(Debug)]
pub struct Archive {
    /// Suggested download name, `pfile-photos-YYYY-MM-DD.zip`
    pub file_name: String,
    /// Zip bytes
    pub bytes: Vec<u8>,
    /// Number of photos packed
    pub exported: usize,
    /// Number of photos that failed to decrypt
    pub skipped: usize,
}

impl Archive {
    /// Write the archive into `dir` under its suggested name
    pub fn write_to_dir(&self, dir: &Path) -> VaultResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// Archive file name for a given day
pub fn archive_file_name(date: NaiveDate) -> String {
    format!("pfile-photos-{}.zip", date.format("%Y-%m-%d"))
}

/// Decrypt every record with `key` and pack the originals.
///
/// Read-only with respect to the catalog.
pub fn export_all(records: &[PhotoRecord], key: &EncryptionKey) -> VaultResult<Archive> {
    // Photos are already compressed
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut used_names = HashSet::new();
    let mut exported = 0;
    let mut skipped = 0;

    for record in records {
        let original = match crypto::decrypt(key, &record.ciphertext) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Skipping {} ({}) in export: {}", record.name, record.id, e);
                skipped += 1;
                continue;
            }
        };

        let entry_name = unique_entry_name(&record.name, &mut used_names);
        zip.start_file(entry_name.as_str(), options)?;
        zip.write_all(&original)?;
        exported += 1;
    }

    let bytes = zip.finish()?.into_inner();
    log::info!("Exported {} photos ({} skipped)", exported, skipped);

    Ok(Archive {
        file_name: archive_file_name(Utc::now().date_naive()),
        bytes,
        exported,
        skipped,
    })
}

/// Entry name for `name`, disambiguated as `stem (2).ext` on collision.
/// Path separators are flattened so entries cannot escape the archive root.
fn unique_entry_name(name: &str, used: &mut HashSet<String>) -> String {
    let flat: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let flat = if flat.trim().is_empty() {
        "photo".to_string()
    } else {
        flat
    };

    if used.insert(flat.clone()) {
        return flat;
    }

    let (stem, ext) = match flat.rfind('.') {
        Some(dot) if dot > 0 => (&flat[..dot], &flat[dot..]),
        _ => (flat.as_str(), ""),
    };

    let mut n = 2;
    loop {
        let candidate = format!("{} ({}){}", stem, n, ext);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CipherMethod;
    use std::io::Read;

    fn sealed(name: &str, data: &[u8], key: &EncryptionKey) -> PhotoRecord {
        PhotoRecord {
            id: format!("id-{}", name),
            name: name.to_string(),
            size: data.len() as u64,
            mime_type: "image/jpeg".to_string(),
            ciphertext: crypto::encrypt(key, data, CipherMethod::Aes256Gcm).unwrap(),
            created_at: Utc::now(),
            thumbnail: String::new(),
        }
    }

    fn read_entry(bytes: &[u8], name: &str) -> Vec<u8> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut out = Vec::new();
        file.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_export_contains_originals() {
        let key = EncryptionKey::generate();
        let records = vec![
            sealed("a.jpg", b"AAAA original bytes", &key),
            sealed("c.jpg", b"CCCC original bytes", &key),
        ];

        let archive = export_all(&records, &key).unwrap();
        assert_eq!(archive.exported, 2);
        assert_eq!(archive.skipped, 0);
        assert!(archive.file_name.starts_with("pfile-photos-"));
        assert!(archive.file_name.ends_with(".zip"));

        let zip = zip::ZipArchive::new(Cursor::new(archive.bytes.as_slice())).unwrap();
        assert_eq!(zip.len(), 2);
        assert_eq!(read_entry(&archive.bytes, "a.jpg"), b"AAAA original bytes");
        assert_eq!(read_entry(&archive.bytes, "c.jpg"), b"CCCC original bytes");
    }

    #[test]
    fn test_undecryptable_items_skipped() {
        let key = EncryptionKey::generate();
        let other = EncryptionKey::generate();
        let records = vec![
            sealed("good.jpg", b"good", &key),
            sealed("foreign.jpg", b"foreign", &other),
        ];

        let archive = export_all(&records, &key).unwrap();
        assert_eq!(archive.exported, 1);
        assert_eq!(archive.skipped, 1);
        assert_eq!(read_entry(&archive.bytes, "good.jpg"), b"good");
    }

    #[test]
    fn test_duplicate_names_kept_apart() {
        let key = EncryptionKey::generate();
        let records = vec![
            sealed("img.jpg", b"first", &key),
            sealed("img.jpg", b"second", &key),
        ];

        let archive = export_all(&records, &key).unwrap();
        assert_eq!(read_entry(&archive.bytes, "img.jpg"), b"first");
        assert_eq!(read_entry(&archive.bytes, "img (2).jpg"), b"second");
    }

    #[test]
    fn test_entry_names() {
        let mut used = HashSet::new();
        assert_eq!(unique_entry_name("../etc/passwd", &mut used), ".._etc_passwd");
        assert_eq!(unique_entry_name("noext", &mut used), "noext");
        assert_eq!(unique_entry_name("noext", &mut used), "noext (2)");
        assert_eq!(unique_entry_name(".hidden", &mut used), ".hidden");
        assert_eq!(unique_entry_name(".hidden", &mut used), ".hidden (2)");
        assert_eq!(unique_entry_name("", &mut used), "photo");
    }

    #[test]
    fn test_archive_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(archive_file_name(date), "pfile-photos-2024-03-09.zip");
    }

    #[test]
    fn test_empty_export() {
        let key = EncryptionKey::generate();
        let archive = export_all(&[], &key).unwrap();
        assert_eq!(archive.exported, 0);
        let zip = zip::ZipArchive::new(Cursor::new(archive.bytes.as_slice())).unwrap();
        assert_eq!(zip.len(), 0);
    }
}
