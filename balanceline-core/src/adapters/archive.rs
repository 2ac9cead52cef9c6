//! Zip archive decryptor
//!
//! Statements arrive as password-protected zip files (ZipCrypto or AES).
//! The first `.pdf` entry is the statement.

use std::io::{Cursor, Read};

use zip::result::ZipError;
use zip::ZipArchive;

use crate::domain::result::ArchiveError;
use crate::domain::{DocumentBytes, EncryptedArchive};
use crate::ports::ArchiveDecryptor;

/// Local file header signature, "PK\x03\x04"
const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// Empty archives carry only the end-of-central-directory record
const EMPTY_ZIP_SIGNATURE: &[u8] = b"PK\x05\x06";

/// Largest statement PDF we are willing to inflate
pub const MAX_STATEMENT_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ZipArchiveDecryptor {
    max_entry_bytes: u64,
}

impl Default for ZipArchiveDecryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipArchiveDecryptor {
    pub fn new() -> Self {
        Self {
            max_entry_bytes: MAX_STATEMENT_BYTES,
        }
    }

    pub fn with_max_entry_bytes(mut self, max_entry_bytes: u64) -> Self {
        self.max_entry_bytes = max_entry_bytes;
        self
    }

    fn too_large(&self) -> ArchiveError {
        ArchiveError::UnsupportedFormat(format!(
            "statement entry is larger than {} bytes",
            self.max_entry_bytes
        ))
    }

    fn find_statement_entry<R: Read + std::io::Seek>(
        &self,
        archive: &mut ZipArchive<R>,
    ) -> Result<(usize, String, bool), ArchiveError> {
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index).map_err(map_open_error)?;
            if entry.is_dir() {
                continue;
            }
            if entry.name().to_lowercase().ends_with(".pdf") {
                // Declared size comes straight from the header and may be anything
                if entry.size() > self.max_entry_bytes {
                    return Err(self.too_large());
                }
                return Ok((index, entry.name().to_string(), entry.encrypted()));
            }
        }
        Err(ArchiveError::UnsupportedFormat(
            "archive contains no PDF statement".to_string(),
        ))
    }
}

impl ArchiveDecryptor for ZipArchiveDecryptor {
    fn decrypt(&self, archive: EncryptedArchive) -> Result<DocumentBytes, ArchiveError> {
        // `password` is Zeroizing and goes out of scope on every return path
        let (bytes, password) = archive.into_parts();

        if !bytes.starts_with(ZIP_SIGNATURE) && !bytes.starts_with(EMPTY_ZIP_SIGNATURE) {
            return Err(ArchiveError::UnsupportedFormat(
                "not a zip archive".to_string(),
            ));
        }

        let mut zip = ZipArchive::new(Cursor::new(bytes.as_slice())).map_err(map_open_error)?;
        let (index, name, encrypted) = self.find_statement_entry(&mut zip)?;

        let entry = zip
            .by_index_decrypt(index, password.as_bytes())
            .map_err(map_open_error)?;

        let mut contents = Vec::new();
        // One byte past the cap tells an oversized entry apart from one that fits exactly
        let mut limited = entry.take(self.max_entry_bytes.saturating_add(1));
        if let Err(e) = limited.read_to_end(&mut contents) {
            // ZipCrypto only checks one byte of the key up front; a wrong
            // password that slips past it shows up as a checksum failure here.
            return Err(if encrypted {
                ArchiveError::WrongPassword
            } else {
                ArchiveError::CorruptArchive(e.to_string())
            });
        }

        if contents.len() as u64 > self.max_entry_bytes {
            return Err(self.too_large());
        }

        Ok(DocumentBytes {
            name,
            bytes: contents,
        })
    }
}

fn map_open_error(e: ZipError) -> ArchiveError {
    match e {
        ZipError::InvalidPassword => ArchiveError::WrongPassword,
        ZipError::UnsupportedArchive(msg) => ArchiveError::UnsupportedFormat(msg.to_string()),
        ZipError::InvalidArchive(msg) => ArchiveError::CorruptArchive(msg.to_string()),
        ZipError::FileNotFound => ArchiveError::CorruptArchive("entry not found".to_string()),
        ZipError::Io(io) => ArchiveError::CorruptArchive(io.to_string()),
        other => ArchiveError::CorruptArchive(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zeroize::Zeroizing;
    use zip::write::SimpleFileOptions;
    use zip::{AesMode, ZipWriter};

    fn build_zip(entries: &[(&str, &[u8])], password: Option<&str>) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            let options = SimpleFileOptions::default();
            match password {
                Some(pw) => writer
                    .start_file(*name, options.with_aes_encryption(AesMode::Aes256, pw))
                    .unwrap(),
                None => writer.start_file(*name, options).unwrap(),
            }
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn archive(bytes: Vec<u8>, password: &str) -> EncryptedArchive {
        EncryptedArchive::new(bytes, Zeroizing::new(password.to_string()))
    }

    #[test]
    fn test_decrypts_first_pdf_entry() {
        let bytes = build_zip(
            &[("readme.txt", b"hello"), ("statement.pdf", b"%PDF-1.4 body")],
            Some("s3cret"),
        );
        let doc = ZipArchiveDecryptor::new()
            .decrypt(archive(bytes, "s3cret"))
            .unwrap();
        assert_eq!(doc.name, "statement.pdf");
        assert_eq!(doc.bytes, b"%PDF-1.4 body");
    }

    #[test]
    fn test_wrong_password() {
        let bytes = build_zip(&[("statement.pdf", b"%PDF-1.4 body")], Some("s3cret"));
        let err = ZipArchiveDecryptor::new()
            .decrypt(archive(bytes, "guess"))
            .unwrap_err();
        assert_eq!(err, ArchiveError::WrongPassword);
        assert!(!err.to_string().contains("guess"));
    }

    #[test]
    fn test_not_a_zip() {
        let err = ZipArchiveDecryptor::new()
            .decrypt(archive(b"%PDF-1.4 plain".to_vec(), "x"))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_truncated_zip_is_corrupt() {
        let mut bytes = build_zip(&[("statement.pdf", b"%PDF-1.4 body")], Some("s3cret"));
        bytes.truncate(bytes.len() / 2);
        let err = ZipArchiveDecryptor::new()
            .decrypt(archive(bytes, "s3cret"))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::CorruptArchive(_)));
    }

    #[test]
    fn test_archive_without_pdf() {
        let bytes = build_zip(&[("notes.txt", b"nothing here")], Some("s3cret"));
        let err = ZipArchiveDecryptor::new()
            .decrypt(archive(bytes, "s3cret"))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_oversized_entry_is_rejected() {
        let bytes = build_zip(&[("statement.pdf", b"%PDF-1.4 body")], Some("s3cret"));
        let err = ZipArchiveDecryptor::new()
            .with_max_entry_bytes(8)
            .decrypt(archive(bytes, "s3cret"))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedFormat(_)));
    }

    /// Stored entry whose zip64 extra field declares an uncompressed size
    /// of `u64::MAX` while carrying only a few bytes of data
    fn zip64_with_huge_declared_size(name: &str, data: &[u8]) -> Vec<u8> {
        let crc = crc32(data);
        let mut extra = Vec::new();
        extra.extend_from_slice(&0x0001u16.to_le_bytes());
        extra.extend_from_slice(&16u16.to_le_bytes());
        extra.extend_from_slice(&u64::MAX.to_le_bytes());
        extra.extend_from_slice(&(data.len() as u64).to_le_bytes());

        let mut out = Vec::new();
        out.extend_from_slice(b"PK\x03\x04");
        out.extend_from_slice(&45u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&0u16.to_le_bytes()); // stored
        out.extend_from_slice(&0u16.to_le_bytes()); // time
        out.extend_from_slice(&0x0021u16.to_le_bytes()); // 1980-01-01
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&extra);
        out.extend_from_slice(data);

        let central_offset = out.len() as u32;
        out.extend_from_slice(b"PK\x01\x02");
        out.extend_from_slice(&45u16.to_le_bytes()); // made by
        out.extend_from_slice(&45u16.to_le_bytes()); // needed
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0x0021u16.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // comment
        out.extend_from_slice(&0u16.to_le_bytes()); // disk
        out.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        out.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        out.extend_from_slice(&0u32.to_le_bytes()); // local header offset
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&extra);
        let central_size = out.len() as u32 - central_offset;

        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&central_size.to_le_bytes());
        out.extend_from_slice(&central_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    fn crc32(data: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &byte in data {
            crc ^= byte as u32;
            for _ in 0..8 {
                crc = if crc & 1 == 1 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
            }
        }
        !crc
    }

    #[test]
    fn test_huge_declared_size_is_an_error_not_a_panic() {
        let bytes = zip64_with_huge_declared_size("statement.pdf", b"%PDF-1.4 body");
        let err = ZipArchiveDecryptor::new()
            .decrypt(archive(bytes, "s3cret"))
            .unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::UnsupportedFormat(_) | ArchiveError::CorruptArchive(_)
        ));
    }
}
