//! Cache Layout
//!
//! Per-domain filesystem layout for downloaded metadata and firmware archives.
//! The same layout describes the local admin cache and the paths inside the
//! USB domain; only the admin side is touched through `std::fs`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const METADATA_FILE: &str = "firmware.xml.gz";
pub const METADATA_SIGNATURE: &str = "firmware.xml.gz.asc";
pub const METAINFO_FILE: &str = "firmware.metainfo.xml";
const ARCHIVE_EXTENSION: &str = ".cab";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchiveNameError {
    #[error("{url} is not served from {prefix}")]
    ForeignSource { url: String, prefix: String },
    #[error("archive name {0:?} contains characters outside [A-Za-z0-9._-]")]
    UnsafeName(String),
    #[error("checksum {0:?} is not a hexadecimal digest")]
    UnsafeChecksum(String),
}

/// Filesystem layout of one domain's fwupd cache.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    base_dir: PathBuf,
}

impl CacheLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.base_dir.join("metadata")
    }

    pub fn updates_dir(&self) -> PathBuf {
        self.base_dir.join("updates")
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.metadata_dir().join(METADATA_FILE)
    }

    pub fn metadata_signature(&self) -> PathBuf {
        self.metadata_dir().join(METADATA_SIGNATURE)
    }

    pub fn archive_path(&self, archive_name: &str) -> PathBuf {
        self.updates_dir().join(archive_name)
    }

    /// Directory the update helper extracts an archive into.
    pub fn extracted_dir(&self, archive_name: &str) -> PathBuf {
        let stem = archive_name
            .strip_suffix(ARCHIVE_EXTENSION)
            .unwrap_or(archive_name);
        self.updates_dir().join(stem)
    }

    pub fn metainfo_path(&self, archive_name: &str) -> PathBuf {
        self.extracted_dir(archive_name).join(METAINFO_FILE)
    }

    /// Create metadata and updates directories.
    pub fn init(&self) -> io::Result<()> {
        fs::create_dir_all(self.metadata_dir())?;
        fs::create_dir_all(self.updates_dir())?;
        Ok(())
    }

    /// Remove cached metadata and archives. Missing directories are fine.
    pub fn clean(&self) -> io::Result<()> {
        for dir in [self.metadata_dir(), self.updates_dir()] {
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
        }
        Ok(())
    }
}

/// Derive the cache file name of an archive from its download URI.
///
/// The name ends up in shell command lines executed in the USB domain, so
/// anything outside a conservative character set is refused.
pub fn archive_name_from_url(url: &str, prefix: &str) -> Result<String, ArchiveNameError> {
    let name = url
        .strip_prefix(prefix)
        .ok_or_else(|| ArchiveNameError::ForeignSource {
            url: url.to_string(),
            prefix: prefix.to_string(),
        })?;

    let safe = !name.is_empty()
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    if !safe {
        return Err(ArchiveNameError::UnsafeName(name.to_string()));
    }
    Ok(name.to_string())
}

/// Checksums are passed to helpers on command lines; only hex digests pass.
pub fn ensure_hex_checksum(checksum: &str) -> Result<(), ArchiveNameError> {
    if !checksum.is_empty() && checksum.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(ArchiveNameError::UnsafeChecksum(checksum.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PREFIX: &str = "https://fwupd.org/downloads/";

    #[test]
    fn test_layout_paths() {
        let layout = CacheLayout::new("/root/.cache/fwupd");
        assert_eq!(
            layout.metadata_file(),
            PathBuf::from("/root/.cache/fwupd/metadata/firmware.xml.gz")
        );
        assert_eq!(
            layout.metadata_signature(),
            PathBuf::from("/root/.cache/fwupd/metadata/firmware.xml.gz.asc")
        );
        assert_eq!(
            layout.metainfo_path("abc-fw-1.2.cab"),
            PathBuf::from("/root/.cache/fwupd/updates/abc-fw-1.2/firmware.metainfo.xml")
        );
    }

    #[test]
    fn test_init_and_clean() {
        let dir = tempdir().unwrap();
        let layout = CacheLayout::new(dir.path());
        layout.init().unwrap();
        assert!(layout.metadata_dir().exists());
        assert!(layout.updates_dir().exists());

        fs::write(layout.archive_path("a.cab"), b"cab").unwrap();
        layout.clean().unwrap();
        assert!(!layout.metadata_dir().exists());
        assert!(!layout.updates_dir().exists());

        // Cleaning twice is harmless
        layout.clean().unwrap();
    }

    #[test]
    fn test_archive_name_from_url() {
        let name = archive_name_from_url(
            "https://fwupd.org/downloads/0a29848de74d26348bc5a6e24fc9f03778eddf0e-hughski-colorhug2-2.0.7.cab",
            PREFIX,
        )
        .unwrap();
        assert_eq!(name, "0a29848de74d26348bc5a6e24fc9f03778eddf0e-hughski-colorhug2-2.0.7.cab");
    }

    #[test]
    fn test_archive_name_rejects_foreign_and_unsafe() {
        assert!(matches!(
            archive_name_from_url("https://evil.example/a.cab", PREFIX),
            Err(ArchiveNameError::ForeignSource { .. })
        ));
        for url in [
            "https://fwupd.org/downloads/a.cab; rm -rf /",
            "https://fwupd.org/downloads/../a.cab",
            "https://fwupd.org/downloads/sub/a.cab",
            "https://fwupd.org/downloads/$(id).cab",
            "https://fwupd.org/downloads/",
        ] {
            assert!(
                matches!(archive_name_from_url(url, PREFIX), Err(ArchiveNameError::UnsafeName(_))),
                "{} accepted",
                url
            );
        }
    }

    #[test]
    fn test_hex_checksum() {
        assert!(ensure_hex_checksum("490be5c0b13ca4a3f169bf8bc682ba127b8f7b96").is_ok());
        assert!(ensure_hex_checksum("").is_err());
        assert!(ensure_hex_checksum("abc\" && reboot").is_err());
    }
}
