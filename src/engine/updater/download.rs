//! Firmware Download
//!
//! Fetches metadata and firmware archives into the admin domain's cache via
//! the update helper, then checks that the expected files actually landed.

use std::path::PathBuf;
use tracing::{debug, info};

use super::cache::{archive_name_from_url, ensure_hex_checksum, CacheLayout};
use super::command::{CommandRunner, ExternalCommand};
use super::error::UpdateError;
use super::model::Release;
use super::state::RunStage;
use super::transfer::TransferArtifact;
use super::verify::ArchiveVerifier;
use crate::engine::config::Config;

/// An archive present in the admin cache, re-hashed and extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArchive {
    pub name: String,
    pub checksum: String,
    pub archive_path: PathBuf,
    pub extracted_dir: PathBuf,
    pub metainfo_path: PathBuf,
}

impl DownloadedArchive {
    /// Handle for copying this archive into the USB domain.
    pub fn artifact(&self) -> TransferArtifact {
        TransferArtifact {
            name: self.name.clone(),
            checksum: self.checksum.clone(),
        }
    }
}

/// Download manager for metadata and update archives
pub struct Downloader<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    helper: String,
    cache: CacheLayout,
    prefix: String,
}

impl<'a, R: CommandRunner + ?Sized> Downloader<'a, R> {
    pub fn new(runner: &'a R, config: &Config) -> Self {
        Self {
            runner,
            helper: config.adminvm.update_helper.clone(),
            cache: CacheLayout::new(&config.adminvm.cache_dir),
            prefix: config.download_prefix.clone(),
        }
    }

    /// Download the signed metadata pair.
    pub fn download_metadata(&self) -> Result<(), UpdateError> {
        let command = ExternalCommand::new(&self.helper)
            .arg("--metadata")
            .interactive();
        self.run_helper(&command)
            .map_err(|reason| UpdateError::Refresh(format!("metadata download failed: {}", reason)))?;

        for path in [self.cache.metadata_file(), self.cache.metadata_signature()] {
            if !path.exists() {
                return Err(UpdateError::Refresh(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
        }
        info!(dir = %self.cache.metadata_dir().display(), "metadata downloaded");
        Ok(())
    }

    /// Download and extract the archive of a release.
    pub fn download_archive(&self, release: &Release) -> Result<DownloadedArchive, UpdateError> {
        let name = archive_name_from_url(&release.uri, &self.prefix)?;
        ensure_hex_checksum(&release.checksum)?;

        let command = ExternalCommand::new(&self.helper)
            .args([
                "--update".to_string(),
                format!("--url={}", release.uri),
                format!("--sha={}", release.checksum),
            ])
            .interactive();
        self.run_helper(&command).map_err(UpdateError::Download)?;

        let archive = DownloadedArchive {
            archive_path: self.cache.archive_path(&name),
            extracted_dir: self.cache.extracted_dir(&name),
            metainfo_path: self.cache.metainfo_path(&name),
            checksum: release.checksum.clone(),
            name,
        };
        if !archive.archive_path.is_file() {
            return Err(UpdateError::Download(format!(
                "firmware archive does not exist: {}",
                archive.archive_path.display()
            )));
        }
        if !archive.extracted_dir.is_dir() {
            return Err(UpdateError::Download(format!(
                "firmware update files do not exist: {}",
                archive.extracted_dir.display()
            )));
        }

        ArchiveVerifier::verify_checksum(&archive.archive_path, &archive.checksum).map_err(|e| {
            UpdateError::Validation {
                stage: RunStage::Downloaded,
                artifact: archive.name.clone(),
                reason: e.to_string(),
            }
        })?;
        debug!(archive = %archive.name, "checksum verified");
        info!(archive = %archive.name, version = %release.version, "firmware downloaded");
        Ok(archive)
    }

    fn run_helper(&self, command: &ExternalCommand) -> Result<(), String> {
        let output = self.runner.run(command).map_err(|e| e.to_string())?;
        if output.success() {
            Ok(())
        } else {
            Err(output.failure_reason())
        }
    }
}
