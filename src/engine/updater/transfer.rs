//! Cross-Domain Transfer Protocol
//!
//! Moves metadata and firmware archives from the admin domain into the USB
//! domain. Each artifact goes `NotPresent -> Copied -> Validated -> Consumed`:
//! the USB domain's engine only ever receives an artifact wrapped in
//! [`Validated`], and only [`UsbVmTransfer`] can construct one, after the
//! domain-side validator accepted it. Copy requires a [`DirectoriesReady`]
//! token from the directory precondition check.

use std::fmt;
use tracing::{info, warn};

use super::cache::CacheLayout;
use super::command::{CommandRunner, ExternalCommand, UsbVmShell};
use super::error::UpdateError;
use super::model::Domain;
use super::state::RunStage;
use crate::engine::config::Config;

/// Lifecycle position of a transferred artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArtifactState {
    NotPresent,
    Copied,
    Validated,
    Consumed,
}

/// Something that crosses into the USB domain.
pub trait Artifact: fmt::Display {
    /// Run stage a failed copy or validation of this artifact aborts.
    const STAGE: RunStage;
}

/// The signed metadata pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFeed;

impl Artifact for MetadataFeed {
    const STAGE: RunStage = RunStage::MetadataRefreshed;
}

impl fmt::Display for MetadataFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("metadata")
    }
}

/// A firmware archive and the checksum the validator checks it against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferArtifact {
    pub name: String,
    pub checksum: String,
}

impl Artifact for TransferArtifact {
    const STAGE: RunStage = RunStage::Transferred;
}

impl fmt::Display for TransferArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Proof that the USB domain's cache directories passed validation.
#[derive(Debug)]
pub struct DirectoriesReady {
    _private: (),
}

/// An artifact present in the USB domain but not yet validated.
#[derive(Debug)]
pub struct Copied<A> {
    artifact: A,
}

impl<A> Copied<A> {
    pub fn artifact(&self) -> &A {
        &self.artifact
    }

    pub fn state(&self) -> ArtifactState {
        ArtifactState::Copied
    }
}

/// An artifact the USB domain's validator accepted.
#[derive(Debug)]
pub struct Validated<A> {
    artifact: A,
}

impl<A> Validated<A> {
    pub fn artifact(&self) -> &A {
        &self.artifact
    }

    pub fn state(&self) -> ArtifactState {
        ArtifactState::Validated
    }
}

/// Drives the validator and engine inside the USB domain.
pub struct UsbVmTransfer<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    shell: UsbVmShell,
    admin: CacheLayout,
    usbvm: CacheLayout,
    validator: String,
    fwupdmgr: String,
    remote_id: String,
}

impl<'a, R: CommandRunner + ?Sized> UsbVmTransfer<'a, R> {
    pub fn new(runner: &'a R, config: &Config) -> Self {
        Self {
            runner,
            shell: UsbVmShell::new(config),
            admin: CacheLayout::new(&config.adminvm.cache_dir),
            usbvm: CacheLayout::new(&config.usbvm.cache_dir),
            validator: config.usbvm.validator.clone(),
            fwupdmgr: config.usbvm.fwupdmgr.clone(),
            remote_id: config.remote_id.clone(),
        }
    }

    /// Verify (and create if needed) the USB domain's cache directories.
    ///
    /// `stage` is the run stage the check is part of.
    pub fn prepare(&self, stage: RunStage) -> Result<DirectoriesReady, UpdateError> {
        let command = self.shell.script(&format!("{} dirs", self.validator));
        self.execute(&command).map_err(|reason| UpdateError::Directory {
            stage,
            domain: Domain::UsbVm,
            reason,
        })?;
        Ok(DirectoriesReady { _private: () })
    }

    pub fn copy_metadata(&self, _ready: &DirectoriesReady) -> Result<Copied<MetadataFeed>, UpdateError> {
        for (source, dest) in [
            (self.admin.metadata_file(), self.usbvm.metadata_file()),
            (self.admin.metadata_signature(), self.usbvm.metadata_signature()),
        ] {
            let command = self.shell.write_file(&source, &dest);
            self.execute(&command).map_err(|reason| UpdateError::Copy {
                stage: MetadataFeed::STAGE,
                artifact: dest.display().to_string(),
                reason,
            })?;
        }
        info!(vm = self.shell.vm_name(), "metadata copied");
        Ok(Copied {
            artifact: MetadataFeed,
        })
    }

    /// Ask the validator to check the metadata signature.
    pub fn validate_metadata(&self, copied: Copied<MetadataFeed>) -> Result<Validated<MetadataFeed>, UpdateError> {
        let command = self.shell.script(&format!("{} metadata", self.validator));
        self.execute(&command).map_err(|reason| UpdateError::Validation {
            stage: MetadataFeed::STAGE,
            artifact: copied.artifact.to_string(),
            reason,
        })?;
        Ok(Validated {
            artifact: copied.artifact,
        })
    }

    /// Load validated metadata into the USB domain's engine.
    pub fn refresh(&self, metadata: Validated<MetadataFeed>) -> Result<ArtifactState, UpdateError> {
        let command = self.shell.script(&format!(
            "{} refresh {} {} {}",
            self.fwupdmgr,
            self.usbvm.metadata_file().display(),
            self.usbvm.metadata_signature().display(),
            self.remote_id
        ));
        self.execute(&command)
            .map_err(|reason| UpdateError::Refresh(format!("{}: {}", Domain::UsbVm, reason)))?;
        info!(vm = self.shell.vm_name(), artifact = %metadata.artifact, "metadata refreshed");
        Ok(ArtifactState::Consumed)
    }

    pub fn copy_archive(
        &self,
        _ready: &DirectoriesReady,
        artifact: TransferArtifact,
    ) -> Result<Copied<TransferArtifact>, UpdateError> {
        let source = self.admin.archive_path(&artifact.name);
        let dest = self.usbvm.archive_path(&artifact.name);
        let command = self.shell.write_file(&source, &dest);
        self.execute(&command).map_err(|reason| UpdateError::Copy {
            stage: TransferArtifact::STAGE,
            artifact: artifact.name.clone(),
            reason,
        })?;
        info!(vm = self.shell.vm_name(), archive = %artifact, "archive copied");
        Ok(Copied { artifact })
    }

    /// Ask the validator to check the archive against its checksum.
    pub fn validate_archive(
        &self,
        copied: Copied<TransferArtifact>,
    ) -> Result<Validated<TransferArtifact>, UpdateError> {
        let artifact = copied.artifact;
        let command = self.shell.script(&format!(
            "{} updates {} {}",
            self.validator,
            self.usbvm.archive_path(&artifact.name).display(),
            artifact.checksum
        ));
        if let Err(reason) = self.execute(&command) {
            warn!(archive = %artifact, %reason, "archive rejected by validator");
            return Err(UpdateError::Validation {
                stage: TransferArtifact::STAGE,
                artifact: artifact.name,
                reason,
            });
        }
        Ok(Validated { artifact })
    }

    pub fn install(
        &self,
        archive: Validated<TransferArtifact>,
        allow_older: bool,
    ) -> Result<ArtifactState, UpdateError> {
        let flag = if allow_older { " --allow-older" } else { "" };
        let command = self.shell.script(&format!(
            "{}{} install {}",
            self.fwupdmgr,
            flag,
            self.usbvm.archive_path(&archive.artifact.name).display()
        ));
        let output = self
            .runner
            .run(&command.interactive())
            .map_err(|e| UpdateError::command(RunStage::Installed, &self.fwupdmgr, e))?;
        if !output.success() {
            return Err(UpdateError::Install {
                domain: Domain::UsbVm,
                reason: output.failure_reason(),
            });
        }
        info!(vm = self.shell.vm_name(), archive = %archive.artifact, allow_older, "firmware installed");
        Ok(ArtifactState::Consumed)
    }

    /// Remove cached metadata and archives inside the USB domain.
    pub fn clean(&self) -> Result<(), UpdateError> {
        let command = self.shell.script(&format!("{} clean", self.validator));
        self.execute(&command).map_err(UpdateError::Clean)
    }

    fn execute(&self, command: &ExternalCommand) -> Result<(), String> {
        let output = self.runner.run(command).map_err(|e| e.to_string())?;
        if output.success() {
            Ok(())
        } else {
            Err(output.failure_reason())
        }
    }
}
