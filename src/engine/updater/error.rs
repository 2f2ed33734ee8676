//! Update Error Types

use std::io;
use thiserror::Error;

use super::authenticity::AuthenticityError;
use super::cache::ArchiveNameError;
use super::metadata::ParseError;
use super::model::Domain;
use super::state::RunStage;
use crate::engine::config::ConfigError;

/// Process exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
/// Nothing to install, or the operator abandoned the selection
pub const EXIT_NO_UPDATES: i32 = 99;

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Preflight check failed: {0}")]
    Preflight(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to run {command}: {source}")]
    Command {
        stage: RunStage,
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Metadata refresh failed: {0}")]
    Refresh(String),

    #[error("Getting {domain} devices failed: {reason}")]
    Enumerate { domain: Domain, reason: String },

    #[error("Malformed {domain} device inventory: {source}")]
    Parse {
        domain: Domain,
        #[source]
        source: ParseError,
    },

    #[error("Reading the selection failed: {0}")]
    Prompt(#[source] io::Error),

    #[error("Selection does not designate an installable release")]
    InvalidSelection,

    #[error("Firmware download failed: {0}")]
    Download(String),

    #[error("Reading hardware identity failed: {0}")]
    HardwareRead(String),

    #[error("Authenticity check failed: {0}")]
    Authenticity(#[source] AuthenticityError),

    #[error("Authenticity check failed: {0}")]
    VersionMismatch(#[source] AuthenticityError),

    #[error("Authenticity check failed: {0}")]
    DowngradeBlocked(#[source] AuthenticityError),

    #[error("Validation of {domain} directories failed: {reason}")]
    Directory {
        stage: RunStage,
        domain: Domain,
        reason: String,
    },

    #[error("Copying {artifact} failed: {reason}")]
    Copy {
        stage: RunStage,
        artifact: String,
        reason: String,
    },

    #[error("Validation of {artifact} failed: {reason}")]
    Validation {
        stage: RunStage,
        artifact: String,
        reason: String,
    },

    #[error("Firmware install in {domain} failed: {reason}")]
    Install { domain: Domain, reason: String },

    #[error("Cleaning cache failed: {0}")]
    Clean(String),
}

impl UpdateError {
    /// The stage the run was trying to reach when it failed.
    pub fn stage(&self) -> RunStage {
        match self {
            Self::Command { stage, .. }
            | Self::Directory { stage, .. }
            | Self::Copy { stage, .. }
            | Self::Validation { stage, .. } => *stage,
            Self::Preflight(_) | Self::Config(_) | Self::Clean(_) => RunStage::Idle,
            Self::Refresh(_) => RunStage::MetadataRefreshed,
            Self::Enumerate { .. } | Self::Parse { .. } => RunStage::CandidatesBuilt,
            Self::Prompt(_) | Self::InvalidSelection => RunStage::Selected,
            Self::Download(_) => RunStage::Downloaded,
            Self::HardwareRead(_)
            | Self::Authenticity(_)
            | Self::VersionMismatch(_)
            | Self::DowngradeBlocked(_) => RunStage::AuthenticityChecked,
            Self::Install { .. } => RunStage::Installed,
        }
    }

    /// A command that could not be started while working towards `stage`.
    pub fn command(stage: RunStage, command: &impl ToString, source: io::Error) -> Self {
        Self::Command {
            stage,
            command: command.to_string(),
            source,
        }
    }
}

impl From<AuthenticityError> for UpdateError {
    fn from(e: AuthenticityError) -> Self {
        match e {
            AuthenticityError::HardwareRead(reason) => Self::HardwareRead(reason),
            AuthenticityError::VersionMismatch { .. } => Self::VersionMismatch(e),
            AuthenticityError::DowngradeBlocked { .. } => Self::DowngradeBlocked(e),
            other => Self::Authenticity(other),
        }
    }
}

impl From<ArchiveNameError> for UpdateError {
    fn from(e: ArchiveNameError) -> Self {
        Self::Download(e.to_string())
    }
}
