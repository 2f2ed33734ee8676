//! System Firmware Authenticity
//!
//! Cross-checks a downloaded system-firmware release against the live BIOS
//! identity read from DMI before it may be installed.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use super::command::{CommandRunner, ExternalCommand};
use super::model::UpdateMode;
use super::version::FirmwareVersion;

#[derive(Error, Debug)]
pub enum AuthenticityError {
    #[error("reading DMI failed: {0}")]
    HardwareRead(String),

    #[error("cannot read firmware metainfo {path}: {reason}")]
    Metainfo { path: String, reason: String },

    #[error("no vendor information in firmware metainfo")]
    MissingVendor,

    #[error("wrong firmware provider: {vendor:?} does not match the hardware vendor")]
    VendorMismatch { vendor: String },

    #[error("hardware does not report a BIOS version")]
    MissingHardwareVersion,

    #[error("hardware BIOS version {version:?} cannot be compared: {reason}")]
    InvalidHardwareVersion { version: String, reason: String },

    #[error("wrong firmware version: metainfo declares {declared}, selected {expected}")]
    VersionMismatch { declared: String, expected: String },

    #[error("{declared} < {installed}: downgrade not allowed through update")]
    DowngradeBlocked { declared: String, installed: String },
}

/// Live BIOS identity, read once per verification and never cached.
#[derive(Debug, Clone)]
pub struct HardwareIdentity {
    /// Full dmidecode text; vendor checks are substring searches over it
    raw: String,
    /// Value of the last `Version: ` line
    bios_version: Option<String>,
}

impl HardwareIdentity {
    pub fn from_dmi(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let bios_version = raw
            .lines()
            .filter_map(|line| line.split_once("Version: ").map(|(_, v)| v.trim()))
            .filter(|v| !v.is_empty())
            .last()
            .map(str::to_string);
        Self { raw, bios_version }
    }

    /// Run `dmidecode -t bios` through the given runner.
    pub fn read<R: CommandRunner + ?Sized>(runner: &R, dmidecode: &str) -> Result<Self, AuthenticityError> {
        let command = ExternalCommand::new(dmidecode).args(["-t", "bios"]);
        let output = runner
            .run(&command)
            .map_err(|e| AuthenticityError::HardwareRead(e.to_string()))?;
        if !output.success() {
            return Err(AuthenticityError::HardwareRead(output.failure_reason()));
        }
        Ok(Self::from_dmi(output.stdout))
    }

    pub fn mentions_vendor(&self, vendor: &str) -> bool {
        self.raw.contains(vendor)
    }

    pub fn bios_version(&self) -> Option<&str> {
        self.bios_version.as_deref()
    }
}

/// Vendor and version declared by a release's bundled metainfo document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirmwareMetainfo {
    pub vendor: Option<String>,
    pub version: Option<String>,
}

impl FirmwareMetainfo {
    /// Extract `<developer_name>` and the first `<releases><release version=…>`.
    pub fn parse(xml: &str) -> Result<Self, quick_xml::Error> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut info = Self::default();
        let mut path: Vec<String> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(ref e) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    if tag == "release" {
                        info.capture_release_version(&path, e)?;
                    }
                    path.push(tag);
                }
                Event::Empty(ref e) => {
                    if e.name().as_ref() == b"release" {
                        info.capture_release_version(&path, e)?;
                    }
                }
                Event::End(_) => {
                    path.pop();
                }
                Event::Text(ref e) => {
                    if path.len() == 2 && path[1] == "developer_name" && info.vendor.is_none() {
                        let text = e.unescape()?.trim().to_string();
                        if !text.is_empty() {
                            info.vendor = Some(text);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(info)
    }

    fn capture_release_version(
        &mut self,
        path: &[String],
        element: &quick_xml::events::BytesStart<'_>,
    ) -> Result<(), quick_xml::Error> {
        if self.version.is_some() || path.len() != 2 || path[1] != "releases" {
            return Ok(());
        }
        for attr in element.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            if attr.key.as_ref() == b"version" {
                self.version = Some(attr.unescape_value()?.into_owned());
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, AuthenticityError> {
        let metainfo_error = |reason: String| AuthenticityError::Metainfo {
            path: path.display().to_string(),
            reason,
        };
        let xml = std::fs::read_to_string(path).map_err(|e| metainfo_error(e.to_string()))?;
        Self::parse(&xml).map_err(|e| metainfo_error(e.to_string()))
    }
}

/// Check a system-firmware release about to be installed.
///
/// `expected_version` is the release version chosen for install. The
/// anti-regression rule only applies in update mode.
pub fn verify_system_firmware(
    hardware: &HardwareIdentity,
    metainfo: &FirmwareMetainfo,
    expected_version: &FirmwareVersion,
    mode: UpdateMode,
) -> Result<(), AuthenticityError> {
    let vendor = metainfo
        .vendor
        .as_deref()
        .ok_or(AuthenticityError::MissingVendor)?;
    if !hardware.mentions_vendor(vendor) {
        return Err(AuthenticityError::VendorMismatch {
            vendor: vendor.to_string(),
        });
    }

    let declared = metainfo.version.as_deref().unwrap_or_default();
    if declared != expected_version.as_str() {
        return Err(AuthenticityError::VersionMismatch {
            declared: declared.to_string(),
            expected: expected_version.to_string(),
        });
    }

    if mode == UpdateMode::Update {
        let installed = hardware
            .bios_version()
            .ok_or(AuthenticityError::MissingHardwareVersion)?;
        let current = FirmwareVersion::parse(installed).map_err(|e| {
            debug!(installed, error = %e, "unparsable BIOS version");
            AuthenticityError::InvalidHardwareVersion {
                version: installed.to_string(),
                reason: e.to_string(),
            }
        })?;
        if *expected_version < current {
            return Err(AuthenticityError::DowngradeBlocked {
                declared: declared.to_string(),
                installed: installed.to_string(),
            });
        }
    }

    info!(vendor, version = declared, ?mode, "system firmware matches hardware");
    Ok(())
}
