//! Device and Release Model
//!
//! Normalized view of the firmware inventory of one or both domains, plus the
//! per-run candidate set and selection built from it.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::version::FirmwareVersion;

/// Execution context a device belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Privileged administrative domain (dom0)
    AdminVm,
    /// Isolated domain owning the USB controllers
    UsbVm,
}

impl Domain {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AdminVm => "adminvm",
            Self::UsbVm => "usbvm",
        }
    }

    /// Heading used in terminal listings.
    pub fn title(&self) -> &'static str {
        match self {
            Self::AdminVm => "Dom0",
            Self::UsbVm => "sys-usb",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a run installs newer firmware or rolls back to older firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    Update,
    Downgrade,
}

impl UpdateMode {
    /// Installer flag permitting a version below the installed one.
    pub fn allow_older(&self) -> bool {
        matches!(self, Self::Downgrade)
    }

    /// Release eligibility relative to the device's installed version.
    pub fn is_eligible(&self, candidate: &FirmwareVersion, current: &FirmwareVersion) -> bool {
        match self {
            Self::Update => candidate.is_newer_than(current),
            Self::Downgrade => candidate.is_older_than(current),
        }
    }
}

/// Device classification that decides whether hardware authenticity checks apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    /// The machine's own BIOS/UEFI firmware
    SystemFirmware,
    Peripheral,
}

impl DeviceClass {
    const SYSTEM_FIRMWARE_NAME: &'static str = "System Firmware";

    /// Classify from the engine-reported plugin and name.
    ///
    /// UEFI plugins always manage system firmware; the canonical device name
    /// is accepted as well so a renamed plugin cannot skip the check.
    pub fn classify(name: &str, plugin: Option<&str>) -> Self {
        let uefi_plugin = plugin
            .map(|p| p == "uefi" || p.starts_with("uefi_"))
            .unwrap_or(false);
        if uefi_plugin || name == Self::SYSTEM_FIRMWARE_NAME {
            Self::SystemFirmware
        } else {
            Self::Peripheral
        }
    }

    pub fn requires_authenticity_check(&self) -> bool {
        matches!(self, Self::SystemFirmware)
    }
}

/// One published firmware version for a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Release {
    pub version: FirmwareVersion,
    pub uri: String,
    /// Primary content digest, treated as an opaque integrity token
    pub checksum: String,
    /// May contain simple markup; strip only for display
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub name: String,
    pub domain: Domain,
    pub class: DeviceClass,
    pub current_version: Option<FirmwareVersion>,
    pub releases: Vec<Release>,
}

impl Device {
    /// Index and release with the greatest version.
    pub fn latest_release(&self) -> Option<(usize, &Release)> {
        self.releases
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.version.cmp(&b.version))
    }
}

/// Eligible devices of one run, administrative domain first.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateCandidateSet {
    pub mode: UpdateMode,
    pub adminvm: Vec<Device>,
    pub usbvm: Vec<Device>,
}

impl UpdateCandidateSet {
    /// Build from per-domain parser output, dropping devices without releases.
    pub fn build(mode: UpdateMode, adminvm: Vec<Device>, usbvm: Option<Vec<Device>>) -> Self {
        let keep = |devices: Vec<Device>| -> Vec<Device> {
            devices
                .into_iter()
                .filter(|d| !d.releases.is_empty())
                .collect()
        };
        Self {
            mode,
            adminvm: keep(adminvm),
            usbvm: keep(usbvm.unwrap_or_default()),
        }
    }

    pub fn len(&self) -> usize {
        self.adminvm.len() + self.usbvm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn devices(&self, domain: Domain) -> &[Device] {
        match domain {
            Domain::AdminVm => &self.adminvm,
            Domain::UsbVm => &self.usbvm,
        }
    }

    /// Flat listing in display order: adminvm devices, then usbvm devices.
    pub fn entries(&self) -> impl Iterator<Item = (Domain, usize, &Device)> {
        let admin = self
            .adminvm
            .iter()
            .enumerate()
            .map(|(i, d)| (Domain::AdminVm, i, d));
        let usb = self
            .usbvm
            .iter()
            .enumerate()
            .map(|(i, d)| (Domain::UsbVm, i, d));
        admin.chain(usb)
    }

    /// Map a zero-based flat index back to `(domain, device index)`.
    pub fn resolve(&self, flat_index: usize) -> Option<(Domain, usize)> {
        if flat_index < self.adminvm.len() {
            Some((Domain::AdminVm, flat_index))
        } else if flat_index < self.len() {
            Some((Domain::UsbVm, flat_index - self.adminvm.len()))
        } else {
            None
        }
    }

    /// Resolve a selection into the device and release it designates.
    ///
    /// Without an explicit release the latest one is chosen. Out-of-range
    /// indices yield `None`.
    pub fn target(&self, selection: &SelectionResult) -> Option<InstallTarget> {
        let device = self.devices(selection.domain).get(selection.device_index)?;
        let release = match selection.release_index {
            Some(index) => device.releases.get(index)?,
            None => device.latest_release()?.1,
        };
        Some(InstallTarget {
            domain: selection.domain,
            device_name: device.name.clone(),
            class: device.class,
            current_version: device.current_version.clone(),
            release: release.clone(),
        })
    }
}

/// The caller's choice within an [`UpdateCandidateSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectionResult {
    pub domain: Domain,
    pub device_index: usize,
    pub release_index: Option<usize>,
}

/// A resolved selection: what gets downloaded, verified and installed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallTarget {
    pub domain: Domain,
    pub device_name: String,
    pub class: DeviceClass,
    pub current_version: Option<FirmwareVersion>,
    pub release: Release,
}
