//! Device Inventory Parser
//!
//! Turns the JSON document reported by the firmware engine of one domain
//! into the normalized [`Device`] model, keeping only the releases that are
//! eligible for the requested [`UpdateMode`].

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::model::{Device, DeviceClass, Domain, Release, UpdateMode};
use super::version::FirmwareVersion;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid device inventory JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("device without a name in {domain} inventory")]
    MissingDeviceName { domain: Domain },

    #[error("release {version} of {device} is missing required field {field}")]
    MissingField {
        device: String,
        version: String,
        field: &'static str,
    },

    #[error("release of {device} has an unusable version: {reason}")]
    BadReleaseVersion { device: String, reason: String },
}

/// Top-level shape of `fwupdagent get-devices` / `get-updates`.
#[derive(Debug, Deserialize)]
struct RawInventory {
    #[serde(rename = "Devices", default)]
    devices: Vec<RawDevice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDevice {
    name: Option<String>,
    version: Option<String>,
    plugin: Option<String>,
    releases: Option<Vec<RawRelease>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawRelease {
    version: Option<String>,
    uri: Option<String>,
    #[serde(default)]
    checksum: Vec<String>,
    description: Option<String>,
}

/// Parse one domain's inventory for the given mode.
///
/// Every device is returned. Devices whose installed version is absent or
/// unparsable get an empty release list, since eligibility cannot be
/// evaluated for them. Releases that are eligible must carry `Uri`,
/// `Checksum` and `Description`.
pub fn parse_inventory(json: &str, domain: Domain, mode: UpdateMode) -> Result<Vec<Device>, ParseError> {
    let inventory: RawInventory = serde_json::from_str(json)?;
    let mut devices = Vec::with_capacity(inventory.devices.len());

    for raw in inventory.devices {
        let name = raw
            .name
            .clone()
            .ok_or(ParseError::MissingDeviceName { domain })?;
        let class = DeviceClass::classify(&name, raw.plugin.as_deref());

        let current_version = match raw.version.as_deref().map(FirmwareVersion::parse) {
            Some(Ok(version)) => Some(version),
            Some(Err(e)) => {
                warn!(device = %name, error = %e, "ignoring unparsable installed version");
                None
            }
            None => None,
        };

        let releases = match (&current_version, raw.releases) {
            (Some(current), Some(releases)) => {
                eligible_releases(&name, current, releases, mode)?
            }
            (None, Some(_)) => {
                debug!(device = %name, "no installed version, skipping release evaluation");
                Vec::new()
            }
            (_, None) => Vec::new(),
        };

        devices.push(Device {
            name,
            domain,
            class,
            current_version,
            releases,
        });
    }

    Ok(devices)
}

fn eligible_releases(
    device: &str,
    current: &FirmwareVersion,
    releases: Vec<RawRelease>,
    mode: UpdateMode,
) -> Result<Vec<Release>, ParseError> {
    let mut eligible = Vec::new();

    for raw in releases {
        let version = match raw.version.as_deref() {
            Some(v) => match FirmwareVersion::parse(v) {
                Ok(version) => version,
                Err(e) if mode == UpdateMode::Update => {
                    return Err(ParseError::BadReleaseVersion {
                        device: device.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    debug!(device, error = %e, "skipping release with unusable version");
                    continue;
                }
            },
            // An update listing only contains installable releases, so a
            // versionless entry there is malformed.
            None if mode == UpdateMode::Update => {
                return Err(ParseError::MissingField {
                    device: device.to_string(),
                    version: "<unknown>".to_string(),
                    field: "Version",
                });
            }
            None => {
                debug!(device, "skipping release without version");
                continue;
            }
        };

        if !mode.is_eligible(&version, current) {
            continue;
        }

        let missing = |field: &'static str| ParseError::MissingField {
            device: device.to_string(),
            version: version.to_string(),
            field,
        };
        let uri = raw.uri.ok_or_else(|| missing("Uri"))?;
        let checksum = raw
            .checksum
            .into_iter()
            .next()
            .ok_or_else(|| missing("Checksum"))?;
        let description = raw.description.ok_or_else(|| missing("Description"))?;

        eligible.push(Release {
            version,
            uri,
            checksum,
            description,
        });
    }

    Ok(eligible)
}
