//! Qubes Firmware Update Configuration
//! Handles loading qubes-fwupd config.json and the built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/qubes-fwupd/config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub adminvm: AdminVmConfig,
    pub usbvm: UsbVmConfig,
    /// Cross-domain execution tool
    pub qvm_run: String,
    /// URI prefix every firmware archive must be served from
    pub download_prefix: String,
    /// Remote identifier passed to `fwupdmgr refresh`
    pub remote_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminVmConfig {
    pub cache_dir: PathBuf,
    pub update_helper: String,
    pub fwupdmgr: String,
    pub fwupdagent: String,
    pub dmidecode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbVmConfig {
    pub name: String,
    pub cache_dir: PathBuf,
    pub fwupdmgr: String,
    pub fwupdagent: String,
    pub validator: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adminvm: AdminVmConfig::default(),
            usbvm: UsbVmConfig::default(),
            qvm_run: "qvm-run".to_string(),
            download_prefix: "https://fwupd.org/downloads/".to_string(),
            remote_id: "lvfs".to_string(),
        }
    }
}

impl Default for AdminVmConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("/root/.cache/fwupd"),
            update_helper: "/usr/share/qubes-fwupd/src/fwupd-dom0-update".to_string(),
            fwupdmgr: "/bin/fwupdmgr".to_string(),
            fwupdagent: "/bin/fwupdagent".to_string(),
            dmidecode: "dmidecode".to_string(),
        }
    }
}

impl Default for UsbVmConfig {
    fn default() -> Self {
        Self {
            name: "sys-usb".to_string(),
            cache_dir: PathBuf::from("/home/user/.cache/fwupd"),
            fwupdmgr: "/bin/fwupdmgr".to_string(),
            fwupdagent: "/usr/libexec/fwupd/fwupdagent".to_string(),
            validator: "/usr/share/qubes-fwupd/fwupd_usbvm_validate.py".to_string(),
        }
    }
}

impl Config {
    /// Load from an explicit path, which must exist.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path.to_path_buf()));
        }
        let content = std::fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if given, otherwise the system config if present, otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let system = Path::new(DEFAULT_CONFIG_PATH);
                if system.exists() {
                    Self::load(system)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
