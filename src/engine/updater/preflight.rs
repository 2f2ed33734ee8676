//! Preflight Checks
//!
//! Verifies the environment before any command touches the firmware engine:
//! the process must run as root and every external tool it will call must
//! resolve to an executable.

use std::path::PathBuf;
use tracing::debug;

use super::error::UpdateError;
use crate::engine::config::Config;

/// Preflight check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightResult {
    Ready,
    NotRoot,
    MissingTool { tool: String, reason: String },
}

impl PreflightResult {
    pub fn into_result(self) -> Result<(), UpdateError> {
        match self {
            Self::Ready => Ok(()),
            Self::NotRoot => Err(UpdateError::Preflight(
                "You need to have root privileges to run this tool".to_string(),
            )),
            Self::MissingTool { tool, reason } => {
                Err(UpdateError::Preflight(format!("{} is not available: {}", tool, reason)))
            }
        }
    }
}

pub struct PreflightChecker<'a> {
    config: &'a Config,
    usbvm: bool,
}

impl<'a> PreflightChecker<'a> {
    pub fn new(config: &'a Config, usbvm: bool) -> Self {
        Self { config, usbvm }
    }

    /// Tools run locally by a full update cycle.
    pub fn required_tools(&self) -> Vec<&'a str> {
        let admin = &self.config.adminvm;
        let mut tools = vec![
            admin.update_helper.as_str(),
            admin.fwupdmgr.as_str(),
            admin.fwupdagent.as_str(),
            admin.dmidecode.as_str(),
        ];
        if self.usbvm {
            tools.push(self.config.qvm_run.as_str());
        }
        tools
    }

    /// Locate a tool by absolute path or in `PATH`.
    pub fn locate(tool: &str) -> Result<PathBuf, String> {
        which::which(tool).map_err(|e| e.to_string())
    }

    pub fn check_tools(&self) -> PreflightResult {
        for tool in self.required_tools() {
            match Self::locate(tool) {
                Ok(path) => debug!(tool, path = %path.display(), "tool found"),
                Err(reason) => {
                    return PreflightResult::MissingTool {
                        tool: tool.to_string(),
                        reason,
                    }
                }
            }
        }
        PreflightResult::Ready
    }

    /// Full check: privileges first, then tools.
    pub fn check(&self) -> PreflightResult {
        if !is_root() {
            return PreflightResult::NotRoot;
        }
        self.check_tools()
    }
}

/// True when the effective user is root.
#[cfg(unix)]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}
