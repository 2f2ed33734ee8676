//! qubes-fwupd CLI Module
//! Command-line interface for firmware updates across Qubes domains

pub mod formatter;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "qubes-fwupd")]
#[command(version)]
#[command(about = "Firmware updates for dom0 and the USB qube", long_about = None)]
pub struct Cli {
    /// Search devices in sys-usb VM
    #[arg(long = "sys-usb", global = true)]
    pub sys_usb: bool,

    /// Configuration file (defaults to /etc/qubes-fwupd/config.json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Get all devices that support firmware updates
    GetDevices,

    /// Gets the list of updates for connected hardware
    GetUpdates,

    /// Refresh metadata from remote server
    Refresh,

    /// Updates chosen device to latest firmware version
    Update,

    /// Downgrade chosen device to chosen firmware version
    Downgrade,

    /// Deletes all cached update files
    Clean,
}

impl Commands {
    /// Commands that talk to the firmware engine or the network.
    pub fn needs_tools(&self) -> bool {
        !matches!(self, Self::Clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sys_usb_anywhere() {
        let cli = Cli::try_parse_from(["qubes-fwupd", "update", "--sys-usb"]).unwrap();
        assert!(cli.sys_usb);
        assert_eq!(cli.command, Commands::Update);

        let cli = Cli::try_parse_from(["qubes-fwupd", "--sys-usb", "get-devices"]).unwrap();
        assert!(cli.sys_usb);
        assert_eq!(cli.command, Commands::GetDevices);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["qubes-fwupd", "get-updates"]).unwrap();
        assert!(!cli.sys_usb);
        assert!(!cli.verbose);
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_json_format_and_config() {
        let cli = Cli::try_parse_from([
            "qubes-fwupd",
            "--format",
            "json",
            "--config",
            "/tmp/fwupd.json",
            "downgrade",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/fwupd.json")));
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["qubes-fwupd", "install"]).is_err());
        assert!(Cli::try_parse_from(["qubes-fwupd"]).is_err());
    }
}
