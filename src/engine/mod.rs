// qubes-fwupd engine - core module structure
pub mod cli;
pub mod config;
pub mod updater;

pub use config::Config;
