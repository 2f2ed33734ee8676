//! Qubes Firmware Update System
//!
//! Firmware updates for the admin domain and the USB-owning domain, with
//! every artifact that crosses into the USB domain re-validated there.
//!
//! Components:
//! - `version` - Firmware version ordering
//! - `model` - Devices, releases and candidate sets
//! - `metadata` - Device inventory parsing
//! - `authenticity` - DMI cross-check for system firmware
//! - `command` - External command execution
//! - `fwupd` - Firmware engine client
//! - `cache` - Per-domain cache layout
//! - `download` - Metadata and archive download
//! - `verify` - Archive checksum verification
//! - `transfer` - Copy and validate protocol for the USB domain
//! - `selection` - Operator prompts
//! - `state` - Run stages and outcomes
//! - `preflight` - Privilege and tool checks
//! - `orchestrator` - End-to-end update runs

pub mod authenticity;
pub mod cache;
pub mod command;
pub mod download;
pub mod error;
pub mod fwupd;
pub mod metadata;
pub mod model;
pub mod orchestrator;
pub mod preflight;
pub mod selection;
pub mod state;
pub mod transfer;
pub mod verify;
pub mod version;

pub use command::{CommandRunner, SystemRunner};
pub use error::{UpdateError, EXIT_ERROR, EXIT_NO_UPDATES, EXIT_SUCCESS};
pub use model::{Device, Domain, UpdateCandidateSet, UpdateMode};
pub use orchestrator::UpdateOrchestrator;
pub use selection::Operator;
pub use state::{RunOutcome, RunStage};
pub use version::FirmwareVersion;
