//! Update Orchestrator
//!
//! Sequences one run across the admin domain and, when enabled, the USB
//! domain: refresh, enumerate, select, download, verify, transfer, install.
//! Every step blocks until its external command completes. Any failure ends
//! the run; nothing already done is rolled back.

use tracing::{info, warn};

use super::authenticity::{verify_system_firmware, FirmwareMetainfo, HardwareIdentity};
use super::cache::CacheLayout;
use super::command::CommandRunner;
use super::download::Downloader;
use super::error::UpdateError;
use super::fwupd::FwupdClient;
use super::metadata::{parse_inventory, ParseError};
use super::model::{Domain, UpdateCandidateSet, UpdateMode};
use super::selection::{select, Operator, SelectionOutcome};
use super::state::{InstallReport, RunOutcome, RunStage, RunState};
use super::transfer::{DirectoriesReady, UsbVmTransfer};
use crate::engine::config::Config;

pub struct UpdateOrchestrator<'a, R: CommandRunner + ?Sized> {
    config: &'a Config,
    runner: &'a R,
    usbvm: bool,
}

impl<'a, R: CommandRunner + ?Sized> UpdateOrchestrator<'a, R> {
    pub fn new(config: &'a Config, runner: &'a R, usbvm: bool) -> Self {
        Self {
            config,
            runner,
            usbvm,
        }
    }

    /// Domains taking part in this run, admin first.
    pub fn domains(&self) -> Vec<Domain> {
        if self.usbvm {
            vec![Domain::AdminVm, Domain::UsbVm]
        } else {
            vec![Domain::AdminVm]
        }
    }

    fn fwupd(&self) -> FwupdClient<'a, R> {
        FwupdClient::new(self.runner, self.config)
    }

    /// Download metadata, push it through the USB domain's validator if
    /// enabled, then load it into the admin engine.
    ///
    /// Returns the USB domain's directory check when it took part, so the
    /// rest of the run does not repeat it.
    pub fn refresh_metadata(&self) -> Result<Option<DirectoriesReady>, UpdateError> {
        Downloader::new(self.runner, self.config).download_metadata()?;

        let ready = if self.usbvm {
            let transfer = UsbVmTransfer::new(self.runner, self.config);
            let ready = transfer.prepare(RunStage::MetadataRefreshed)?;
            let copied = transfer.copy_metadata(&ready)?;
            let validated = transfer.validate_metadata(copied)?;
            transfer.refresh(validated)?;
            Some(ready)
        } else {
            None
        };

        self.fwupd()
            .refresh(&CacheLayout::new(&self.config.adminvm.cache_dir))?;
        Ok(ready)
    }

    /// Raw device reports of every active domain.
    pub fn inventories(&self) -> Result<Vec<(Domain, serde_json::Value)>, UpdateError> {
        let client = self.fwupd();
        self.domains()
            .into_iter()
            .map(|domain| -> Result<(Domain, serde_json::Value), UpdateError> {
                let json = client.get_devices(domain)?;
                let value = serde_json::from_str(&json).map_err(|e| UpdateError::Parse {
                    domain,
                    source: ParseError::Json(e),
                })?;
                Ok((domain, value))
            })
            .collect()
    }

    /// Enumerate every active domain and keep the eligible devices.
    pub fn candidates(&self, mode: UpdateMode) -> Result<UpdateCandidateSet, UpdateError> {
        let client = self.fwupd();
        let parse = |domain: Domain| -> Result<_, UpdateError> {
            let json = client.get_devices(domain)?;
            parse_inventory(&json, domain, mode).map_err(|source| UpdateError::Parse { domain, source })
        };

        let adminvm = parse(Domain::AdminVm)?;
        let usbvm = if self.usbvm {
            Some(parse(Domain::UsbVm)?)
        } else {
            None
        };
        let set = UpdateCandidateSet::build(mode, adminvm, usbvm);
        info!(?mode, adminvm = set.adminvm.len(), usbvm = set.usbvm.len(), "candidates built");
        Ok(set)
    }

    pub fn update<O: Operator + ?Sized>(&self, operator: &mut O) -> Result<RunOutcome, UpdateError> {
        self.run(UpdateMode::Update, operator)
    }

    pub fn downgrade<O: Operator + ?Sized>(&self, operator: &mut O) -> Result<RunOutcome, UpdateError> {
        self.run(UpdateMode::Downgrade, operator)
    }

    fn run<O: Operator + ?Sized>(&self, mode: UpdateMode, operator: &mut O) -> Result<RunOutcome, UpdateError> {
        let mut state = RunState::start(mode);

        let usbvm_dirs = self.refresh_metadata()?;
        state = state.advance(RunStage::MetadataRefreshed);

        let candidates = self.candidates(mode)?;
        state = state.advance(RunStage::CandidatesBuilt);

        let selection = match select(&candidates, operator).map_err(UpdateError::Prompt)? {
            SelectionOutcome::Selected(selection) => selection,
            SelectionOutcome::NoCandidates => {
                info!(?mode, "no eligible releases");
                return Ok(RunOutcome::NoCandidates);
            }
            SelectionOutcome::Abandoned => {
                info!(?mode, "selection abandoned");
                return Ok(RunOutcome::Abandoned);
            }
        };
        let target = candidates
            .target(&selection)
            .ok_or(UpdateError::InvalidSelection)?;
        state = state.advance(RunStage::Selected);
        info!(
            domain = %target.domain,
            device = %target.device_name,
            version = %target.release.version,
            "release selected"
        );

        let archive = Downloader::new(self.runner, self.config).download_archive(&target.release)?;
        state = state.advance(RunStage::Downloaded);

        if target.class.requires_authenticity_check() {
            let hardware = HardwareIdentity::read(self.runner, &self.config.adminvm.dmidecode)?;
            let metainfo = FirmwareMetainfo::load(&archive.metainfo_path)?;
            if let Err(e) = verify_system_firmware(&hardware, &metainfo, &target.release.version, mode) {
                warn!(device = %target.device_name, error = %e, "authenticity check failed");
                return Err(e.into());
            }
            state = state.advance(RunStage::AuthenticityChecked);
        }

        match target.domain {
            Domain::AdminVm => {
                // The admin cache is the install source; nothing crosses a domain
                state = state.advance(RunStage::Transferred);
                self.fwupd().install(&archive.archive_path, mode.allow_older())?;
            }
            Domain::UsbVm => {
                let transfer = UsbVmTransfer::new(self.runner, self.config);
                let ready = match usbvm_dirs {
                    Some(ready) => ready,
                    None => transfer.prepare(RunStage::Transferred)?,
                };
                let copied = transfer.copy_archive(&ready, archive.artifact())?;
                let validated = transfer.validate_archive(copied)?;
                state = state.advance(RunStage::Transferred);
                transfer.install(validated, mode.allow_older())?;
            }
        }
        let state = state.advance(RunStage::Installed);

        Ok(RunOutcome::Installed(InstallReport {
            domain: target.domain,
            device: target.device_name,
            mode,
            previous_version: target.current_version,
            installed_version: target.release.version,
            stages: state.trail,
        }))
    }

    /// Delete cached metadata and archives in every active domain.
    pub fn clean(&self) -> Result<(), UpdateError> {
        let admin = CacheLayout::new(&self.config.adminvm.cache_dir);
        admin
            .clean()
            .map_err(|e| UpdateError::Clean(format!("{}: {}", admin.base_dir().display(), e)))?;
        info!(domain = %Domain::AdminVm, "cache cleaned");

        if self.usbvm {
            UsbVmTransfer::new(self.runner, self.config).clean()?;
            info!(domain = %Domain::UsbVm, "cache cleaned");
        }
        Ok(())
    }
}
