//! Firmware Engine Client
//!
//! Thin wrapper over `fwupdagent` / `fwupdmgr`. Device enumeration works in
//! either domain; refresh and install here act on the admin domain only.
//! Installs in the USB domain go through [`super::transfer`].

use std::path::Path;
use tracing::info;

use super::cache::CacheLayout;
use super::command::{CommandRunner, ExternalCommand, UsbVmShell};
use super::error::UpdateError;
use super::model::Domain;
use super::state::RunStage;
use crate::engine::config::Config;

pub struct FwupdClient<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    config: &'a Config,
    shell: UsbVmShell,
}

impl<'a, R: CommandRunner + ?Sized> FwupdClient<'a, R> {
    pub fn new(runner: &'a R, config: &'a Config) -> Self {
        Self {
            runner,
            config,
            shell: UsbVmShell::new(config),
        }
    }

    /// Raw `get-devices` JSON of one domain, releases included.
    pub fn get_devices(&self, domain: Domain) -> Result<String, UpdateError> {
        let command = match domain {
            Domain::AdminVm => ExternalCommand::new(&self.config.adminvm.fwupdagent).arg("get-devices"),
            Domain::UsbVm => self
                .shell
                .capture(&format!("{} get-devices", self.config.usbvm.fwupdagent)),
        };

        let output = self
            .runner
            .run(&command)
            .map_err(|e| UpdateError::command(RunStage::CandidatesBuilt, &command, e))?;
        if !output.success() {
            return Err(UpdateError::Enumerate {
                domain,
                reason: output.failure_reason(),
            });
        }
        if output.stdout.trim().is_empty() {
            return Err(UpdateError::Enumerate {
                domain,
                reason: "empty device report".to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// Load downloaded metadata into the admin domain's engine.
    pub fn refresh(&self, cache: &CacheLayout) -> Result<(), UpdateError> {
        let command = ExternalCommand::new(&self.config.adminvm.fwupdmgr).args([
            "refresh".to_string(),
            cache.metadata_file().display().to_string(),
            cache.metadata_signature().display().to_string(),
            self.config.remote_id.clone(),
        ]);
        let output = self
            .runner
            .run(&command)
            .map_err(|e| UpdateError::command(RunStage::MetadataRefreshed, &command, e))?;
        if !output.success() {
            return Err(UpdateError::Refresh(format!(
                "{}: {}",
                Domain::AdminVm,
                output.failure_reason()
            )));
        }
        info!(domain = %Domain::AdminVm, "metadata refreshed");
        Ok(())
    }

    /// Install an archive in the admin domain.
    pub fn install(&self, archive: &Path, allow_older: bool) -> Result<(), UpdateError> {
        let mut command = ExternalCommand::new(&self.config.adminvm.fwupdmgr);
        if allow_older {
            command = command.arg("--allow-older");
        }
        let command = command
            .args(["install".to_string(), archive.display().to_string()])
            .interactive();

        let output = self
            .runner
            .run(&command)
            .map_err(|e| UpdateError::command(RunStage::Installed, &command, e))?;
        if !output.success() {
            return Err(UpdateError::Install {
                domain: Domain::AdminVm,
                reason: output.failure_reason(),
            });
        }
        info!(archive = %archive.display(), allow_older, "firmware installed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::updater::command::CommandOutput;
    use std::cell::RefCell;
    use std::io;

    struct Recorder {
        status: i32,
        stdout: String,
        seen: RefCell<Vec<ExternalCommand>>,
    }

    impl Recorder {
        fn new(status: i32, stdout: &str) -> Self {
            Self {
                status,
                stdout: stdout.to_string(),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for Recorder {
        fn run(&self, command: &ExternalCommand) -> io::Result<CommandOutput> {
            self.seen.borrow_mut().push(command.clone());
            Ok(CommandOutput {
                status: Some(self.status),
                stdout: self.stdout.clone(),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn test_get_devices_per_domain() {
        let config = Config::default();
        let runner = Recorder::new(0, "{\"Devices\": []}");
        let client = FwupdClient::new(&runner, &config);

        client.get_devices(Domain::AdminVm).unwrap();
        client.get_devices(Domain::UsbVm).unwrap();

        let seen = runner.seen.borrow();
        assert_eq!(seen[0].to_string(), "/bin/fwupdagent get-devices");
        assert_eq!(
            seen[1].args.last().unwrap(),
            "/usr/libexec/fwupd/fwupdagent get-devices"
        );
    }

    #[test]
    fn test_get_devices_failure() {
        let config = Config::default();
        let runner = Recorder::new(1, "");
        let client = FwupdClient::new(&runner, &config);
        let err = client.get_devices(Domain::UsbVm).unwrap_err();
        assert!(matches!(err, UpdateError::Enumerate { domain: Domain::UsbVm, .. }));
    }

    #[test]
    fn test_install_allow_older_flag() {
        let config = Config::default();
        let runner = Recorder::new(0, "");
        let client = FwupdClient::new(&runner, &config);

        client.install(Path::new("/root/.cache/fwupd/updates/a.cab"), true).unwrap();
        client.install(Path::new("/root/.cache/fwupd/updates/a.cab"), false).unwrap();

        let seen = runner.seen.borrow();
        assert_eq!(seen[0].args, vec!["--allow-older", "install", "/root/.cache/fwupd/updates/a.cab"]);
        assert_eq!(seen[1].args, vec!["install", "/root/.cache/fwupd/updates/a.cab"]);
        assert!(seen[0].interactive);
    }

    #[test]
    fn test_install_failure() {
        let config = Config::default();
        let runner = Recorder::new(1, "");
        let client = FwupdClient::new(&runner, &config);
        let err = client.install(Path::new("/tmp/a.cab"), false).unwrap_err();
        assert!(matches!(err, UpdateError::Install { domain: Domain::AdminVm, .. }));
    }

    #[test]
    fn test_refresh_command() {
        let config = Config::default();
        let runner = Recorder::new(0, "");
        let client = FwupdClient::new(&runner, &config);
        client
            .refresh(&CacheLayout::new(&config.adminvm.cache_dir))
            .unwrap();

        let seen = runner.seen.borrow();
        assert_eq!(
            seen[0].to_string(),
            "/bin/fwupdmgr refresh /root/.cache/fwupd/metadata/firmware.xml.gz /root/.cache/fwupd/metadata/firmware.xml.gz.asc lvfs"
        );
    }

    struct Unstartable;

    impl CommandRunner for Unstartable {
        fn run(&self, _command: &ExternalCommand) -> io::Result<CommandOutput> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))
        }
    }

    #[test]
    fn test_spawn_failure_names_its_stage() {
        let config = Config::default();
        let client = FwupdClient::new(&Unstartable, &config);

        let err = client.get_devices(Domain::AdminVm).unwrap_err();
        assert!(matches!(err, UpdateError::Command { .. }));
        assert_eq!(err.stage(), RunStage::CandidatesBuilt);

        let err = client
            .refresh(&CacheLayout::new(&config.adminvm.cache_dir))
            .unwrap_err();
        assert_eq!(err.stage(), RunStage::MetadataRefreshed);

        let err = client.install(Path::new("/tmp/a.cab"), false).unwrap_err();
        assert_eq!(err.stage(), RunStage::Installed);
    }
}
