#![allow(dead_code)]

use qubes_fwupd_lib::engine::config::Config;
use qubes_fwupd_lib::engine::updater::command::{CommandOutput, CommandRunner, ExternalCommand};
use qubes_fwupd_lib::engine::updater::model::{Device, UpdateCandidateSet};
use qubes_fwupd_lib::engine::updater::selection::Operator;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::Path;

/// sha1 of `b"hello world"`
pub const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";
pub const HELLO_BYTES: &[u8] = b"hello world";

pub fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    fs::read_to_string(path).unwrap()
}

/// Point every release checksum at the bytes the scripted helper downloads.
pub fn with_local_checksums(json: &str) -> String {
    let mut report: serde_json::Value = serde_json::from_str(json).unwrap();
    if let Some(devices) = report["Devices"].as_array_mut() {
        for device in devices {
            if let Some(releases) = device.get_mut("Releases").and_then(|r| r.as_array_mut()) {
                for release in releases {
                    release["Checksum"] = serde_json::json!([HELLO_SHA1]);
                }
            }
        }
    }
    report.to_string()
}

pub fn system_firmware_inventory(current: &str, release: &str) -> String {
    serde_json::json!({
        "Devices": [{
            "Name": "System Firmware",
            "Plugin": "uefi_capsule",
            "Version": current,
            "Releases": [{
                "Version": release,
                "Uri": format!("https://fwupd.org/downloads/5e1f-dell-xps-13-{}.cab", release),
                "Checksum": [HELLO_SHA1],
                "Description": "<p>Security fixes</p>"
            }]
        }]
    })
    .to_string()
}

pub fn metainfo_xml(vendor: &str, version: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<component type="firmware">
  <id>com.dell.uefi.firmware</id>
  <developer_name>{}</developer_name>
  <releases>
    <release version="{}" date="2020-06-01"/>
  </releases>
</component>
"#,
        vendor, version
    )
}

pub fn test_config(admin_cache: &Path) -> Config {
    let mut config = Config::default();
    config.adminvm.cache_dir = admin_cache.to_path_buf();
    config
}

/// Stands in for fwupd, the update helper, dmidecode and qvm-run.
pub struct ScriptedRunner {
    pub config: Config,
    pub admin_devices: String,
    pub usbvm_devices: String,
    pub dmi: String,
    pub metainfo: Option<String>,
    pub archive_bytes: Vec<u8>,
    /// Commands whose rendering contains any of these exit with status 1
    pub failing: Vec<String>,
    /// Commands whose rendering contains any of these cannot be started
    pub unstartable: Vec<String>,
    pub log: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new(config: &Config, admin_devices: String) -> Self {
        Self {
            config: config.clone(),
            admin_devices,
            usbvm_devices: fixture("get_devices_no_updates.json"),
            dmi: fixture("dmidecode_bios.txt"),
            metainfo: None,
            archive_bytes: HELLO_BYTES.to_vec(),
            failing: Vec::new(),
            unstartable: Vec::new(),
            log: RefCell::new(Vec::new()),
        }
    }

    pub fn fail_on(mut self, pattern: &str) -> Self {
        self.failing.push(pattern.to_string());
        self
    }

    pub fn cannot_start(mut self, pattern: &str) -> Self {
        self.unstartable.push(pattern.to_string());
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.log.borrow().iter().filter(|c| c.contains(pattern)).count()
    }

    /// Installs attempted in either domain.
    pub fn installs(&self) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .filter(|c| c.contains(" install "))
            .cloned()
            .collect()
    }

    fn helper(&self, command: &ExternalCommand) -> io::Result<()> {
        let cache = &self.config.adminvm.cache_dir;
        if command.args.iter().any(|a| a == "--metadata") {
            fs::create_dir_all(cache.join("metadata"))?;
            fs::write(cache.join("metadata/firmware.xml.gz"), b"xml")?;
            fs::write(cache.join("metadata/firmware.xml.gz.asc"), b"sig")?;
            return Ok(());
        }
        let url = command
            .args
            .iter()
            .find_map(|a| a.strip_prefix("--url="))
            .unwrap_or_default();
        let name = url.rsplit('/').next().unwrap_or_default();
        let stem = name.trim_end_matches(".cab");
        let updates = cache.join("updates");
        fs::create_dir_all(updates.join(stem))?;
        fs::write(updates.join(name), &self.archive_bytes)?;
        if let Some(xml) = &self.metainfo {
            fs::write(updates.join(stem).join("firmware.metainfo.xml"), xml)?;
        }
        Ok(())
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &ExternalCommand) -> io::Result<CommandOutput> {
        let line = command.to_string();
        self.log.borrow_mut().push(line.clone());

        if self.unstartable.iter().any(|p| line.contains(p.as_str())) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "scripted spawn failure"));
        }

        if self.failing.iter().any(|p| line.contains(p.as_str())) {
            return Ok(CommandOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: "scripted failure".to_string(),
            });
        }

        let mut stdout = String::new();
        if command.program == self.config.adminvm.fwupdagent && command.args == ["get-devices"] {
            stdout = self.admin_devices.clone();
        } else if command.program == self.config.qvm_run
            && line.ends_with(&format!("{} get-devices", self.config.usbvm.fwupdagent))
        {
            stdout = self.usbvm_devices.clone();
        } else if command.program == self.config.adminvm.update_helper {
            self.helper(command)?;
        } else if command.program == self.config.adminvm.dmidecode {
            stdout = self.dmi.clone();
        }

        Ok(CommandOutput {
            status: Some(0),
            stdout,
            stderr: String::new(),
        })
    }
}

/// Answers prompts from a fixed script; an exhausted script closes input.
#[derive(Default)]
pub struct ScriptedOperator {
    answers: VecDeque<String>,
    pub prompts: usize,
    pub shown: Vec<usize>,
}

impl ScriptedOperator {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }
}

impl Operator for ScriptedOperator {
    fn show_candidates(&mut self, candidates: &UpdateCandidateSet) {
        self.shown.push(candidates.len());
    }

    fn show_releases(&mut self, _device: &Device) {}

    fn ask(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        self.prompts += 1;
        Ok(self.answers.pop_front())
    }

    fn invalid_choice(&mut self) {}
}
