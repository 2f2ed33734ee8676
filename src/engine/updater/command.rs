//! External Commands
//!
//! Every collaborator (firmware engine, update helper, DMI reader, the
//! cross-domain runner) is reached through an [`ExternalCommand`] executed by
//! a [`CommandRunner`]. Calls block until the command exits.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::engine::config::Config;

/// A program invocation, optionally fed from a file on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<PathBuf>,
    /// Pass stdout/stderr through to the terminal instead of capturing
    pub interactive: bool,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            interactive: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin_from(mut self, path: &Path) -> Self {
        self.stdin = Some(path.to_path_buf());
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        if let Some(stdin) = &self.stdin {
            write!(f, " < {}", stdin.display())?;
        }
        Ok(())
    }
}

/// Completion of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if terminated by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Short description of a failed completion for error messages.
    pub fn failure_reason(&self) -> String {
        let status = match self.status {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            status
        } else {
            format!("{}: {}", status, stderr)
        }
    }
}

/// Executes external commands; swapped for a scripted runner in tests.
pub trait CommandRunner {
    fn run(&self, command: &ExternalCommand) -> io::Result<CommandOutput>;
}

/// Runs commands as local child processes.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &ExternalCommand) -> io::Result<CommandOutput> {
        debug!(command = %command, "running");

        let mut process = Command::new(&command.program);
        process.args(&command.args);
        match &command.stdin {
            Some(path) => process.stdin(Stdio::from(File::open(path)?)),
            None => process.stdin(Stdio::null()),
        };

        if command.interactive {
            let status = process
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()?;
            return Ok(CommandOutput {
                status: status.code(),
                ..CommandOutput::default()
            });
        }

        let output = process.output()?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Builds commands that execute inside the USB-owning domain via `qvm-run`.
#[derive(Debug, Clone)]
pub struct UsbVmShell {
    qvm_run: String,
    vm_name: String,
}

impl UsbVmShell {
    pub fn new(config: &Config) -> Self {
        Self {
            qvm_run: config.qvm_run.clone(),
            vm_name: config.usbvm.name.clone(),
        }
    }

    pub fn vm_name(&self) -> &str {
        &self.vm_name
    }

    /// Run `command_line` under a pseudo-terminal, propagating its exit code.
    pub fn script(&self, command_line: &str) -> ExternalCommand {
        ExternalCommand::new(&self.qvm_run).args([
            "--pass-io".to_string(),
            self.vm_name.clone(),
            format!("script --quiet --return --command \"{}\"", command_line),
        ])
    }

    /// Run `command_line` directly and capture what it prints.
    pub fn capture(&self, command_line: &str) -> ExternalCommand {
        ExternalCommand::new(&self.qvm_run).args([
            "--nogui".to_string(),
            "--pass-io".to_string(),
            self.vm_name.clone(),
            command_line.to_string(),
        ])
    }

    /// Stream a local file into `dest` inside the domain.
    pub fn write_file(&self, source: &Path, dest: &Path) -> ExternalCommand {
        self.capture(&format!("cat > {}", dest.display()))
            .stdin_from(source)
    }
}
