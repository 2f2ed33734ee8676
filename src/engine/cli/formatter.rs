//! CLI Output Formatting Module
//! Provides consistent, colorized output for terminal UX

use colored::Colorize;
use serde_json::Value;
use std::io::{self, BufRead, Write};

use crate::engine::updater::model::{Device, Domain, UpdateCandidateSet, UpdateMode};
use crate::engine::updater::selection::Operator;
use crate::engine::updater::state::RunOutcome;

const DECORATOR: &str = "======================================================";
/// Keys longer than this are noise in the device tree
const MAX_TREE_KEY: usize = 12;

pub struct CliFormatter;

impl CliFormatter {
    /// Print a success message
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    /// Print an error message
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    /// Print a warning message
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message);
    }

    /// Print an info message
    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message);
    }

    /// Print pre-rendered lines
    pub fn lines(lines: &[String]) {
        for line in lines {
            println!("{}", line);
        }
    }

    /// Print a run outcome
    pub fn outcome(outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Installed(report) => {
                let verb = match report.mode {
                    UpdateMode::Update => "Updated",
                    UpdateMode::Downgrade => "Downgraded",
                };
                let from = report
                    .previous_version
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                Self::success(&format!(
                    "{} {} in {}: {} -> {}",
                    verb, report.device, report.domain, from, report.installed_version
                ));
            }
            RunOutcome::NoCandidates => Self::info("No updates available."),
            RunOutcome::Abandoned => Self::info("Process abandoned."),
        }
    }
}

/// Flatten release description markup for the terminal.
pub fn strip_markup(description: &str, indent: &str) -> String {
    let flat = description
        .replace("<p>", "")
        .replace("<li>", "")
        .replace("<ul>", "")
        .replace("</ul>", "");
    let newline = format!("\n{}", indent);
    flat.replace("</p>", &newline)
        .replace("</li>", &newline)
        .trim_end()
        .to_string()
}

fn tree_label(key: &str) -> String {
    let label = format!("{}:", key);
    let tabs = 4usize.saturating_sub(label.chars().count() / 8);
    format!("{}{}", label, "\t".repeat(tabs))
}

fn render_tree_level(object: &serde_json::Map<String, Value>, level: usize, domain: Domain, out: &mut Vec<String>) {
    let style = "\t".repeat(level);
    for (key, value) in object {
        if key.len() > MAX_TREE_KEY || key == "Icons" || key == "Releases" {
            continue;
        }
        if key == "Name" {
            if let Some(name) = value.as_str() {
                out.push(format!("{}{}", style, name));
                out.push(DECORATOR.to_string());
            }
            continue;
        }
        let label = format!("{}{}", style, tree_label(key));
        match value {
            Value::String(s) => out.push(format!("{}{}", label, s)),
            Value::Number(n) => out.push(format!("{}{}", label, n)),
            Value::Bool(b) => out.push(format!("{}{}", label, b)),
            Value::Array(items) => match items.first() {
                Some(Value::Object(_)) => {
                    if level == 0 {
                        out.push(format!("{} {}", domain.title(), label));
                    }
                    for item in items {
                        if let Value::Object(nested) = item {
                            render_tree_level(nested, level + 1, domain, out);
                        }
                    }
                }
                Some(_) => {
                    for (i, item) in items.iter().enumerate() {
                        let text = item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string());
                        if i == 0 {
                            out.push(format!("{}\u{00B7}{}", label, text));
                        } else {
                            out.push(format!("{}{}\u{00B7}{}", style, tree_label(" "), text));
                        }
                    }
                }
                None => {}
            },
            Value::Null | Value::Object(_) => {}
        }
    }
}

/// Render a `get-devices` report of one domain as an indented tree.
pub fn render_device_tree(report: &Value, domain: Domain) -> Vec<String> {
    let mut out = vec![DECORATOR.to_string()];
    if let Value::Object(object) = report {
        render_tree_level(object, 0, domain, &mut out);
    }
    out
}

fn render_release_lines(device: &Device, mode: UpdateMode, numbered: bool, out: &mut Vec<String>) {
    let kind = match mode {
        UpdateMode::Update => "update",
        UpdateMode::Downgrade => "downgrade",
    };
    for (i, release) in device.releases.iter().enumerate() {
        out.push(DECORATOR.to_string());
        if numbered {
            out.push(format!("  {}. Firmware {} version:\t {}", i + 1, kind, release.version));
        } else {
            out.push(format!("   Firmware {} version:\t {}", kind, release.version));
        }
        out.push(format!("   URL:\t {}", release.uri));
        out.push(format!("   Checksum:\t {}", release.checksum));
        out.push(format!("   Description: {}", strip_markup(&release.description, "\t")));
    }
}

/// Render candidates per domain, numbered continuously admin domain first.
pub fn render_candidates(candidates: &UpdateCandidateSet, domains: &[Domain]) -> Vec<String> {
    let mut out = Vec::new();
    let title = match candidates.mode {
        UpdateMode::Update => "updates",
        UpdateMode::Downgrade => "downgrades",
    };
    let mut number = 0;
    for &domain in domains {
        out.push(DECORATOR.to_string());
        out.push(format!("{} {}:", domain.title(), title));
        out.push(DECORATOR.to_string());

        let devices = candidates.devices(domain);
        if devices.is_empty() {
            out.push(format!("No {} available.", title));
            continue;
        }
        for device in devices {
            number += 1;
            let current = device
                .current_version
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_default();
            out.push(format!("{}. Device: {}", number, device.name));
            out.push(format!("   Current firmware version:\t {}", current));
            render_release_lines(device, candidates.mode, false, &mut out);
            out.push(DECORATOR.to_string());
        }
    }
    out
}

/// Numbered release list shown at the downgrade prompt.
pub fn render_releases(device: &Device) -> Vec<String> {
    let mut out = Vec::new();
    render_release_lines(device, UpdateMode::Downgrade, true, &mut out);
    out
}

/// Interactive operator on stdin/stdout.
pub struct TerminalOperator<I: BufRead> {
    input: I,
    domains: Vec<Domain>,
}

impl<I: BufRead> TerminalOperator<I> {
    pub fn new(input: I, domains: Vec<Domain>) -> Self {
        Self { input, domains }
    }
}

impl<I: BufRead> Operator for TerminalOperator<I> {
    fn show_candidates(&mut self, candidates: &UpdateCandidateSet) {
        CliFormatter::lines(&render_candidates(candidates, &self.domains));
    }

    fn show_releases(&mut self, device: &Device) {
        CliFormatter::lines(&render_releases(device));
    }

    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        println!("If you want to abandon process press 'N'.");
        print!("{}", prompt);
        io::stdout().flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }

    fn invalid_choice(&mut self) {
        CliFormatter::warning("Invalid choice.");
    }
}
