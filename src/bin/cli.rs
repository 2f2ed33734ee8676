//! qubes-fwupd CLI - Main entry point
//!
//! Firmware updates for dom0 and, with `--sys-usb`, the USB qube.

use anyhow::{Context, Result};
use clap::Parser;
use qubes_fwupd_lib::engine::{
    cli::{
        formatter::{render_candidates, render_device_tree, CliFormatter, TerminalOperator},
        Cli, Commands, OutputFormat,
    },
    config::Config,
    updater::{
        preflight::{is_root, PreflightChecker, PreflightResult},
        RunOutcome, SystemRunner, UpdateError, UpdateMode, UpdateOrchestrator, EXIT_ERROR,
        EXIT_NO_UPDATES, EXIT_SUCCESS,
    },
};
use std::io;
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match run_cli(&cli) {
        Ok(code) => code,
        Err(e) => {
            report_error(&e, cli.format);
            EXIT_ERROR
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();
}

fn report_error(e: &anyhow::Error, format: OutputFormat) {
    let stage = e.downcast_ref::<UpdateError>().map(|u| u.stage());
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "success": false,
                    "error": format!("{:#}", e),
                    "stage": stage,
                })
            );
        }
        OutputFormat::Text => match stage {
            Some(stage) => CliFormatter::error(&format!("{} failed: {:#}", stage, e)),
            None => CliFormatter::error(&format!("{:#}", e)),
        },
    }
}

fn preflight(cli: &Cli, config: &Config) -> Result<()> {
    let result = if cli.command.needs_tools() {
        PreflightChecker::new(config, cli.sys_usb).check()
    } else if is_root() {
        PreflightResult::Ready
    } else {
        PreflightResult::NotRoot
    };
    result.into_result()?;
    Ok(())
}

fn run_cli(cli: &Cli) -> Result<i32> {
    let config = Config::load_or_default(cli.config.as_deref()).context("Loading configuration")?;
    preflight(cli, &config)?;
    debug!(command = ?cli.command, sys_usb = cli.sys_usb, "starting");

    let runner = SystemRunner;
    let orchestrator = UpdateOrchestrator::new(&config, &runner, cli.sys_usb);
    let json = cli.format == OutputFormat::Json;

    match cli.command {
        Commands::GetDevices => cmd_get_devices(&orchestrator, json),
        Commands::GetUpdates => cmd_get_updates(&orchestrator, json),
        Commands::Refresh => {
            orchestrator.refresh_metadata()?;
            print_done(json, "Metadata refreshed");
            Ok(EXIT_SUCCESS)
        }
        Commands::Update => cmd_install(&orchestrator, UpdateMode::Update, json),
        Commands::Downgrade => cmd_install(&orchestrator, UpdateMode::Downgrade, json),
        Commands::Clean => {
            if !json {
                CliFormatter::info("Cleaning cache directories");
            }
            orchestrator.clean()?;
            print_done(json, "Cache cleaned");
            Ok(EXIT_SUCCESS)
        }
    }
}

fn print_done(json: bool, message: &str) {
    if json {
        println!("{}", serde_json::json!({ "success": true }));
    } else {
        CliFormatter::success(message);
    }
}

fn cmd_get_devices(orchestrator: &UpdateOrchestrator<'_, SystemRunner>, json: bool) -> Result<i32> {
    let inventories = orchestrator.inventories()?;
    if json {
        let map: serde_json::Map<String, serde_json::Value> = inventories
            .into_iter()
            .map(|(domain, report)| (domain.label().to_string(), report))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else {
        for (domain, report) in &inventories {
            CliFormatter::lines(&render_device_tree(report, *domain));
        }
    }
    Ok(EXIT_SUCCESS)
}

fn cmd_get_updates(orchestrator: &UpdateOrchestrator<'_, SystemRunner>, json: bool) -> Result<i32> {
    let candidates = orchestrator.candidates(UpdateMode::Update)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
    } else {
        CliFormatter::lines(&render_candidates(&candidates, &orchestrator.domains()));
    }
    Ok(if candidates.is_empty() {
        EXIT_NO_UPDATES
    } else {
        EXIT_SUCCESS
    })
}

fn cmd_install(
    orchestrator: &UpdateOrchestrator<'_, SystemRunner>,
    mode: UpdateMode,
    json: bool,
) -> Result<i32> {
    let stdin = io::stdin();
    let mut operator = TerminalOperator::new(stdin.lock(), orchestrator.domains());
    let outcome: RunOutcome = match mode {
        UpdateMode::Update => orchestrator.update(&mut operator)?,
        UpdateMode::Downgrade => orchestrator.downgrade(&mut operator)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        CliFormatter::outcome(&outcome);
    }
    Ok(outcome.exit_code())
}
